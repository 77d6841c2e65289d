use clap::Parser;
use stakemesh::consensus::{parse_hardness, ConsensusParams, StakePolicy};
use stakemesh::node::{Node, NodeConfig, NodeError, NodeHandle, DEFAULT_LISTEN_ADDRESS};
use stakemesh::transport::TcpTransportConfig;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stakemesh",
    about = "Gossip transaction network with a stake-weighted slot lottery",
    version
)]
struct Cli {
    /// Address of an existing member to join through
    #[arg(short, long)]
    bootstrap: Option<String>,

    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDRESS)]
    listen: String,

    /// Address other nodes should dial (defaults to the bound address)
    #[arg(long)]
    advertise: Option<String>,

    /// Genesis parameters as JSON; flags below override its fields
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// Slot length in seconds
    #[arg(long)]
    slot_length: Option<u64>,

    /// Lottery seed
    #[arg(long)]
    seed: Option<u64>,

    /// Lottery hardness as a decimal integer
    #[arg(long)]
    hardness: Option<String>,

    /// Stake credited to every account on first sight
    #[arg(long)]
    initial_stake: Option<u64>,

    /// Seconds to wait when dialing a peer
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        if let Err(e) = run(cli).await {
            tracing::error!("Fatal error: {}", e);
            std::process::exit(1);
        }
    });
}

fn build_config(cli: &Cli) -> Result<NodeConfig, NodeError> {
    let mut params = match &cli.genesis {
        Some(path) => ConsensusParams::from_json_file(path)?,
        None => ConsensusParams::default(),
    };
    if let Some(secs) = cli.slot_length {
        params = params.with_slot_length_secs(secs);
    }
    if let Some(seed) = cli.seed {
        params = params.with_seed(seed);
    }
    if let Some(hardness) = &cli.hardness {
        params = params.with_hardness(parse_hardness(hardness)?);
    }

    let mut stake_policy = StakePolicy::default();
    if let Some(stake) = cli.initial_stake {
        stake_policy = stake_policy.with_initial_stake(stake);
    }

    let mut config = NodeConfig::new()
        .with_listen_address(cli.listen.clone())
        .with_params(params)
        .with_stake_policy(stake_policy)
        .with_tcp(TcpTransportConfig::new().with_connect_timeout_secs(cli.connect_timeout));
    if let Some(bootstrap) = &cli.bootstrap {
        config = config.with_bootstrap(bootstrap.clone());
    }
    if let Some(advertise) = &cli.advertise {
        config = config.with_advertise_address(advertise.clone());
    }

    Ok(config)
}

async fn run(cli: Cli) -> Result<(), NodeError> {
    let config = build_config(&cli)?;
    let node = Node::start(config).await?;

    tracing::info!(
        address = %node.local_address(),
        role = ?node.role(),
        "node started"
    );

    if cli.no_console {
        std::future::pending::<()>().await;
        return Ok(());
    }

    println!("Commands: send <amount> <address> | balance [address] | peers | ledger");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = handle_command(&node, line.trim()).await {
            println!("error: {}", e);
        }
    }

    // stdin closed; keep serving the network
    std::future::pending::<()>().await;
    Ok(())
}

async fn handle_command(node: &NodeHandle, line: &str) -> Result<(), NodeError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["send", amount, address] => {
            let amount: u64 = amount
                .parse()
                .map_err(|_| NodeError::Config(format!("invalid amount {}", amount)))?;
            let tx = node.send_to_address(address, amount).await?;
            println!("sent {} to {} (tx {})", amount, address, tx.id());
        }
        ["balance"] => {
            println!("{}: {}", node.local_address(), node.own_balance().await);
        }
        ["balance", address] => {
            let key = node.gossip().lookup_peer(address).await?;
            println!("{}: {}", address, node.balance(&key).await);
        }
        ["peers"] => {
            for (address, key) in node.peers().await {
                println!("{}  {}", address, key.short());
            }
        }
        ["ledger"] => {
            let peers = node.peers().await;
            for (key, balance) in node.ledger().await {
                let name = peers
                    .iter()
                    .find(|(_, pk)| **pk == key)
                    .map(|(address, _)| address.clone())
                    .unwrap_or_else(|| key.short());
                println!("{:>22}  {}", name, balance);
            }
            println!("total supply: {}", node.consensus().total_supply().await);
        }
        _ => println!("unknown command: {}", line),
    }
    Ok(())
}
