// Node Configuration - everything a node needs to start

use crate::consensus::{ConsensusParams, StakePolicy};
use crate::identity::Keypair;
use crate::ledger::LedgerPolicy;
use crate::node::NodeError;
use crate::sync::{parse_peer_address, GossipConfig};
use crate::transport::TcpTransportConfig;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:0";

#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address the listener binds to
    pub listen_address: String,
    /// Address stored in peer directories; derived from the bound socket if unset
    pub advertise_address: Option<String>,
    /// Existing member to join through; `None` starts a new network
    pub bootstrap: Option<String>,
    /// Dial attempts before falling back to the seed role
    pub bootstrap_attempts: u32,
    pub bootstrap_backoff_ms: u64,
    /// Run the per-slot lottery in the background
    pub run_slot_loop: bool,
    /// Inbound events buffered between readers and the dispatcher
    pub event_queue_size: usize,
    /// Node key; a fresh one is generated if unset
    pub keypair: Option<Keypair>,
    pub params: ConsensusParams,
    pub stake_policy: StakePolicy,
    pub ledger_policy: LedgerPolicy,
    pub gossip: GossipConfig,
    pub tcp: TcpTransportConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            advertise_address: None,
            bootstrap: None,
            bootstrap_attempts: 3,
            bootstrap_backoff_ms: 500,
            run_slot_loop: true,
            event_queue_size: 1024,
            keypair: None,
            params: ConsensusParams::default(),
            stake_policy: StakePolicy::default(),
            ledger_policy: LedgerPolicy::default(),
            gossip: GossipConfig::default(),
            tcp: TcpTransportConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        self.listen_address = address.into();
        self
    }

    pub fn with_advertise_address(mut self, address: impl Into<String>) -> Self {
        self.advertise_address = Some(address.into());
        self
    }

    pub fn with_bootstrap(mut self, address: impl Into<String>) -> Self {
        self.bootstrap = Some(address.into());
        self
    }

    pub fn with_bootstrap_attempts(mut self, attempts: u32) -> Self {
        self.bootstrap_attempts = attempts;
        self
    }

    pub fn with_bootstrap_backoff_ms(mut self, ms: u64) -> Self {
        self.bootstrap_backoff_ms = ms;
        self
    }

    pub fn with_slot_loop(mut self, enabled: bool) -> Self {
        self.run_slot_loop = enabled;
        self
    }

    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size;
        self
    }

    pub fn with_keypair(mut self, keypair: Keypair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn with_params(mut self, params: ConsensusParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_stake_policy(mut self, policy: StakePolicy) -> Self {
        self.stake_policy = policy;
        self
    }

    pub fn with_ledger_policy(mut self, policy: LedgerPolicy) -> Self {
        self.ledger_policy = policy;
        self
    }

    pub fn with_gossip(mut self, gossip: GossipConfig) -> Self {
        self.gossip = gossip;
        self
    }

    pub fn with_tcp(mut self, tcp: TcpTransportConfig) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn bootstrap_backoff(&self) -> Duration {
        Duration::from_millis(self.bootstrap_backoff_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), NodeError> {
        self.params.validate()?;
        self.tcp.validate()?;

        self.listen_address
            .parse::<SocketAddr>()
            .map_err(|_| NodeError::Config(format!("invalid listen address {}", self.listen_address)))?;

        if let Some(bootstrap) = &self.bootstrap {
            parse_peer_address(bootstrap)?;
        }
        if let Some(advertise) = &self.advertise_address {
            parse_peer_address(advertise)?;
        }

        if self.bootstrap_attempts == 0 {
            return Err(NodeError::Config(
                "bootstrap attempts must be at least 1".to_string(),
            ));
        }
        if self.event_queue_size == 0 {
            return Err(NodeError::Config(
                "event queue size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
