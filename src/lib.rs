// stakemesh - gossip-flooded transactions with a stake-weighted slot lottery
//
// identity  -> node keys and signatures
// tx        -> transfers: model, builder, admission checks
// ledger    -> balances and the pending pool
// consensus -> lottery, blocks, block application
// sync      -> wire messages, peer directory, gossip dispatch
// transport -> JSON frames over TCP
// node      -> the running process

pub mod consensus;
pub mod identity;
pub mod ledger;
pub mod node;
pub mod sync;
pub mod transport;
pub mod tx;
