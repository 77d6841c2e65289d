// Node module - THE PROCESS
// Owns the lifecycle of every other component

mod config;
mod service;

pub use config::{NodeConfig, DEFAULT_LISTEN_ADDRESS};
pub use service::{Node, NodeError, NodeHandle, NodeRole};
