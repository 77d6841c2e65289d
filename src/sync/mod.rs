// Sync module - HOW NODES TALK
// Wire messages, membership directory and gossip dispatch

mod gossip;
mod peer;
mod protocol;
mod seen;

pub use gossip::{GossipConfig, GossipEngine, GossipEvent, GossipStats};
pub use peer::{parse_peer_address, Adoption, PeerDirectory, PeerError, MAX_CON};
pub use protocol::{Message, MessageType, ProtocolError};
pub use seen::SeenSet;
