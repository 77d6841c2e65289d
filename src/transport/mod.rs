// Transport module - THE WIRE
// JSON frames over TCP, one reader and one writer task per connection

mod codec;
mod connections;
mod tcp;
mod types;

pub use codec::{encode, CodecError, FrameDecoder, DEFAULT_MAX_FRAME_BYTES};
pub use connections::{ConnectionInfo, ConnectionSet};
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use types::{ConnectionDirection, ConnectionId, TransportError, TransportEvent};
