mod ice;
mod role;
mod room;
mod signaling;
mod stomp;

pub use ice::{DEFAULT_STUN_ADDR, IceCandidate, IceServerConfig};
pub use role::Role;
pub use room::RoomId;
pub use signaling::{SignalError, SignalMessage};
pub use stomp::{StompCommand, StompError, StompFrame};
