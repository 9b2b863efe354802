mod engine_state;
mod negotiation_engine;
mod peer_transport;
mod rtc_peer;
mod session_stats;

pub use engine_state::*;
pub use negotiation_engine::*;
pub use peer_transport::*;
pub use rtc_peer::*;
pub use session_stats::*;
