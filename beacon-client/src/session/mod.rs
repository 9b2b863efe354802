mod coordinator;
mod coordinator_state;

pub use coordinator::*;
pub use coordinator_state::SessionStatus;
