mod relay_channel;
mod stomp_relay;

pub use relay_channel::*;
pub use stomp_relay::*;
