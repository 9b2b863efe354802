mod relay_broker;
mod ws_handler;

pub use relay_broker::*;
pub use ws_handler::*;
