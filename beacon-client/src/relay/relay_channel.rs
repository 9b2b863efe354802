use crate::error::RelayError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifies one topic registration on a relay channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: String,
    pub topic: String,
}

/// Inbound payloads of one topic, in the order the relay delivered them.
///
/// The receiver yields `None` once the channel is disconnected or the relay
/// connection is lost.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub messages: mpsc::UnboundedReceiver<String>,
}

/// Long-lived message connection to the signaling relay.
#[async_trait]
pub trait RelayChannel: Send + Sync {
    /// Opens the connection. A channel whose connect failed stays unusable.
    async fn connect(&self, endpoint: &str) -> Result<(), RelayError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError>;

    /// Publishes immediately; nothing is queued while disconnected.
    async fn send(&self, address: &str, payload: String) -> Result<(), RelayError>;

    /// Idempotent. Returns once the relay acknowledged or the timeout elapsed.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Builds a fresh, unconnected channel for every session.
pub type RelayFactory = Arc<dyn Fn() -> Arc<dyn RelayChannel> + Send + Sync>;
