use async_trait::async_trait;
use beacon_client::{RelayChannel, RelayError, Subscription, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
struct HubState {
    /// topic -> (relay id, subscription sender)
    topics: HashMap<String, Vec<(u64, mpsc::UnboundedSender<String>)>>,
    published: Vec<(String, String)>,
}

/// In-memory relay: every publish is delivered to all subscribers of the
/// address, the publisher included, the way a broker echoes.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
    next_relay: Arc<AtomicU64>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    /// Number of upcoming connects that fail.
    failing_connects: Arc<AtomicUsize>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, unconnected channel on this hub.
    pub fn relay(&self) -> Arc<dyn RelayChannel> {
        Arc::new(LoopbackRelay {
            id: self.next_relay.fetch_add(1, Ordering::SeqCst),
            hub: self.clone(),
            connected: AtomicBool::new(false),
        })
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Every payload published so far, with its address.
    pub async fn published(&self) -> Vec<(String, String)> {
        self.state.lock().await.published.clone()
    }

    /// Published payloads of one signal type (`"offer"`, `"answer"`, `"candidate"`).
    pub async fn published_of_type(&self, kind: &str) -> Vec<String> {
        let needle = format!(r#""type":"{kind}""#);
        self.published()
            .await
            .into_iter()
            .filter(|(_, payload)| payload.contains(&needle))
            .map(|(_, payload)| payload)
            .collect()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Delivers a payload as if another client had published it.
    pub async fn inject(&self, topic: &str, payload: &str) {
        let state = self.state.lock().await;
        if let Some(subs) = state.topics.get(topic) {
            for (_, tx) in subs {
                let _ = tx.send(payload.to_owned());
            }
        }
    }

    /// Ends every subscription, simulating a lost broker connection.
    pub async fn drop_all_subscriptions(&self) {
        self.state.lock().await.topics.clear();
    }
}

pub struct LoopbackRelay {
    id: u64,
    hub: LoopbackHub,
    connected: AtomicBool,
}

#[async_trait]
impl RelayChannel for LoopbackRelay {
    async fn connect(&self, endpoint: &str) -> Result<(), RelayError> {
        let failing = self
            .hub
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            tracing::debug!("[LoopbackRelay] refusing connect to {}", endpoint);
            return Err(RelayError::ConnectFailed("network unreachable".to_owned()));
        }

        self.hub.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .state
            .lock()
            .await
            .topics
            .entry(topic.to_owned())
            .or_default()
            .push((self.id, tx));

        Ok(Subscription {
            handle: SubscriptionHandle {
                id: format!("loopback-{}", self.id),
                topic: topic.to_owned(),
            },
            messages: rx,
        })
    }

    async fn send(&self, address: &str, payload: String) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let mut state = self.hub.state.lock().await;
        state.published.push((address.to_owned(), payload.clone()));
        if let Some(subs) = state.topics.get(address) {
            for (_, tx) in subs {
                let _ = tx.send(payload.clone());
            }
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.hub.disconnects.fetch_add(1, Ordering::SeqCst);
        let mut state = self.hub.state.lock().await;
        for subs in state.topics.values_mut() {
            subs.retain(|(id, _)| *id != self.id);
        }
        state.topics.retain(|_, subs| !subs.is_empty());
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
