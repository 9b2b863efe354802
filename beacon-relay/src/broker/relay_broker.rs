use axum::extract::ws::Message;
use beacon_core::{StompCommand, StompFrame};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the socket loop should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Close,
}

struct BrokerInner {
    sessions: DashMap<SessionId, mpsc::UnboundedSender<Message>>,
    /// destination -> (session, subscription id)
    subscriptions: DashMap<String, Vec<(SessionId, String)>>,
    topic_prefix: String,
    app_prefix: String,
    message_seq: AtomicU64,
}

#[derive(Clone)]
pub struct RelayBroker {
    inner: Arc<BrokerInner>,
}

impl Default for RelayBroker {
    fn default() -> Self {
        Self::new("/topic", "/app")
    }
}

impl RelayBroker {
    pub fn new(topic_prefix: impl Into<String>, app_prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                sessions: DashMap::new(),
                subscriptions: DashMap::new(),
                topic_prefix: topic_prefix.into(),
                app_prefix: app_prefix.into(),
                message_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn add_session(&self, session: SessionId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.sessions.insert(session, tx);
    }

    /// Drops the session's outbound queue and all of its subscriptions.
    pub fn remove_session(&self, session: &SessionId) {
        self.inner.sessions.remove(session);

        for mut entry in self.inner.subscriptions.iter_mut() {
            entry.value_mut().retain(|(s, _)| s != session);
        }
        self.inner.subscriptions.retain(|_, subs| !subs.is_empty());
    }

    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.inner
            .subscriptions
            .get(destination)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    pub fn handle_frame(&self, session: SessionId, frame: StompFrame) -> FrameOutcome {
        match frame.command {
            StompCommand::Connect | StompCommand::Stomp => {
                let connected = StompFrame::new(StompCommand::Connected)
                    .header("version", "1.2")
                    .header("heart-beat", "0,0")
                    .header("server", "beacon-relay");
                self.reply(&session, &connected);
            }

            StompCommand::Subscribe => {
                let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination"))
                else {
                    return self.reject(&session, "SUBSCRIBE requires id and destination");
                };
                debug!("Session {} subscribed {} to {}", session, id, destination);
                self.inner
                    .subscriptions
                    .entry(destination.to_owned())
                    .or_default()
                    .push((session, id.to_owned()));
            }

            StompCommand::Unsubscribe => {
                let Some(id) = frame.get("id") else {
                    return self.reject(&session, "UNSUBSCRIBE requires id");
                };
                for mut entry in self.inner.subscriptions.iter_mut() {
                    entry
                        .value_mut()
                        .retain(|(s, sub)| !(s == &session && sub == id));
                }
                self.inner.subscriptions.retain(|_, subs| !subs.is_empty());
            }

            StompCommand::Send => {
                let Some(destination) = frame.get("destination") else {
                    return self.reject(&session, "SEND requires destination");
                };
                let topic = self.topic_for(destination);
                let content_type = frame.get("content-type").unwrap_or("text/plain");
                self.publish(&topic, content_type, &frame.body);
            }

            StompCommand::Disconnect => {
                self.send_receipt(&session, &frame);
                return FrameOutcome::Close;
            }

            other => {
                return self.reject(&session, &format!("unexpected {} frame", other));
            }
        }

        self.send_receipt(&session, &frame);
        FrameOutcome::Continue
    }

    /// Sends an ERROR frame; the connection is closed afterwards.
    pub fn reject(&self, session: &SessionId, message: &str) -> FrameOutcome {
        warn!("Rejecting frame from session {}: {}", session, message);
        let error = StompFrame::new(StompCommand::Error).header("message", message);
        self.reply(session, &error);
        FrameOutcome::Close
    }

    fn topic_for(&self, destination: &str) -> String {
        let app = self.inner.app_prefix.trim_end_matches('/');
        match destination.strip_prefix(app) {
            Some(rest) if rest.starts_with('/') => {
                format!("{}{}", self.inner.topic_prefix.trim_end_matches('/'), rest)
            }
            _ => destination.to_owned(),
        }
    }

    fn publish(&self, destination: &str, content_type: &str, body: &str) {
        let Some(subscribers) = self
            .inner
            .subscriptions
            .get(destination)
            .map(|subs| subs.clone())
        else {
            debug!("No subscribers for {}", destination);
            return;
        };

        for (session, subscription) in subscribers {
            let seq = self.inner.message_seq.fetch_add(1, Ordering::Relaxed);
            let message = StompFrame::new(StompCommand::Message)
                .header("destination", destination)
                .header("content-type", content_type)
                .header("subscription", subscription)
                .header("message-id", format!("{}-{}", session, seq))
                .body(body);
            self.reply(&session, &message);
        }
    }

    fn send_receipt(&self, session: &SessionId, frame: &StompFrame) {
        if let Some(receipt) = frame.get("receipt") {
            let ack = StompFrame::new(StompCommand::Receipt).header("receipt-id", receipt);
            self.reply(session, &ack);
        }
    }

    fn reply(&self, session: &SessionId, frame: &StompFrame) {
        let Some(tx) = self.inner.sessions.get(session) else {
            warn!("Attempted to send {} to closed session {}", frame.command, session);
            return;
        };
        if tx.send(Message::Text(frame.encode().into())).is_err() {
            warn!("Failed to queue {} for session {}", frame.command, session);
        }
    }
}
