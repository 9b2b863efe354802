use crate::config::ClientConfig;
use crate::error::RelayError;
use crate::relay::{RelayChannel, Subscription, SubscriptionHandle};
use async_trait::async_trait;
use beacon_core::{StompCommand, StompFrame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Fresh,
    Connected,
    Failed,
    Closed,
}

struct SocketTasks {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

struct StompInner {
    lifecycle: Mutex<Lifecycle>,
    connected: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    receipts: Mutex<HashMap<String, oneshot::Sender<()>>>,
    tasks: Mutex<Option<SocketTasks>>,
    next_id: AtomicU64,
}

impl StompInner {
    fn lock<'a, T>(m: &'a Mutex<T>) -> MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn push_frame(&self, frame: &StompFrame) -> Result<(), RelayError> {
        let outbound = Self::lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(RelayError::NotConnected);
        };
        tx.send(Message::Text(frame.encode()))
            .map_err(|_| RelayError::NotConnected)
    }

    /// Sends `frame` with a receipt header and waits for the RECEIPT.
    async fn request(&self, frame: StompFrame, wait: Duration) -> Result<(), RelayError> {
        let receipt = self.next_id("receipt");
        let (done_tx, done_rx) = oneshot::channel();
        Self::lock(&self.receipts).insert(receipt.clone(), done_tx);

        if let Err(e) = self.push_frame(&frame.header("receipt", receipt.clone())) {
            Self::lock(&self.receipts).remove(&receipt);
            return Err(e);
        }

        match timeout(wait, done_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RelayError::NotConnected),
            Err(_) => {
                Self::lock(&self.receipts).remove(&receipt);
                Err(RelayError::Broker(format!("no receipt within {wait:?}")))
            }
        }
    }

    /// Drops every subscription sender so consumers observe the end of stream.
    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        Self::lock(&self.subscriptions).clear();
        Self::lock(&self.receipts).clear();
        Self::lock(&self.outbound).take();
    }
}

/// Relay channel speaking STOMP 1.2 over a WebSocket.
#[derive(Clone)]
pub struct StompRelay {
    config: ClientConfig,
    inner: Arc<StompInner>,
}

impl StompRelay {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            inner: Arc::new(StompInner {
                lifecycle: Mutex::new(Lifecycle::Fresh),
                connected: AtomicBool::new(false),
                outbound: Mutex::new(None),
                subscriptions: Mutex::new(HashMap::new()),
                receipts: Mutex::new(HashMap::new()),
                tasks: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    async fn open(&self, endpoint: &str) -> Result<WsStream, RelayError> {
        let (mut ws, _) = connect_async(endpoint)
            .await
            .map_err(|e| RelayError::ConnectFailed(e.to_string()))?;

        let host = endpoint
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_owned))
            .unwrap_or_else(|| "localhost".to_owned());

        let connect = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        ws.send(Message::Text(connect.encode()))
            .await
            .map_err(|e| RelayError::ConnectFailed(e.to_string()))?;

        while let Some(msg) = ws.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(RelayError::ConnectFailed(e.to_string())),
            };

            let Some(frame) =
                StompFrame::decode(&text).map_err(|e| RelayError::ConnectFailed(e.to_string()))?
            else {
                continue;
            };

            match frame.command {
                StompCommand::Connected => {
                    debug!(
                        "STOMP session established (version {:?})",
                        frame.get("version")
                    );
                    return Ok(ws);
                }
                StompCommand::Error => {
                    let reason = frame.get("message").unwrap_or(&frame.body).to_owned();
                    return Err(RelayError::ConnectFailed(reason));
                }
                other => warn!("Unexpected {} frame before CONNECTED", other),
            }
        }

        Err(RelayError::ConnectFailed(
            "socket closed before CONNECTED".to_owned(),
        ))
    }

    async fn writer_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to write to relay socket: {}", e);
                break;
            }
        }

        let _ = write.close().await;
        debug!("Relay writer task terminated");
    }

    async fn reader_task(mut read: SplitStream<WsStream>, inner: Arc<StompInner>) {
        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("Relay socket error: {}", e);
                    break;
                }
            };

            let frame = match StompFrame::decode(&text) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping undecodable relay frame: {}", e);
                    continue;
                }
            };

            match frame.command {
                StompCommand::Message => {
                    let Some(id) = frame.get("subscription") else {
                        warn!("MESSAGE frame without subscription header");
                        continue;
                    };
                    let subs = StompInner::lock(&inner.subscriptions);
                    match subs.get(id) {
                        Some(tx) => {
                            let _ = tx.send(frame.body);
                        }
                        None => debug!("MESSAGE for unknown subscription {}", id),
                    }
                }
                StompCommand::Receipt => {
                    if let Some(id) = frame.get("receipt-id") {
                        if let Some(done) = StompInner::lock(&inner.receipts).remove(id) {
                            let _ = done.send(());
                        }
                    }
                }
                StompCommand::Error => {
                    error!(
                        "Relay broker error: {}",
                        frame.get("message").unwrap_or(&frame.body)
                    );
                    break;
                }
                other => debug!("Ignoring {} frame from relay", other),
            }
        }

        inner.mark_lost();
        debug!("Relay reader task terminated");
    }
}

#[async_trait]
impl RelayChannel for StompRelay {
    async fn connect(&self, endpoint: &str) -> Result<(), RelayError> {
        {
            let lifecycle = StompInner::lock(&self.inner.lifecycle);
            match *lifecycle {
                Lifecycle::Fresh => {}
                Lifecycle::Connected => return Ok(()),
                Lifecycle::Failed | Lifecycle::Closed => {
                    return Err(RelayError::ConnectFailed(
                        "relay channel cannot be reused".to_owned(),
                    ));
                }
            }
        }

        info!("Connecting to relay: {}", endpoint);

        let opened = match timeout(self.config.connect_timeout, self.open(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::ConnectFailed(format!(
                "no CONNECTED frame within {:?}",
                self.config.connect_timeout
            ))),
        };

        let ws = match opened {
            Ok(ws) => ws,
            Err(e) => {
                error!("Relay connection failed: {}", e);
                *StompInner::lock(&self.inner.lifecycle) = Lifecycle::Failed;
                return Err(e);
            }
        };

        let (write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();

        *StompInner::lock(&self.inner.outbound) = Some(tx);
        self.inner.connected.store(true, Ordering::SeqCst);
        *StompInner::lock(&self.inner.lifecycle) = Lifecycle::Connected;

        let writer = tokio::spawn(Self::writer_task(write, rx));
        let reader = tokio::spawn(Self::reader_task(read, self.inner.clone()));
        *StompInner::lock(&self.inner.tasks) = Some(SocketTasks { writer, reader });

        info!("Relay connected");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let id = self.inner.next_id("sub");
        let destination = self.config.subscribe_destination(topic);
        let (tx, rx) = mpsc::unbounded_channel();

        StompInner::lock(&self.inner.subscriptions).insert(id.clone(), tx);

        let frame = StompFrame::new(StompCommand::Subscribe)
            .header("id", id.clone())
            .header("destination", destination.clone())
            .header("ack", "auto");
        if let Err(e) = self.inner.request(frame, self.config.connect_timeout).await {
            StompInner::lock(&self.inner.subscriptions).remove(&id);
            return Err(e);
        }

        debug!("Subscribed {} to {}", id, destination);

        Ok(Subscription {
            handle: SubscriptionHandle {
                id,
                topic: topic.to_owned(),
            },
            messages: rx,
        })
    }

    async fn send(&self, address: &str, payload: String) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }

        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", self.config.send_destination(address))
            .header("content-type", "application/json")
            .body(payload);

        self.inner.push_frame(&frame)
    }

    async fn disconnect(&self) {
        {
            let mut lifecycle = StompInner::lock(&self.inner.lifecycle);
            if *lifecycle == Lifecycle::Closed {
                return;
            }
            *lifecycle = Lifecycle::Closed;
        }

        if self.inner.connected.swap(false, Ordering::SeqCst) {
            let ids: Vec<String> = StompInner::lock(&self.inner.subscriptions)
                .keys()
                .cloned()
                .collect();
            for id in ids {
                let _ = self
                    .inner
                    .push_frame(&StompFrame::new(StompCommand::Unsubscribe).header("id", id));
            }

            let frame = StompFrame::new(StompCommand::Disconnect);
            match self.inner.request(frame, self.config.disconnect_timeout).await {
                Ok(()) => debug!("Relay acknowledged DISCONNECT"),
                Err(e) => warn!("DISCONNECT not acknowledged: {}", e),
            }
        }

        self.inner.mark_lost();

        let tasks = StompInner::lock(&self.inner.tasks).take();
        if let Some(SocketTasks { writer, reader }) = tasks {
            // The writer exits once its queue closes, sending the close frame.
            if timeout(self.config.disconnect_timeout, writer).await.is_err() {
                warn!("Relay writer did not finish within {:?}", self.config.disconnect_timeout);
            }
            reader.abort();
        }

        info!("Relay disconnected");
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}
