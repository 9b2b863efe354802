use crate::broker::{FrameOutcome, RelayBroker, SessionId};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use beacon_core::StompFrame;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn ws_handler(ws: WebSocketUpgrade, State(broker): State<RelayBroker>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, broker))
}

async fn handle_socket(socket: WebSocket, broker: RelayBroker) {
    let session = SessionId::new();
    info!("New relay connection: {}", session);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    broker.add_session(session, tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn({
        let broker = broker.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match StompFrame::decode(text.as_str()) {
                        Ok(Some(frame)) => {
                            if broker.handle_frame(session, frame) == FrameOutcome::Close {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            broker.reject(&session, &e.to_string());
                            break;
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => {
            // Let queued RECEIPT/ERROR frames go out before closing.
            broker.remove_session(&session);
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    };

    broker.remove_session(&session);
    info!("Relay connection closed: {}", session);
}
