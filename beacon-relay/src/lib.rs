//! Minimal STOMP broker for local development and tests.
//!
//! It fans every `SEND` to `{app_prefix}/X` out to the subscribers of
//! `{topic_prefix}/X`, the sender included, the way a simple broker does.

mod broker;

pub use broker::*;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub const RELAY_PATH: &str = "/ws";

pub fn router(broker: RelayBroker) -> Router {
    Router::new()
        .route(RELAY_PATH, get(ws_handler))
        .with_state(broker)
}

pub async fn serve(listener: TcpListener, broker: RelayBroker) -> Result<()> {
    info!("Relay broker listening on ws://{}{}", listener.local_addr()?, RELAY_PATH);
    axum::serve(listener, router(broker)).await?;
    Ok(())
}

/// Binds an ephemeral local port and serves in the background.
pub async fn spawn_local(broker: RelayBroker) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = serve(listener, broker).await {
            tracing::error!("Relay broker stopped: {:#}", e);
        }
    });
    Ok(addr)
}
