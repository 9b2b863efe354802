use crate::media::{LocalTrack, RemoteTrack};
use anyhow::Result;
use async_trait::async_trait;
use beacon_core::IceCandidate;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events the connection primitive raises towards the negotiation engine.
#[derive(Debug)]
pub enum PeerEvent {
    /// A local network path was discovered and should be trickled.
    LocalCandidate(IceCandidate),

    /// The remote side started sending a track.
    RemoteTrack(RemoteTrack),

    StateChanged(PeerState),
}

/// One point-to-point media connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: LocalTrack) -> Result<()>;

    async fn create_offer(&self) -> Result<String>;

    async fn create_answer(&self) -> Result<String>;

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates connection primitives wired to an event channel.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerTransport>>;
}
