use anyhow::{Result, bail};
use async_trait::async_trait;
use beacon_client::media::LocalTrack;
use beacon_client::negotiation::SdpKind;
use beacon_client::{PeerConnector, PeerEvent, PeerTransport};
use beacon_core::IceCandidate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Everything the engine asked one peer to do.
#[derive(Debug, Default, Clone)]
pub struct PeerCalls {
    pub tracks: Vec<String>,
    pub local: Vec<(SdpKind, String)>,
    pub remote: Vec<(SdpKind, String)>,
    pub candidates: Vec<IceCandidate>,
    pub closed: bool,
}

/// Connection primitive with canned SDP that records every call.
pub struct ScriptedPeer {
    pub index: usize,
    calls: Mutex<PeerCalls>,
    events: mpsc::Sender<PeerEvent>,
}

impl ScriptedPeer {
    pub async fn calls(&self) -> PeerCalls {
        self.calls.lock().await.clone()
    }

    /// Raises an event as the underlying connection would.
    pub async fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl PeerTransport for ScriptedPeer {
    async fn add_track(&self, track: LocalTrack) -> Result<()> {
        self.calls.lock().await.tracks.push(track.id().to_owned());
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        Ok(format!("v=0 offer-{}", self.index))
    }

    async fn create_answer(&self) -> Result<String> {
        Ok(format!("v=0 answer-{}", self.index))
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.calls.lock().await.local.push((kind, sdp));
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.calls.lock().await.remote.push((kind, sdp));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.calls.lock().await.candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().await.closed = true;
        Ok(())
    }
}

/// Hands out [`ScriptedPeer`]s and keeps them for inspection.
#[derive(Default)]
pub struct ScriptedConnector {
    peers: Mutex<Vec<Arc<ScriptedPeer>>>,
    fail_next: AtomicBool,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of primitives created so far.
    pub async fn created(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn peer(&self, index: usize) -> Arc<ScriptedPeer> {
        self.peers.lock().await[index].clone()
    }
}

#[async_trait]
impl PeerConnector for ScriptedConnector {
    async fn connect(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerTransport>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("peer connection refused");
        }

        let mut peers = self.peers.lock().await;
        let peer = Arc::new(ScriptedPeer {
            index: peers.len(),
            calls: Mutex::new(PeerCalls::default()),
            events,
        });
        peers.push(peer.clone());
        tracing::debug!("[ScriptedConnector] created peer {}", peer.index);
        Ok(peer)
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}
