use crate::config::ClientConfig;
use crate::media::{LocalTrack, MediaKind, RemoteTrack};
use crate::negotiation::{PeerConnector, PeerEvent, PeerState, PeerTransport, SdpKind};
use anyhow::Result;
use async_trait::async_trait;
use beacon_core::IceCandidate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

impl From<RTCPeerConnectionState> for PeerState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => PeerState::Connecting,
            RTCPeerConnectionState::Connected => PeerState::Connected,
            RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
            RTCPeerConnectionState::Failed => PeerState::Failed,
            RTCPeerConnectionState::Closed => PeerState::Closed,
            _ => PeerState::New,
        }
    }
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: candidate.username_fragment,
    }
}

fn to_description(kind: SdpKind, sdp: String) -> Result<RTCSessionDescription> {
    Ok(match kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
    })
}

/// Builds `webrtc` peer connections from the client configuration.
#[derive(Clone)]
pub struct RtcPeerConnector {
    config: ClientConfig,
}

impl RtcPeerConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn connect(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerTransport>> {
        Ok(Arc::new(RtcPeer::new(&self.config, events).await?))
    }
}

/// `RTCPeerConnection` with its callbacks forwarded as [`PeerEvent`]s.
pub struct RtcPeer {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcPeer {
    pub async fn new(config: &ClientConfig, event_tx: mpsc::Sender<PeerEvent>) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();

                Box::pin(async move {
                    info!("Peer connection state changed: {:?}", s);
                    let _ = tx.send(PeerEvent::StateChanged(s.into())).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(PeerEvent::LocalCandidate(from_rtc_candidate(init))).await;
            })
        }));

        let track_tx = event_tx;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();

                Box::pin(async move {
                    debug!("Remote track {} ({:?})", track.id(), track.kind());
                    let remote = RemoteTrack {
                        id: track.id(),
                        stream_id: track.stream_id(),
                        kind: MediaKind::from(track.kind()),
                        rtp: Some(track),
                    };
                    let _ = tx.send(PeerEvent::RemoteTrack(remote)).await;
                })
            },
        ));

        Ok(Self { peer_connection })
    }
}

#[async_trait]
impl PeerTransport for RtcPeer {
    async fn add_track(&self, track: LocalTrack) -> Result<()> {
        let sender = self.peer_connection.add_track(track).await?;

        // RTCP has to be drained for the interceptors to work.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        Ok(self.peer_connection.create_offer(None).await?.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        Ok(self.peer_connection.create_answer(None).await?.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.peer_connection
            .set_local_description(to_description(kind, sdp)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_description(kind, sdp)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Error while closing peer connection: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
