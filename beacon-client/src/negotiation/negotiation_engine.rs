use crate::error::RelayError;
use crate::media::{LocalMedia, RemoteStream, RemoteTrack};
use crate::negotiation::{
    EngineExit, EngineState, PeerConnector, PeerEvent, PeerState, PeerTransport, SdpKind,
    SessionStats,
};
use crate::relay::RelayChannel;
use anyhow::{Context, Result, bail};
use beacon_core::{IceCandidate, Role, RoomId, SignalMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Observable results of a negotiation, shared with whoever drives it.
#[derive(Clone)]
pub struct EngineOutputs {
    pub remote_stream: Arc<watch::Sender<Option<RemoteStream>>>,
    pub state: Arc<watch::Sender<EngineState>>,
    pub stats: Arc<SessionStats>,
}

impl Default for EngineOutputs {
    fn default() -> Self {
        Self {
            remote_stream: Arc::new(watch::channel(None).0),
            state: Arc::new(watch::channel(EngineState::Idle).0),
            stats: Arc::new(SessionStats::default()),
        }
    }
}

/// Drives the offer/answer/candidate exchange of one session over the
/// room's relay topic.
pub struct NegotiationEngine {
    room: RoomId,
    role: Role,
    address: String,
    relay: Arc<dyn RelayChannel>,
    peer: Option<Arc<dyn PeerTransport>>,
    state: EngineState,
    local_description_set: bool,
    remote_description_set: bool,
    description_sent: bool,
    pending_candidates: Vec<IceCandidate>,
    // Brokers echo publishes back to the sender's own subscription.
    own_signals: HashSet<String>,
    outputs: EngineOutputs,
}

impl NegotiationEngine {
    pub fn new(
        room: RoomId,
        role: Role,
        relay: Arc<dyn RelayChannel>,
        outputs: EngineOutputs,
    ) -> Self {
        outputs.state.send_replace(EngineState::Idle);

        Self {
            address: room.signal_topic(),
            room,
            role,
            relay,
            peer: None,
            state: EngineState::Idle,
            local_description_set: false,
            remote_description_set: false,
            description_sent: false,
            pending_candidates: Vec::new(),
            own_signals: HashSet::new(),
            outputs,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn local_description_set(&self) -> bool {
        self.local_description_set
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Creates the connection primitive and, for the initiator, sends the offer.
    pub async fn start(
        &mut self,
        connector: &dyn PeerConnector,
        events: mpsc::Sender<PeerEvent>,
        media: Option<&LocalMedia>,
    ) -> Result<()> {
        if self.state != EngineState::Idle {
            bail!("negotiation for room {} already started", self.room);
        }

        self.set_state(EngineState::AwaitingLocalDescription);

        let peer = connector
            .connect(events)
            .await
            .context("failed to create peer connection")?;
        self.peer = Some(peer.clone());

        if let Some(media) = media {
            for track in &media.tracks {
                peer.add_track(track.clone())
                    .await
                    .with_context(|| format!("failed to add local track {}", track.id()))?;
            }
        }

        match self.role {
            Role::Initiator => {
                let sdp = peer.create_offer().await.context("failed to create offer")?;
                peer.set_local_description(SdpKind::Offer, sdp.clone())
                    .await
                    .context("failed to apply local offer")?;
                self.local_description_set = true;

                info!("Sending offer for room {}", self.room);
                self.publish(&SignalMessage::Offer { sdp })
                    .await
                    .context("failed to send offer")?;
                self.description_sent = true;
                self.set_state(EngineState::AwaitingRemoteDescription);
                self.flush_pending_candidates().await;
            }
            Role::Responder => {
                info!("Waiting for offer in room {}", self.room);
                self.set_state(EngineState::AwaitingOffer);
            }
        }

        Ok(())
    }

    /// Handles one raw payload delivered on the room topic.
    pub async fn on_inbound_payload(&mut self, payload: String) {
        if self.own_signals.contains(&payload) {
            debug!("Ignoring echo of own signal in room {}", self.room);
            return;
        }

        self.outputs.stats.signal_received();

        match SignalMessage::from_json(&payload) {
            Ok(msg) => self.on_inbound_signal(msg).await,
            Err(e) => {
                self.outputs.stats.malformed_signal();
                warn!("Malformed signal in room {}: {}", self.room, e);
            }
        }
    }

    pub async fn on_inbound_signal(&mut self, msg: SignalMessage) {
        if self.state == EngineState::Closed {
            debug!("Dropping {} signal for closed session", msg.kind());
            return;
        }

        match msg {
            SignalMessage::Offer { sdp } => self.accept_offer(sdp).await,
            SignalMessage::Answer { sdp } => self.accept_answer(sdp).await,
            SignalMessage::Candidate { candidate } => self.add_remote_candidate(candidate).await,
        }
    }

    async fn accept_offer(&mut self, sdp: String) {
        if self.role != Role::Responder {
            self.protocol_violation("offer received by the initiator");
            return;
        }
        if self.local_description_set {
            self.protocol_violation("offer received after the local description was set");
            return;
        }
        let Some(peer) = self.peer.clone() else {
            debug!("Dropping offer: no peer connection");
            return;
        };

        if let Err(e) = self.answer_offer(peer.as_ref(), sdp).await {
            error!("Failed to answer offer in room {}: {:#}", self.room, e);
        }
    }

    async fn answer_offer(&mut self, peer: &dyn PeerTransport, sdp: String) -> Result<()> {
        peer.set_remote_description(SdpKind::Offer, sdp)
            .await
            .context("failed to apply remote offer")?;
        self.remote_description_set = true;

        let answer = peer.create_answer().await.context("failed to create answer")?;
        peer.set_local_description(SdpKind::Answer, answer.clone())
            .await
            .context("failed to apply local answer")?;
        self.local_description_set = true;

        info!("Sending answer for room {}", self.room);
        self.publish(&SignalMessage::Answer { sdp: answer })
            .await
            .context("failed to send answer")?;
        self.description_sent = true;
        self.set_state(EngineState::Established);
        self.flush_pending_candidates().await;

        Ok(())
    }

    async fn accept_answer(&mut self, sdp: String) {
        if self.role != Role::Initiator {
            self.protocol_violation("answer received by the responder");
            return;
        }
        if !self.local_description_set {
            self.protocol_violation("answer received before an offer was sent");
            return;
        }
        if self.remote_description_set {
            self.protocol_violation("duplicate answer");
            return;
        }
        let Some(peer) = self.peer.clone() else {
            debug!("Dropping answer: no peer connection");
            return;
        };

        match peer.set_remote_description(SdpKind::Answer, sdp).await {
            Ok(()) => {
                self.remote_description_set = true;
                info!("Negotiation established for room {}", self.room);
                self.set_state(EngineState::Established);
            }
            Err(e) => error!("Failed to apply answer in room {}: {:#}", self.room, e),
        }
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(peer) = self.peer.clone() else {
            debug!("Dropping remote candidate: no peer connection");
            return;
        };
        // The primitive rejects candidates without a remote description; an
        // early one is dropped here so it never touches negotiation state.
        if !self.remote_description_set {
            debug!("Dropping remote candidate received before the remote description");
            return;
        }

        if let Err(e) = peer.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate in room {}: {:#}", self.room, e);
        }
    }

    /// Trickles a locally discovered candidate. Candidates found before the
    /// local description went out are held and flushed right after it.
    pub async fn on_local_candidate(&mut self, candidate: IceCandidate) {
        if self.state == EngineState::Closed {
            return;
        }
        if !self.description_sent {
            self.pending_candidates.push(candidate);
            return;
        }
        self.forward_candidate(candidate).await;
    }

    async fn flush_pending_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.forward_candidate(candidate).await;
        }
    }

    async fn forward_candidate(&mut self, candidate: IceCandidate) {
        if !self.relay.is_connected() {
            self.outputs.stats.candidate_dropped();
            debug!("Dropping local candidate: relay not connected");
            return;
        }

        match self.publish(&SignalMessage::Candidate { candidate }).await {
            Ok(()) => self.outputs.stats.candidate_sent(),
            Err(e) => {
                self.outputs.stats.candidate_dropped();
                debug!("Dropping local candidate: {}", e);
            }
        }
    }

    /// Merges an inbound track into the session's single remote stream.
    pub fn on_remote_track(&mut self, track: RemoteTrack) {
        if self.state == EngineState::Closed {
            return;
        }

        let room = &self.room;
        self.outputs.remote_stream.send_if_modified(|current| match current {
            Some(stream) => {
                let merged = stream.merge(track);
                if merged {
                    debug!("Added track to remote stream {}", stream.id);
                }
                merged
            }
            None => {
                info!("Remote stream {} available in room {}", track.stream_id, room);
                *current = Some(RemoteStream {
                    id: track.stream_id.clone(),
                    tracks: vec![track],
                });
                true
            }
        });
    }

    /// Idempotent; moves to `Closed` from any state.
    pub async fn close(&mut self) {
        if self.state == EngineState::Closed {
            return;
        }

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                warn!("Failed to close peer connection for room {}: {:#}", self.room, e);
            }
        }

        self.pending_candidates.clear();
        self.set_state(EngineState::Closed);
        info!("Negotiation for room {} closed", self.room);
    }

    /// Processes relay payloads and peer events in arrival order until
    /// shutdown, relay loss or connection failure, then closes.
    pub async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<String>,
        mut events: mpsc::Receiver<PeerEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> EngineExit {
        info!("Negotiation loop for room {} started", self.room);
        let mut events_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break EngineExit::Shutdown,

                payload = signals.recv() => match payload {
                    Some(p) => self.on_inbound_payload(p).await,
                    None => {
                        warn!("Relay subscription for room {} ended", self.room);
                        break EngineExit::RelayLost;
                    }
                },

                event = events.recv(), if events_open => match event {
                    Some(PeerEvent::LocalCandidate(c)) => self.on_local_candidate(c).await,
                    Some(PeerEvent::RemoteTrack(t)) => self.on_remote_track(t),
                    Some(PeerEvent::StateChanged(s @ (PeerState::Failed | PeerState::Closed))) => {
                        warn!("Peer connection for room {} is {:?}", self.room, s);
                        break EngineExit::PeerFailed;
                    }
                    Some(PeerEvent::StateChanged(s)) => {
                        debug!("Peer connection for room {} is {:?}", self.room, s);
                    }
                    None => events_open = false,
                },
            }
        };

        self.close().await;
        info!("Negotiation loop for room {} finished ({:?})", self.room, exit);
        exit
    }

    async fn publish(&mut self, msg: &SignalMessage) -> Result<(), RelayError> {
        let json = msg
            .to_json()
            .map_err(|e| RelayError::Frame(e.to_string()))?;
        self.own_signals.insert(json.clone());
        self.relay.send(&self.address, json).await
    }

    fn protocol_violation(&self, what: &str) {
        self.outputs.stats.protocol_violation();
        warn!("Protocol violation in room {}: {}; ignoring", self.room, what);
    }

    fn set_state(&mut self, state: EngineState) {
        self.state = state;
        self.outputs.state.send_replace(state);
    }
}
