use crate::config::{ClientConfig, ResponderMedia};
use crate::error::{JoinError, SetupError};
use crate::media::{LocalMedia, MediaSource, NoMedia, RemoteStream};
use crate::negotiation::{
    EngineExit, EngineOutputs, EngineState, NegotiationEngine, PeerConnector, RtcPeerConnector,
    SessionStats, SessionStatsSnapshot,
};
use crate::relay::{RelayChannel, RelayFactory, StompRelay};
use crate::session::SessionStatus;
use crate::session::coordinator_state::{ActiveSession, CoordinatorState, Phase};
use anyhow::anyhow;
use beacon_core::{Role, RoomId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

const PEER_EVENT_BUFFER: usize = 256;

pub struct CoordinatorBuilder {
    config: ClientConfig,
    relay_factory: Option<RelayFactory>,
    peer_connector: Option<Arc<dyn PeerConnector>>,
    media: Option<Arc<dyn MediaSource>>,
}

impl CoordinatorBuilder {
    pub fn relay_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn RelayChannel> + Send + Sync + 'static,
    {
        let factory: RelayFactory = Arc::new(factory);
        self.relay_factory = Some(factory);
        self
    }

    pub fn peer_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.peer_connector = Some(connector);
        self
    }

    pub fn media(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn build(self) -> Coordinator {
        let config = self.config;

        let relay_factory = self.relay_factory.unwrap_or_else(|| {
            let config = config.clone();
            let factory: RelayFactory = Arc::new(move || {
                Arc::new(StompRelay::new(config.clone())) as Arc<dyn RelayChannel>
            });
            factory
        });
        let peer_connector = self
            .peer_connector
            .unwrap_or_else(|| Arc::new(RtcPeerConnector::new(config.clone())));
        let media = self.media.unwrap_or_else(|| Arc::new(NoMedia));

        Coordinator {
            inner: Arc::new(CoordinatorInner {
                config,
                relay_factory,
                peer_connector,
                media,
                state: Mutex::new(CoordinatorState::new()),
                transitions: tokio::sync::Mutex::new(()),
                setup_finished: Notify::new(),
                remote_stream: Arc::new(watch::channel(None).0),
                negotiation_state: Arc::new(watch::channel(EngineState::Idle).0),
                next_generation: AtomicU64::new(0),
            }),
        }
    }
}

/// Owns the one live session of the process.
///
/// Cloning yields another handle to the same coordinator. Join and leave
/// run on spawned tasks, so a caller that stops waiting never interrupts a
/// half-built peer connection.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: ClientConfig,
    relay_factory: RelayFactory,
    peer_connector: Arc<dyn PeerConnector>,
    media: Arc<dyn MediaSource>,
    state: Mutex<CoordinatorState>,
    /// Held for the whole of every setup and teardown.
    transitions: tokio::sync::Mutex<()>,
    setup_finished: Notify,
    remote_stream: Arc<watch::Sender<Option<RemoteStream>>>,
    negotiation_state: Arc<watch::Sender<EngineState>>,
    next_generation: AtomicU64,
}

impl Coordinator {
    pub fn builder(config: ClientConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            relay_factory: None,
            peer_connector: None,
            media: None,
        }
    }

    /// Connects to `room` in the given role.
    ///
    /// Returns [`JoinError::AlreadyActive`] without side effects while another
    /// setup is running or when `room` is already live. A live session for a
    /// different room is left first.
    pub async fn join(&self, room: impl Into<RoomId>, role: Role) -> Result<(), JoinError> {
        let room = room.into();

        let previous = {
            let mut state = self.inner.lock_state();
            match &state.phase {
                Phase::SettingUp { room: pending } => {
                    info!(
                        "Setup for room {} in progress; ignoring join for {}",
                        pending, room
                    );
                    return Err(JoinError::AlreadyActive);
                }
                Phase::Active(session) if session.room == room => {
                    info!("Already connected to room {}", room);
                    return Err(JoinError::AlreadyActive);
                }
                _ => {}
            }

            state.leave_requested = false;
            let previous = state.take_active();
            state.phase = Phase::SettingUp { room: room.clone() };
            previous
        };

        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.complete_join(room, role, previous).await });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(JoinError::SetupFailed(SetupError::Negotiation(anyhow!(
                "setup task ended abnormally: {e}"
            )))),
        }
    }

    /// Closes the negotiation, then the relay channel. No-op when idle; waits
    /// for an in-flight setup and tears it down as soon as it finishes.
    pub async fn leave(&self) {
        let inner = self.inner.clone();
        if let Err(e) = tokio::spawn(async move { inner.leave().await }).await {
            error!("Leave task ended abnormally: {}", e);
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock_state().status()
    }

    /// The remote stream of the live session; `None` until the first track.
    pub fn remote_stream(&self) -> watch::Receiver<Option<RemoteStream>> {
        self.inner.remote_stream.subscribe()
    }

    pub fn negotiation_state(&self) -> watch::Receiver<EngineState> {
        self.inner.negotiation_state.subscribe()
    }

    pub fn local_media(&self) -> Option<LocalMedia> {
        match &self.inner.lock_state().phase {
            Phase::Active(session) => session.local_media.clone(),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<SessionStatsSnapshot> {
        match &self.inner.lock_state().phase {
            Phase::Active(session) => Some(session.stats.snapshot()),
            _ => None,
        }
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn complete_join(
        self: Arc<Self>,
        room: RoomId,
        role: Role,
        previous: Option<ActiveSession>,
    ) -> Result<(), JoinError> {
        let _transition = self.transitions.lock().await;

        if let Some(previous) = previous {
            info!("Switching session from room {} to {}", previous.room, room);
            self.teardown(previous).await;
        }

        let result = self.setup(&room, role).await;

        let (outcome, deferred) = {
            let mut state = self.lock_state();
            let outcome = match result {
                Ok(session) => {
                    state.phase = Phase::Active(session);
                    Ok(())
                }
                Err(e) => {
                    state.phase = Phase::Idle;
                    Err(JoinError::SetupFailed(e))
                }
            };
            let deferred = if std::mem::take(&mut state.leave_requested) {
                state.take_active()
            } else {
                None
            };
            (outcome, deferred)
        };

        match &outcome {
            Ok(()) => info!("Joined room {} as {}", room, role),
            Err(e) => error!("Failed to join room {}: {}", room, e),
        }

        if let Some(session) = deferred {
            info!("Applying leave requested during setup of room {}", session.room);
            self.teardown(session).await;
        }

        self.setup_finished.notify_waiters();
        outcome
    }

    async fn setup(self: &Arc<Self>, room: &RoomId, role: Role) -> Result<ActiveSession, SetupError> {
        let relay = (self.relay_factory)();

        if let Err(e) = relay.connect(&self.config.relay_url).await {
            relay.disconnect().await;
            return Err(e.into());
        }

        match self.negotiate(relay.clone(), room, role).await {
            Ok(session) => Ok(session),
            Err(e) => {
                relay.disconnect().await;
                Err(e)
            }
        }
    }

    async fn negotiate(
        self: &Arc<Self>,
        relay: Arc<dyn RelayChannel>,
        room: &RoomId,
        role: Role,
    ) -> Result<ActiveSession, SetupError> {
        let subscription = relay.subscribe(&room.signal_topic()).await?;
        let local_media = self.acquire_media(role).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stats = Arc::new(SessionStats::default());
        let outputs = EngineOutputs {
            remote_stream: self.remote_stream.clone(),
            state: self.negotiation_state.clone(),
            stats: stats.clone(),
        };
        self.remote_stream.send_replace(None);

        let (events_tx, events_rx) = mpsc::channel(PEER_EVENT_BUFFER);
        let mut engine = NegotiationEngine::new(room.clone(), role, relay.clone(), outputs);

        if let Err(e) = engine
            .start(self.peer_connector.as_ref(), events_tx, local_media.as_ref())
            .await
        {
            engine.close().await;
            return Err(SetupError::Negotiation(e));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let coordinator = Arc::downgrade(self);
        let engine_task = tokio::spawn(async move {
            let exit = engine.run(subscription.messages, events_rx, shutdown_rx).await;
            if exit != EngineExit::Shutdown {
                if let Some(inner) = coordinator.upgrade() {
                    // Separate task: teardown awaits this one.
                    tokio::spawn(async move { inner.end_failed_session(generation, exit).await });
                }
            }
            exit
        });

        Ok(ActiveSession {
            room: room.clone(),
            role,
            generation,
            relay,
            shutdown: shutdown_tx,
            engine_task,
            local_media,
            stats,
        })
    }

    async fn acquire_media(&self, role: Role) -> Result<Option<LocalMedia>, SetupError> {
        let policy = match role {
            Role::Initiator => ResponderMedia::RequireSend,
            Role::Responder => self.config.responder_media,
        };

        match policy {
            ResponderMedia::ReceiveOnly => Ok(None),
            ResponderMedia::RequireSend => Ok(Some(self.media.acquire().await?)),
            ResponderMedia::PreferSend => match self.media.acquire().await {
                Ok(media) => Ok(Some(media)),
                Err(e) => {
                    warn!("{}; joining receive-only", e);
                    Ok(None)
                }
            },
        }
    }

    async fn leave(&self) {
        let setup_finished = self.setup_finished.notified();

        let in_flight = {
            let mut state = self.lock_state();
            match &state.phase {
                Phase::SettingUp { room } => {
                    info!("Deferring leave until setup of room {} completes", room);
                    state.leave_requested = true;
                    true
                }
                _ => false,
            }
        };

        if in_flight {
            setup_finished.await;
            return;
        }

        let _transition = self.transitions.lock().await;
        let session = self.lock_state().take_active();
        match session {
            Some(session) => self.teardown(session).await,
            None => debug!("Leave requested with no active session"),
        }
    }

    async fn end_failed_session(&self, generation: u64, exit: EngineExit) {
        let _transition = self.transitions.lock().await;

        let session = {
            let mut state = self.lock_state();
            match &state.phase {
                Phase::Active(session) if session.generation == generation => state.take_active(),
                _ => None,
            }
        };

        if let Some(session) = session {
            warn!(
                "Session for room {} ended ({:?}); tearing down",
                session.room, exit
            );
            self.teardown(session).await;
        }
    }

    /// Negotiation first, relay second.
    async fn teardown(&self, session: ActiveSession) {
        let ActiveSession {
            room,
            relay,
            shutdown,
            engine_task,
            ..
        } = session;

        let _ = shutdown.send(());
        match engine_task.await {
            Ok(exit) => debug!("Negotiation task for room {} exited: {:?}", room, exit),
            Err(e) => warn!("Negotiation task for room {} failed: {}", room, e),
        }

        relay.disconnect().await;
        self.remote_stream.send_replace(None);
        info!("Left room {}", room);
    }
}
