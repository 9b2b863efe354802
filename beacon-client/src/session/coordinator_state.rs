use crate::media::LocalMedia;
use crate::negotiation::{EngineExit, SessionStats};
use crate::relay::RelayChannel;
use beacon_core::{Role, RoomId};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The live room, its negotiation task and the relay channel it runs on.
pub(crate) struct ActiveSession {
    pub(crate) room: RoomId,
    pub(crate) role: Role,
    pub(crate) generation: u64,
    pub(crate) relay: Arc<dyn RelayChannel>,
    pub(crate) shutdown: oneshot::Sender<()>,
    pub(crate) engine_task: JoinHandle<EngineExit>,
    pub(crate) local_media: Option<LocalMedia>,
    pub(crate) stats: Arc<SessionStats>,
}

pub(crate) enum Phase {
    Idle,
    SettingUp { room: RoomId },
    Active(ActiveSession),
}

pub(crate) struct CoordinatorState {
    pub(crate) phase: Phase,
    /// A `leave()` arrived while a setup was in flight.
    pub(crate) leave_requested: bool,
}

impl CoordinatorState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            leave_requested: false,
        }
    }

    pub(crate) fn take_active(&mut self) -> Option<ActiveSession> {
        if !matches!(self.phase, Phase::Active(_)) {
            return None;
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active(session) => Some(session),
            _ => None,
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        match &self.phase {
            Phase::Idle => SessionStatus::Idle,
            Phase::SettingUp { room } => SessionStatus::SettingUp { room: room.clone() },
            Phase::Active(session) => SessionStatus::Active {
                room: session.room.clone(),
                role: session.role,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    SettingUp { room: RoomId },
    Active { room: RoomId, role: Role },
}

impl SessionStatus {
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            SessionStatus::Idle => None,
            SessionStatus::SettingUp { room } | SessionStatus::Active { room, .. } => Some(room),
        }
    }
}
