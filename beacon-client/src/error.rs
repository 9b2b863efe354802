use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    ConnectFailed(String),

    #[error("relay channel is not connected")]
    NotConnected,

    #[error("relay broker error: {0}")]
    Broker(String),

    #[error("relay frame error: {0}")]
    Frame(String),

    #[error("relay socket error: {0}")]
    Socket(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Why a join could not establish a session.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Connect(#[from] RelayError),

    #[error(transparent)]
    Device(#[from] MediaError),

    #[error("negotiation failed: {0:#}")]
    Negotiation(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum JoinError {
    /// A setup is already running, or this room is already live.
    #[error("a session is already active or being set up")]
    AlreadyActive,

    #[error("session setup failed: {0}")]
    SetupFailed(#[from] SetupError),
}

impl JoinError {
    pub fn is_already_active(&self) -> bool {
        matches!(self, JoinError::AlreadyActive)
    }
}
