/// Negotiation progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingLocalDescription,
    /// Initiator: offer sent, waiting for the answer.
    AwaitingRemoteDescription,
    /// Responder: waiting for the initiator's offer.
    AwaitingOffer,
    Established,
    Closed,
}

impl EngineState {
    pub fn is_established(self) -> bool {
        matches!(self, EngineState::Established)
    }
}

/// Why an engine's event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Shutdown,
    RelayLost,
    PeerFailed,
}
