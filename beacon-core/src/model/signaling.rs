use crate::model::ice::IceCandidate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload exchanged over the relay topic of a room.
///
/// The room itself is never part of the body; it is carried by the topic the
/// message travels on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("malformed signaling payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate { .. } => "candidate",
        }
    }

    pub fn to_json(&self) -> Result<String, SignalError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SignalError> {
        Ok(serde_json::from_str(text)?)
    }
}
