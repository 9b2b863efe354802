use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of the negotiation a participant plays for the whole session.
///
/// The initiator is the only side that ever creates an offer, which rules out
/// glare between two peers offering at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initiator" | "teacher" => Ok(Role::Initiator),
            "responder" | "student" => Ok(Role::Responder),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
