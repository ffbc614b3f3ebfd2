use crate::protocol::types::ProtocolError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a connection currently stands.
///
/// `Done` and the three error phases are terminal: the connection is closed
/// once it reaches one, after sending `ERROR\n` and the message for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingVerb,
    AwaitingHeaderPath,
    HandlingVerb,
    Done,
    InvalidVerb,
    InvalidFile,
    IncorrectDataAmount,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Phase::AwaitingVerb | Phase::AwaitingHeaderPath | Phase::HandlingVerb
        )
    }

    pub fn error(self) -> Option<ProtocolError> {
        match self {
            Phase::InvalidVerb => Some(ProtocolError::InvalidVerb),
            Phase::InvalidFile => Some(ProtocolError::InvalidFile),
            Phase::IncorrectDataAmount => Some(ProtocolError::IncorrectDataAmount),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Phase {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::InvalidVerb => Phase::InvalidVerb,
            ProtocolError::InvalidFile => Phase::InvalidFile,
            ProtocolError::IncorrectDataAmount => Phase::IncorrectDataAmount,
        }
    }
}
