//! Session Store error type (spec §4.F, §7).

use thiserror::Error;
use zen_claw_core::GatewayError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} already has a task in flight")]
    Busy(String),

    #[error("store io error: {0}")]
    Io(String),

    #[error("store encode/decode error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

impl From<SessionError> for GatewayError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => GatewayError::UnknownSession(id),
            SessionError::Busy(id) => GatewayError::SessionBusy(id),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_unknown_session() {
        let err: GatewayError = SessionError::NotFound("s1".into()).into();
        assert!(matches!(err, GatewayError::UnknownSession(id) if id == "s1"));
    }

    #[test]
    fn busy_maps_to_session_busy() {
        let err: GatewayError = SessionError::Busy("s1".into()).into();
        assert!(matches!(err, GatewayError::SessionBusy(id) if id == "s1"));
    }
}
