//! Structured, crate-boundary error type for the gateway (spec §7).

use thiserror::Error;

/// Top-level error returned at the HTTP/WS boundary (spec §6, §7).
///
/// Each variant corresponds to one of spec §7's error kinds and carries
/// enough context to pick the right HTTP status code and client-visible
/// message. Tool errors never reach this type — they are resolved inside
/// the Agent Loop into a tool-result row (spec §7: "tool errors stay
/// inside the loop").
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad request, unknown session, unknown provider, invalid slash-command.
    #[error("{0}")]
    User(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Session already has a task in flight (spec §5 one-task-per-session).
    #[error("session {0} is busy")]
    SessionBusy(String),

    /// Provider network/timeout/5xx exhausted the whole fallback chain.
    #[error("all providers exhausted, last error: {0}")]
    ProviderChainExhausted(String),

    /// A task was cancelled; the partial transcript was persisted.
    #[error("task cancelled")]
    Cancelled,

    /// Store I/O, encode/decode failures: fatal for the task.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code for this error, per spec §6's table.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::User(_) | GatewayError::UnknownProvider(_) => 400,
            GatewayError::UnknownSession(_) => 404,
            GatewayError::SessionBusy(_) => 409,
            GatewayError::ProviderChainExhausted(_)
            | GatewayError::Cancelled
            | GatewayError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(format!("io error: {e}"))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("encode/decode error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(GatewayError::User("bad".into()).status_code(), 400);
        assert_eq!(GatewayError::UnknownProvider("x".into()).status_code(), 400);
        assert_eq!(GatewayError::UnknownSession("s1".into()).status_code(), 404);
        assert_eq!(GatewayError::SessionBusy("s1".into()).status_code(), 409);
        assert_eq!(GatewayError::Internal("oops".into()).status_code(), 500);
        assert_eq!(GatewayError::Cancelled.status_code(), 500);
    }

    #[test]
    fn display_messages_are_human_readable() {
        assert_eq!(
            GatewayError::UnknownSession("abc".into()).to_string(),
            "unknown session: abc"
        );
        assert_eq!(GatewayError::SessionBusy("s1".into()).to_string(), "session s1 is busy");
    }

    #[test]
    fn from_io_error_wraps_as_internal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Internal(_)));
    }
}
