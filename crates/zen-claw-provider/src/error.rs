//! Provider failure classification (spec §4.A Failure classification,
//! §7 transient / fatal-for-provider).

use thiserror::Error;

/// Classified failure from a single provider call.
///
/// The Router (spec §4.B) inspects this to decide whether to advance to
/// the next provider in the chain (retryable, fatal) or disable the
/// provider for the rest of the process lifetime (auth).
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// Network error, timeout, or 5xx — the caller should try the next
    /// provider in the chain.
    #[error("retryable provider error: {0}")]
    Retryable(String),

    /// 4xx on the payload itself (not auth) — fatal for this call, but
    /// the provider may still be usable for a different request shape.
    #[error("fatal provider error: {0}")]
    FatalPayload(String),

    /// 401/403 — fatal and the provider is disabled for the rest of the
    /// process lifetime (spec §4.A).
    #[error("provider authentication error: {0}")]
    FatalAuth(String),

    /// Cooperative cancellation aborted the in-flight call.
    #[error("provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Retryable(_))
    }

    pub fn disables_provider(&self) -> bool {
        matches!(self, ProviderError::FatalAuth(_))
    }

    /// Classify an HTTP status code per spec §4.A.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => ProviderError::FatalAuth(format!("http {status}: {body}")),
            400..=499 => ProviderError::FatalPayload(format!("http {status}: {body}")),
            500..=599 => ProviderError::Retryable(format!("http {status}: {body}")),
            _ => ProviderError::Retryable(format!("http {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ProviderError::Retryable(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), e.to_string())
        } else {
            ProviderError::Retryable(e.to_string())
        }
    }
}

impl From<ProviderError> for zen_claw_core::GatewayError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Cancelled => zen_claw_core::GatewayError::Cancelled,
            other => zen_claw_core::GatewayError::ProviderChainExhausted(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_5xx_as_retryable() {
        assert!(ProviderError::from_status(503, "down").is_retryable());
    }

    #[test]
    fn classifies_401_403_as_fatal_auth() {
        assert!(ProviderError::from_status(401, "no").disables_provider());
        assert!(ProviderError::from_status(403, "no").disables_provider());
    }

    #[test]
    fn classifies_other_4xx_as_fatal_payload() {
        let e = ProviderError::from_status(400, "bad");
        assert!(matches!(e, ProviderError::FatalPayload(_)));
        assert!(!e.is_retryable());
        assert!(!e.disables_provider());
    }
}
