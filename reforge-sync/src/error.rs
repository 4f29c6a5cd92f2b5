use reforge_core::{EnvelopeError, ErrorClass};
use thiserror::Error;

/// Runtime error surfaced by the transport and checkpoint/stream components.
///
/// `Unauthorized` is the only variant callers act on directly (it releases the ready
/// latch and stops further sync attempts); every other variant is logged and
/// recovered internally per the crate's error-handling policy.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unauthorized (401/403)")]
    Unauthorized,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal client error: {0}")]
    FatalClient(String),

    #[error("malformed payload: {0}")]
    Envelope(#[from] EnvelopeError),
}

impl SyncError {
    pub fn classify(status: reqwest::StatusCode) -> ErrorClass {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            ErrorClass::Unauthorized
        } else if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            ErrorClass::Transient
        } else if status.is_client_error() {
            ErrorClass::FatalClient
        } else {
            ErrorClass::Transient
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_401_and_403_as_unauthorized() {
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::UNAUTHORIZED),
            ErrorClass::Unauthorized
        );
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::FORBIDDEN),
            ErrorClass::Unauthorized
        );
    }

    #[test]
    fn classifies_5xx_408_429_as_transient() {
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            ErrorClass::Transient
        );
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::REQUEST_TIMEOUT),
            ErrorClass::Transient
        );
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ErrorClass::Transient
        );
    }

    #[test]
    fn classifies_other_4xx_as_fatal_client() {
        assert_eq!(
            SyncError::classify(reqwest::StatusCode::NOT_FOUND),
            ErrorClass::FatalClient
        );
    }
}
