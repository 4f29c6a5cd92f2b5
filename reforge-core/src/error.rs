use thiserror::Error;

/// Errors raised while constructing [`crate::options::Options`].
///
/// All of these are config-time: they surface to the caller of
/// `OptionsBuilder::build` and never occur once the SDK is running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("No SDK key found. You must pass sdk_key or set PREFAB_API_KEY")]
    MissingSdkKey,

    #[error("Invalid SDK key: {0}")]
    InvalidSdkKey(String),

    #[error("Invalid API URL found: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid Stream URL found: {0}")]
    InvalidStreamUrl(String),
}

/// Classification an HTTP/SSE transport uses to decide retry behavior. Kept in
/// `reforge-core` (rather than alongside the transport in `reforge-sync`) so the
/// store and the transport agree on the same vocabulary without `reforge-store`
/// depending on `reqwest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 401/403 — fatal, not retried, releases the ready latch.
    Unauthorized,
    /// Network error, timeout, 5xx, 408, 429, or a zero-byte 200 — retried.
    Transient,
    /// Any other 4xx — fatal, not retried, but does not imply bad credentials.
    FatalClient,
}

/// Raised by a reader when a key has no stored value, no caller-supplied default,
/// and `on_no_default` is set to `"RAISE"` (the default policy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No value found for key '{0}' and no default was provided.")]
    MissingDefault(String),

    #[error("Reforge SDK was not initialized within the timeout, looking up key '{0}'.")]
    ConnectionTimeout(String),
}

/// Failure decoding a stored or received envelope (disk cache corruption, a
/// malformed SSE payload, etc). Always treated as transient by callers: logged and
/// the current attempt is dropped.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("failed to decode envelope: {0}")]
    Decode(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error("zero-byte payload")]
    ZeroByte,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_error_messages() {
        assert_eq!(
            OptionsError::MissingSdkKey.to_string(),
            "No SDK key found. You must pass sdk_key or set PREFAB_API_KEY"
        );
        assert_eq!(
            OptionsError::InvalidSdkKey("bad_sdk_key".into()).to_string(),
            "Invalid SDK key: bad_sdk_key"
        );
        assert_eq!(
            OptionsError::InvalidApiUrl("httttp://x".into()).to_string(),
            "Invalid API URL found: httttp://x"
        );
    }

    #[test]
    fn envelope_error_zero_byte_message() {
        assert_eq!(EnvelopeError::ZeroByte.to_string(), "zero-byte payload");
    }

    #[test]
    fn missing_default_message_matches_reference() {
        assert_eq!(
            ResolutionError::MissingDefault("bad key".into()).to_string(),
            "No value found for key 'bad key' and no default was provided."
        );
    }
}
