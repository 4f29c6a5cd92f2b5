//! Encode/decode the binary envelope used both for checkpoint responses and each
//! `data:` line of the SSE stream: base64 text wrapping a JSON-encoded [`Configs`].

use crate::error::EnvelopeError;
use crate::model::Configs;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Decodes a raw envelope payload. An empty `bytes` is always [`EnvelopeError::ZeroByte`]
/// — callers treat this the same as a connection failure, never as "no configs".
pub fn decode_envelope(bytes: &[u8]) -> Result<Configs, EnvelopeError> {
    if bytes.is_empty() {
        return Err(EnvelopeError::ZeroByte);
    }
    let decoded = BASE64
        .decode(bytes)
        .map_err(EnvelopeError::Base64)?;
    let configs: Configs = serde_json::from_slice(&decoded).map_err(EnvelopeError::Json)?;
    Ok(configs)
}

pub fn encode_envelope(configs: &Configs) -> Result<Vec<u8>, EnvelopeError> {
    let json = serde_json::to_vec(configs).map_err(EnvelopeError::Json)?;
    Ok(BASE64.encode(json).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionalValue, ConfigEntry, ConfigRow, ConfigType, ConfigValue};

    fn sample() -> Configs {
        Configs::new(vec![ConfigEntry {
            id: 1,
            key: "k".to_string(),
            rows: vec![ConfigRow {
                project_env_id: None,
                values: vec![ConditionalValue {
                    criteria: vec![],
                    value: ConfigValue::Int(1),
                }],
            }],
            config_type: ConfigType::Config,
        }])
    }

    #[test]
    fn round_trips() {
        let configs = sample();
        let encoded = encode_envelope(&configs).unwrap();
        let decoded = decode_envelope(&encoded).unwrap();
        assert_eq!(configs, decoded);
    }

    #[test]
    fn zero_byte_is_zero_byte_error() {
        assert!(matches!(decode_envelope(&[]), Err(EnvelopeError::ZeroByte)));
    }

    #[test]
    fn bad_base64_is_decode_error() {
        assert!(decode_envelope(b"not base64!!!").is_err());
    }
}
