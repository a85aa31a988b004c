//! Base64-wrapped JSON, the encoding of every x402 header value.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Failure to decode a base64 JSON header value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid standard base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Valid base64 but not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes `value` to JSON and base64-encodes it.
///
/// # Errors
///
/// Returns the serializer error if `value` cannot be represented as JSON.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

/// Decodes a base64 header value and deserializes the JSON inside it.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`DecodeError`] on bad base64 or on JSON that does not match `T`.
pub fn decode_json<T: DeserializeOwned>(value: impl AsRef<[u8]>) -> Result<T, DecodeError> {
    let bytes = b64.decode(value.as_ref().trim_ascii())?;
    Ok(serde_json::from_slice(&bytes)?)
}
