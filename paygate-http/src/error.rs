//! Error types for the HTTP transport layer.

use paygate::proto::encoding::DecodeError;

/// Errors that can occur during HTTP header encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Base64 or JSON decoding failed.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The encoded value is not a legal header value.
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),
}
