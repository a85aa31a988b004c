//! Error types of the demo server.

use axum::http::StatusCode;
use axum::http::header::InvalidHeaderValue;
use axum::response::{IntoResponse, Response};
use paygate::ConfigurationError;
use paygate_http::facilitator::FacilitatorClientError;

/// Failures that keep the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Settings are missing or inconsistent.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A facilitator client could not be built.
    #[error("facilitator client {name}: {source}")]
    FacilitatorClient {
        /// Binding the client was built for.
        name: &'static str,
        /// Underlying failure.
        #[source]
        source: FacilitatorClientError,
    },
    /// The facilitator API key cannot be sent as a header.
    #[error("FACILITATOR_API_KEY is not a valid header value")]
    ApiKey(#[source] InvalidHeaderValue),
}

/// Errors returned by business handlers.
///
/// These are produced after payment was granted, so they travel back with
/// the settlement receipt attached.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request body is valid JSON but not an acceptable input.
    #[error("{0}")]
    InvalidInput(&'static str),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
