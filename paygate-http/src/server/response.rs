//! Rendering gate denials as HTTP responses.

use axum_core::body::Body;
use axum_core::response::Response;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use paygate::gate::Denial;
use paygate::proto::ErrorReason;
use serde_json::json;

/// Turns a [`Denial`] into its response: the challenge as a JSON body under
/// the denial's status, or a generic body for internal errors.
#[must_use]
pub fn denial_response(denial: Denial) -> Response {
    let status = denial.status();
    let (error, challenge) = denial.into_parts();
    let body = match challenge {
        Some(challenge) => serde_json::to_vec(&challenge),
        None => {
            #[cfg(feature = "telemetry")]
            if let paygate::PaymentError::Internal(detail) = &error {
                tracing::error!(%detail, "payment gate internal error");
            }
            serde_json::to_vec(&json!({
                "x402Version": 1,
                "error": error.to_string(),
                "reason": error.reason(),
            }))
        }
    };
    match body {
        Ok(body) => json_response(status, body),
        Err(_) => internal_error_response(),
    }
}

/// A bare `500` with the generic internal error body.
#[must_use]
pub fn internal_error_response() -> Response {
    let body = format!(
        r#"{{"x402Version":1,"error":"internal error","reason":"{}"}}"#,
        ErrorReason::InternalError
    );
    json_response(StatusCode::INTERNAL_SERVER_ERROR, body.into_bytes())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
