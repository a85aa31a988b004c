//! A [`paygate::Facilitator`] that talks to a _remote_ x402 facilitator over HTTP.
//!
//! [`FacilitatorClient`] handles the `/verify`, `/settle` and `/supported`
//! endpoints of a facilitator and implements [`paygate::Facilitator`], so the
//! gate can use it directly.
//!
//! ## Features
//!
//! - Uses `reqwest` for async HTTP requests
//! - Supports optional timeout and headers
//! - Never retries: settlement is not idempotent
//! - Integrates with `tracing` if the `telemetry` feature is enabled
//!
//! ## Error Handling
//!
//! [`FacilitatorClientError`] captures detailed failure contexts:
//! - URL construction
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Unexpected HTTP status responses
//!
//! The gate only sees the coarser [`paygate::FacilitatorError`].

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use paygate::facilitator::{Facilitator, FacilitatorError, Operation};
use paygate::proto::facilitator::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};
use reqwest::Client;
use std::fmt::Display;
use std::time::Duration;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span, instrument};

/// A client for communicating with a remote x402 facilitator.
///
/// Handles `/verify`, `/settle`, and `/supported` endpoints via JSON HTTP.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Full URL to `GET /supported` requests
    supported_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorClientError {
    /// Returns `true` if the request hit its timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http { source, .. } | Self::ResponseBodyRead { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }

    /// Collapses into the gate-facing error for `operation`.
    ///
    /// `timeout` is reported as the elapsed deadline when the request timed out.
    #[must_use]
    pub fn into_facilitator_error(
        self,
        operation: Operation,
        timeout: Option<Duration>,
    ) -> FacilitatorError {
        if self.is_timeout() {
            return FacilitatorError::Timeout {
                operation: operation.as_str(),
                after: timeout.unwrap_or_default(),
            };
        }
        match self {
            Self::HttpStatus { status, body, .. } => FacilitatorError::Status {
                status: status.as_u16(),
                body,
            },
            Self::JsonDeserialization { source, .. } => {
                FacilitatorError::InvalidResponse(source.to_string())
            }
            other => FacilitatorError::Transport(other.to_string()),
        }
    }
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the computed `./supported` URL relative to [`FacilitatorClient::base_url`].
    pub const fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Returns any custom headers configured on the client.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// This sets up `./verify`, `./settle`, and `./supported` endpoint URLs relative to the base.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |endpoint: &str, context: &'static str| {
            base_url
                .join(endpoint)
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        let verify_url = join("./verify", "Failed to construct ./verify URL")?;
        let settle_url = join("./settle", "Failed to construct ./settle URL")?;
        let supported_url = join("./supported", "Failed to construct ./supported URL")?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Sends a `GET /supported` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paygate.facilitator_client.supported", skip_all, err)
    )]
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        let req = self.client.get(self.supported_url.clone());
        self.send_json(req, "GET /supported").await
    }

    /// POSTs `payload` as JSON and decodes the JSON answer.
    ///
    /// `context` is a human-readable identifier used in tracing and error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let req = self.client.post(url.clone()).json(payload);
        self.send_json(req, context).await
    }

    /// Applies headers and timeout, sends, and maps the answer.
    async fn send_json<R>(
        &self,
        mut req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

#[async_trait]
impl Facilitator for FacilitatorClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        let call = Self::verify(self, request);
        #[cfg(feature = "telemetry")]
        let call = call.instrument(tracing::info_span!(
            "paygate.facilitator_client.verify",
            url = %self.verify_url,
            timeout = ?self.timeout
        ));
        call.await
            .map_err(|e| e.into_facilitator_error(Operation::Verify, self.timeout))
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        let call = Self::settle(self, request);
        #[cfg(feature = "telemetry")]
        let call = call.instrument(tracing::info_span!(
            "paygate.facilitator_client.settle",
            url = %self.settle_url,
            timeout = ?self.timeout
        ));
        call.await
            .map_err(|e| e.into_facilitator_error(Operation::Settle, self.timeout))
    }
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Records the outcome of a request on a tracing span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    if let Err(err) = result {
        let span = Span::current();
        span.record("error.message", tracing::field::display(err));
        tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate::networks::Network;
    use paygate::proto::{PaymentPayload, PaymentRequirements, Scheme, X402Version1};
    use paygate::timestamp::UnixTimestamp;
    use paygate::amount::TokenAmount;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYER: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn request() -> VerifyRequest {
        let payload = PaymentPayload {
            x402_version: X402Version1,
            scheme: Scheme::Exact,
            network: Network::BaseSepolia,
            payer: PAYER.into(),
            nonce: "0x01".into(),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(4_000_000_000),
            signed_blob: "0xsig".into(),
        };
        let requirements = PaymentRequirements {
            scheme: Scheme::Exact,
            network: Network::BaseSepolia,
            max_amount_required: TokenAmount::new(1000),
            resource: "https://api.example.com/weather".into(),
            description: String::new(),
            mime_type: "application/json".into(),
            pay_to: "0x1111111111111111111111111111111111111111".into(),
            max_timeout_seconds: 5,
            asset: Network::BaseSepolia.usdc().address.into(),
        };
        VerifyRequest::new(payload, requirements)
    }

    async fn client(server: &MockServer) -> FacilitatorClient {
        FacilitatorClient::try_from(server.uri().as_str()).unwrap()
    }

    #[test]
    fn endpoints_are_relative_to_base() {
        let client = FacilitatorClient::try_from("https://x402.example/facilitator").unwrap();
        assert_eq!(client.verify_url().as_str(), "https://x402.example/facilitator/verify");
        assert_eq!(client.settle_url().as_str(), "https://x402.example/facilitator/settle");
        assert_eq!(
            client.supported_url().as_str(),
            "https://x402.example/facilitator/supported"
        );
    }

    #[tokio::test]
    async fn verify_posts_v1_wire_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "x402Version": 1,
                "paymentPayload": {"network": "base-sepolia", "payer": PAYER, "nonce": "0x01"},
                "paymentRequirements": {"maxAmountRequired": "1000", "maxTimeoutSeconds": 5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isValid": true,
                "payer": PAYER
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        let client = client(&server).await.with_headers(headers);
        let response = Facilitator::verify(&client, &request()).await.unwrap();
        assert_eq!(response, VerifyResponse::valid(PAYER.into()));
    }

    #[tokio::test]
    async fn invalid_verification_is_an_answer_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isValid": false,
                "invalidReason": "insufficient_funds",
                "payer": PAYER
            })))
            .mount(&server)
            .await;

        let response = Facilitator::verify(&client(&server).await, &request())
            .await
            .unwrap();
        assert!(!response.is_valid());
    }

    #[tokio::test]
    async fn settle_maps_transaction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "transaction": "0xdeadbeef",
                "network": "base-sepolia",
                "payer": PAYER
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = Facilitator::settle(&client(&server).await, &request())
            .await
            .unwrap();
        assert_eq!(
            response,
            SettleResponse::Success {
                payer: PAYER.into(),
                transaction: "0xdeadbeef".into()
            }
        );
    }

    #[tokio::test]
    async fn error_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let err = Facilitator::settle(&client(&server).await, &request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FacilitatorError::Status {
                status: 503,
                body: "maintenance".into()
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_an_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = Facilitator::verify(&client(&server).await, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, FacilitatorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn slow_facilitator_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"isValid": true, "payer": PAYER}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client(&server)
            .await
            .with_timeout(Duration::from_millis(100));
        let err = Facilitator::verify(&client, &request()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn supported_lists_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kinds": [{"x402Version": 1, "scheme": "exact", "network": "base-sepolia"}]
            })))
            .mount(&server)
            .await;

        let supported = client(&server).await.supported().await.unwrap();
        assert!(supported.supports("exact", "base-sepolia"));
    }

    #[tokio::test]
    async fn unreachable_facilitator_is_a_transport_error() {
        // Nothing listens on the discard port.
        let client = FacilitatorClient::try_from("http://127.0.0.1:9").unwrap();
        let err = Facilitator::verify(&client, &request()).await.unwrap_err();
        assert!(matches!(err, FacilitatorError::Transport(_)));
    }
}
