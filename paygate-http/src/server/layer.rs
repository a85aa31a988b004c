//! The tower [`Layer`] and [`Service`] wrapping handlers with the gate.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use http::HeaderValue;
use http::header::HOST;
use paygate::challenge::resource_url;
use paygate::gate::{GateOutcome, PaymentGate};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Instrument;

use super::response::{denial_response, internal_error_response};
use super::status::PaymentStatus;
use crate::constants::{ACCESS_CONTROL_EXPOSE_HEADERS, X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use crate::headers::ReceiptEncoder;

/// Layer that enforces payment on every route of the gate's registry.
///
/// Create one per application and apply it to the whole router; routes the
/// registry does not know pass through.
#[derive(Clone, Debug)]
pub struct PaymentGateLayer {
    gate: PaymentGate,
    base_url: Option<Arc<Url>>,
}

impl PaymentGateLayer {
    /// Wraps `gate`.
    #[must_use]
    pub const fn new(gate: PaymentGate) -> Self {
        Self {
            gate,
            base_url: None,
        }
    }

    /// Sets the public base URL used to build `resource` URLs in challenges.
    ///
    /// If not set, the request's `Host` header is used over plain `http`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(Arc::new(base_url));
        self
    }

    /// The wrapped gate.
    #[must_use]
    pub const fn gate(&self) -> &PaymentGate {
        &self.gate
    }
}

impl<S> Layer<S> for PaymentGateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaymentGateService;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            gate: self.gate.clone(),
            base_url: self.base_url.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service that runs each request through the gate before the wrapped handler.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PaymentGateService {
    /// The payment gate
    gate: PaymentGate,
    /// Base URL for constructing resource URLs
    base_url: Option<Arc<Url>>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for PaymentGateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = self.gate.clone();
        let base_url = self.base_url.clone();
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let fut = handle(gate, base_url, inner, req);
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!("paygate.request"));
        Box::pin(fut)
    }
}

async fn handle(
    gate: PaymentGate,
    base_url: Option<Arc<Url>>,
    mut inner: BoxCloneSyncService<Request, Response, Infallible>,
    mut req: Request,
) -> Result<Response, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);
    let headers = req.headers();
    let payment = headers
        .get(X_PAYMENT_HEADER)
        .map(|value| value.as_bytes().to_vec());
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    // The request body is not `Sync`, so nothing below borrows `req`.
    let outcome = gate
        .process(&method, &path, payment.as_deref(), || {
            resource_url(base_url.as_deref(), host.as_deref(), &path, query.as_deref())
        })
        .await;

    match outcome {
        GateOutcome::PassThrough => inner.call(req).await,
        GateOutcome::Denied(denial) => Ok(denial_response(denial)),
        GateOutcome::Granted(grant) => {
            let receipt = match ReceiptEncoder::encode(&grant.receipt) {
                Ok(receipt) => receipt,
                Err(_err) => {
                    #[cfg(feature = "telemetry")]
                    tracing::error!(error = %_err, "failed to encode settlement receipt");
                    return Ok(internal_error_response());
                }
            };
            req.extensions_mut().insert(PaymentStatus::Paid(grant));
            let mut response = inner.call(req).await?;
            let headers = response.headers_mut();
            headers.insert(X_PAYMENT_RESPONSE_HEADER, receipt);
            headers.append(
                ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
            );
            Ok(response)
        }
    }
}
