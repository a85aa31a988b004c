//! Tower middleware that puts a [`paygate::PaymentGate`] in front of axum handlers.
//!
//! ```ignore
//! let gate = PaymentGate::new(Arc::new(registry), Arc::new(InMemoryNonceStore::new()));
//! let app = Router::new()
//!     .route("/weather", get(weather))
//!     .layer(PaymentGateLayer::new(gate).with_base_url(base_url));
//! ```
//!
//! Unprotected routes pass through untouched. Protected routes without a
//! settled payment are answered by the middleware itself; the handler only
//! runs after settlement, and its response gets an `X-PAYMENT-RESPONSE`
//! receipt. Handlers can ask how they were reached with [`PaymentStatus`].

pub mod layer;
pub mod response;
pub mod status;

pub use layer::{PaymentGateLayer, PaymentGateService};
pub use status::PaymentStatus;
