#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Transport-agnostic engine for gating resources behind x402 payments.
//!
//! A client asks for a priced resource and gets a `402 Payment Required`
//! challenge describing what to pay, on which network, to whom. It retries
//! with a signed authorization in `X-PAYMENT`; the gate checks it, reserves
//! its nonce, has the route's facilitator verify and settle it, and only then
//! lets the request through with a settlement receipt. Every authorization
//! is redeemed at most once.
//!
//! # Modules
//!
//! - [`amount`] - Money and smallest-unit token amounts
//! - [`challenge`] - 402 challenge construction
//! - [`error`] - Configuration and payment error taxonomy
//! - [`facilitator`] - The trait a remote facilitator is reached through
//! - [`gate`] - The per-request payment state machine
//! - [`networks`] - Known networks and their address rules
//! - [`nonce`] - Replay protection
//! - [`proto`] - x402 v1 wire types and header encoding
//! - [`registry`] - Protected routes and facilitator bindings
//! - [`timestamp`] - Unix timestamps of authorization windows
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod challenge;
pub mod error;
pub mod facilitator;
pub mod gate;
pub mod networks;
pub mod nonce;
pub mod proto;
pub mod registry;
pub mod timestamp;

pub use error::{ConfigurationError, PaymentError};
pub use facilitator::{Facilitator, FacilitatorError};
pub use gate::{Denial, GateOutcome, PaymentGate, PaymentGrant};
pub use networks::Network;
pub use nonce::{InMemoryNonceStore, NonceStore};
pub use registry::{FacilitatorBinding, PaymentRequirementTemplate, RouteRegistry};
