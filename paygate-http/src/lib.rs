#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the paygate x402 payment gate.
//!
//! Provides the x402 header names, the base64 header codec, and (feature
//! `server`) a `reqwest` facilitator client plus a tower layer that runs a
//! [`paygate::PaymentGate`] in front of axum handlers.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names
//! - [`headers`] - Base64 encoding/decoding of `X-PAYMENT` and `X-PAYMENT-RESPONSE`
//! - [`error`] - HTTP transport error types
//! - [`facilitator`] - HTTP facilitator client (feature: `server`)
//! - [`server`] - Tower middleware and handler extractor (feature: `server`)

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "server")]
pub mod facilitator;
#[cfg(feature = "server")]
pub mod server;

pub use error::HttpError;
pub use headers::ReceiptEncoder;
