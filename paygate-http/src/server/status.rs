//! How a request got past the gate, as seen by the handler.

use axum_core::extract::FromRequestParts;
use http::request::Parts;
use paygate::gate::PaymentGrant;
use paygate::proto::SettlementReceipt;
use std::convert::Infallible;

/// Payment state of the current request.
///
/// Inserted as a request extension by [`PaymentGateLayer`](super::PaymentGateLayer)
/// and available as an axum extractor. Requests that never went through the
/// gate read as [`PaymentStatus::Unprotected`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaymentStatus {
    /// The route is free.
    #[default]
    Unprotected,
    /// The request was paid for and the payment settled.
    Paid(PaymentGrant),
}

impl PaymentStatus {
    /// Returns `true` if a settled payment admitted the request.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Paid(_))
    }

    /// The settlement receipt, if paid.
    #[must_use]
    pub const fn receipt(&self) -> Option<&SettlementReceipt> {
        match self {
            Self::Paid(grant) => Some(&grant.receipt),
            Self::Unprotected => None,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PaymentStatus {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}
