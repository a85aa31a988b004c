//! The seam between the gate and a remote facilitator.
//!
//! The gate only ever talks to a facilitator through [`Facilitator`]. The HTTP
//! implementation lives in `paygate-http`; tests plug in in-process fakes.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::proto::facilitator::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Verifies and settles payment authorizations.
///
/// An explicit negative answer (`isValid: false`, `success: false`) is a
/// successful call; `Err` is reserved for failing to get an answer at all.
/// Implementations must not retry: settlement is not idempotent.
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// Checks an authorization against a requirement without moving funds.
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError>;

    /// Executes a verified authorization.
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError>;
}

#[async_trait]
impl<T: Facilitator + ?Sized> Facilitator for Arc<T> {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorError> {
        (**self).verify(request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorError> {
        (**self).settle(request).await
    }
}

/// Failure to obtain an answer from a facilitator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacilitatorError {
    /// Connection, TLS or request-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// No answer within the deadline.
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        /// `"verify"` or `"settle"`.
        operation: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },
    /// Non-success HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The answer could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl FacilitatorError {
    /// Returns `true` for [`FacilitatorError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Which facilitator call a log line or error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `POST /verify`.
    Verify,
    /// `POST /settle`.
    Settle,
}

impl Operation {
    /// Lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Settle => "settle",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
