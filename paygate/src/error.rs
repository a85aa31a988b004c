//! Error taxonomy of the gate.
//!
//! - [`ConfigurationError`] is fatal and only ever produced while the route
//!   registry and its facilitators are being assembled.
//! - [`PaymentError`] is a per-request denial. Every variant maps to a wire
//!   [`ErrorReason`] and an HTTP status; none is swallowed.
//! - [`MalformedPayment`] details the structural checks that run before any
//!   facilitator is contacted.

use http::StatusCode;

use crate::amount::AmountError;
use crate::facilitator::FacilitatorError;
use crate::networks::{InvalidAddress, Network};
use crate::proto::ErrorReason;
use crate::proto::encoding::DecodeError;
use crate::registry::RouteKey;
use crate::timestamp::UnixTimestamp;

/// Startup-time configuration failure. The process must not start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// A required setting is absent.
    #[error("missing required setting {0}")]
    Missing(&'static str),
    /// A URL setting does not parse.
    #[error("invalid URL for {name}: {source}")]
    InvalidUrl {
        /// Setting name.
        name: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// A payee address is invalid for its network.
    #[error("invalid payTo for {route}: {source}")]
    InvalidPayTo {
        /// Route or setting the address belongs to.
        route: String,
        /// Validation failure.
        #[source]
        source: InvalidAddress,
    },
    /// A price is zero, negative, or not representable.
    #[error("invalid price for {route}: {source}")]
    InvalidPrice {
        /// Route the price belongs to.
        route: String,
        /// Parse or conversion failure.
        #[source]
        source: AmountError,
    },
    /// A scalar setting is out of range or inconsistent with another one.
    #[error("invalid setting {name}: {detail}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// What is wrong with it.
        detail: &'static str,
    },
    /// Any other violated template invariant.
    #[error("invalid payment requirement for {route}: {detail}")]
    InvalidTemplate {
        /// Route the template belongs to.
        route: String,
        /// Which invariant failed.
        detail: &'static str,
    },
    /// A route path does not start with `/`.
    #[error("invalid route path {0:?}")]
    InvalidPath(String),
    /// The route's template charges on a different network than its facilitator.
    #[error("{route} charges on {template} but facilitator {binding} settles on {facilitator}")]
    NetworkMismatch {
        /// The route.
        route: RouteKey,
        /// Network named by the template.
        template: Network,
        /// Facilitator binding name.
        binding: String,
        /// Network of the binding.
        facilitator: Network,
    },
    /// Two facilitator bindings claim the same route.
    #[error("{route} is bound to facilitator {existing} and cannot also bind to {attempted}")]
    RouteConflict {
        /// The contested route.
        route: RouteKey,
        /// Binding that registered it first.
        existing: String,
        /// Binding that tried to register it again.
        attempted: String,
    },
    /// The same binding registered a route twice.
    #[error("{route} is registered twice on facilitator {binding}")]
    DuplicateRoute {
        /// The route.
        route: RouteKey,
        /// The binding.
        binding: String,
    },
    /// Two bindings share a name.
    #[error("facilitator binding {0} is defined twice")]
    DuplicateBinding(String),
    /// A route references a binding that was never added.
    #[error("unknown facilitator binding {0}")]
    UnknownBinding(String),
}

/// Why a payment header failed structural validation.
#[derive(Debug, thiserror::Error)]
pub enum MalformedPayment {
    /// Base64 or JSON decoding failed, or a required field is missing.
    #[error("could not decode X-PAYMENT header: {0}")]
    Decode(#[from] DecodeError),
    /// `validAfter` is later than `validBefore`.
    #[error("validAfter {valid_after} is later than validBefore {valid_before}")]
    InvertedWindow {
        /// Start of the window.
        valid_after: UnixTimestamp,
        /// End of the window.
        valid_before: UnixTimestamp,
    },
    /// The authorization is not valid yet.
    #[error("authorization is not valid until {valid_after} (now {now})")]
    NotYetValid {
        /// Start of the window.
        valid_after: UnixTimestamp,
        /// Current time.
        now: UnixTimestamp,
    },
    /// The authorization has expired.
    #[error("authorization expired at {valid_before} (now {now})")]
    Expired {
        /// End of the window.
        valid_before: UnixTimestamp,
        /// Current time.
        now: UnixTimestamp,
    },
    /// The payload names a different network than the route charges on.
    #[error("payment is for {got} but this resource is paid on {expected}")]
    NetworkMismatch {
        /// Route network.
        expected: Network,
        /// Payload network.
        got: Network,
    },
    /// The payer is not an address of the network's family.
    #[error("invalid payer: {0}")]
    InvalidPayer(#[source] InvalidAddress),
    /// The nonce is empty.
    #[error("nonce must not be empty")]
    EmptyNonce,
}

/// A request-time denial.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// No `X-PAYMENT` header on a protected route.
    #[error("X-PAYMENT header is required")]
    Required,
    /// The header failed structural checks.
    #[error("malformed payment: {0}")]
    Malformed(#[from] MalformedPayment),
    /// The authorization was already used or is being used right now.
    #[error("payment authorization has already been used")]
    Replayed,
    /// The facilitator rejected the authorization.
    #[error("payment verification failed: {}", detail(reason, message.as_deref()))]
    VerificationFailed {
        /// Facilitator reason code.
        reason: String,
        /// Facilitator message.
        message: Option<String>,
    },
    /// The facilitator refused to settle a verified authorization.
    #[error("settlement failed: {}", detail(reason, message.as_deref()))]
    SettlementFailed {
        /// Facilitator reason code.
        reason: String,
        /// Facilitator message.
        message: Option<String>,
    },
    /// The facilitator could not be reached or did not answer in time.
    #[error("facilitator unavailable: {0}")]
    FacilitatorUnavailable(#[source] FacilitatorError),
    /// Unexpected fault inside the gate. The detail is for operators only.
    #[error("internal error")]
    Internal(String),
}

fn detail(reason: &str, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!("{reason} ({message})"),
        _ => reason.to_owned(),
    }
}

impl PaymentError {
    /// Machine-readable reason sent to the client.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Required => ErrorReason::PaymentRequired,
            Self::Malformed(_) => ErrorReason::MalformedPayment,
            Self::Replayed => ErrorReason::ReplayedPayment,
            Self::VerificationFailed { .. } => ErrorReason::PaymentVerificationFailed,
            Self::SettlementFailed { .. } => ErrorReason::SettlementFailed,
            Self::FacilitatorUnavailable(_) => ErrorReason::FacilitatorUnavailable,
            Self::Internal(_) => ErrorReason::InternalError,
        }
    }

    /// HTTP status the denial is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::FacilitatorUnavailable(FacilitatorError::Timeout { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::FacilitatorUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::PAYMENT_REQUIRED,
        }
    }

    /// Whether the response should carry a payment challenge.
    #[must_use]
    pub const fn carries_challenge(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn statuses_follow_the_denial_kind() {
        assert_eq!(PaymentError::Required.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(PaymentError::Replayed.status(), StatusCode::PAYMENT_REQUIRED);
        let timeout = PaymentError::FacilitatorUnavailable(FacilitatorError::Timeout {
            operation: "settle",
            after: Duration::from_secs(5),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        let down = PaymentError::FacilitatorUnavailable(FacilitatorError::Transport(
            "connection refused".into(),
        ));
        assert_eq!(down.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            PaymentError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_stays_out_of_the_message() {
        let err = PaymentError::Internal("receipt serialization failed".into());
        assert_eq!(err.to_string(), "internal error");
        assert!(!err.carries_challenge());
    }

    #[test]
    fn verification_message_includes_facilitator_detail() {
        let err = PaymentError::VerificationFailed {
            reason: "invalid_signature".into(),
            message: Some("signer mismatch".into()),
        };
        assert_eq!(
            err.to_string(),
            "payment verification failed: invalid_signature (signer mismatch)"
        );
        assert_eq!(err.reason(), ErrorReason::PaymentVerificationFailed);
    }
}
