//! The payment gate state machine.
//!
//! A request moves through
//!
//! ```text
//! Unchallenged ──no route──────────────────────────────▶ Granted (pass-through)
//!      │
//!      ├──no X-PAYMENT──▶ Challenged (402)
//!      │
//!      └──X-PAYMENT──▶ structural checks ──fail──▶ Denied (malformed)
//!                             │
//!                         reserve nonce ──taken──▶ Denied (replayed)
//!                             │
//!                         Verifying ──invalid / error──▶ release ▶ Denied
//!                             │
//!                         Settling ──failure / error──▶ release ▶ Denied
//!                             │
//!                         confirm ▶ Granted (receipt)
//! ```
//!
//! Verify and settle run on their own task, so a client that disconnects
//! mid-payment still has its nonce confirmed or released.

use http::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "telemetry")]
use tracing::Instrument;

use crate::challenge::ChallengeBuilder;
use crate::error::{MalformedPayment, PaymentError};
use crate::facilitator::{FacilitatorError, Operation};
use crate::networks::Network;
use crate::nonce::{NonceKey, NonceReservation, NonceStore};
use crate::proto::encoding::decode_json;
use crate::proto::facilitator::{SettleResponse, VerifyRequest, VerifyResponse};
use crate::proto::{
    ErrorReason, PaymentPayload, PaymentRequired, PaymentRequirements, SettlementReceipt,
};
use crate::registry::{ProtectedRoute, RouteKey, RouteRegistry};
use crate::timestamp::UnixTimestamp;

/// Where a request is in the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing has been decided yet.
    Unchallenged,
    /// A 402 challenge is being returned.
    Challenged,
    /// The nonce is reserved and the facilitator is verifying.
    Verifying,
    /// The facilitator is settling.
    Settling,
    /// The handler may run.
    Granted,
    /// The request was refused.
    Denied,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unchallenged => "unchallenged",
            Self::Challenged => "challenged",
            Self::Verifying => "verifying",
            Self::Settling => "settling",
            Self::Granted => "granted",
            Self::Denied => "denied",
        })
    }
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn transition(route: &RouteKey, state: GateState) {
    #[cfg(feature = "telemetry")]
    tracing::debug!(route = %route, state = %state, "payment gate transition");
}

/// A settled payment, handed to the business handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentGrant {
    /// Proof of settlement, echoed in `X-PAYMENT-RESPONSE`.
    pub receipt: SettlementReceipt,
    /// The requirement the payment satisfied.
    pub requirements: PaymentRequirements,
}

/// A refused request, with the challenge to send back.
#[derive(Debug)]
pub struct Denial {
    error: PaymentError,
    challenge: Option<PaymentRequired>,
}

impl Denial {
    fn new(route: &ProtectedRoute, resource_url: &str, error: PaymentError) -> Self {
        let challenge = error
            .carries_challenge()
            .then(|| ChallengeBuilder::for_denial(route.template(), resource_url, &error));
        Self { error, challenge }
    }

    /// Why the request was refused.
    #[must_use]
    pub const fn error(&self) -> &PaymentError {
        &self.error
    }

    /// Machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        self.error.reason()
    }

    /// HTTP status to answer with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.error.status()
    }

    /// The 402 body, absent for internal errors.
    #[must_use]
    pub const fn challenge(&self) -> Option<&PaymentRequired> {
        self.challenge.as_ref()
    }

    /// Splits into error and challenge.
    #[must_use]
    pub fn into_parts(self) -> (PaymentError, Option<PaymentRequired>) {
        (self.error, self.challenge)
    }
}

/// Result of running a request through the gate.
#[derive(Debug)]
pub enum GateOutcome {
    /// The route is free.
    PassThrough,
    /// Payment settled; run the handler.
    Granted(PaymentGrant),
    /// Payment missing or refused.
    Denied(Denial),
}

/// Enforces payment on the routes of a [`RouteRegistry`].
///
/// Cheap to clone; clones share the registry and the nonce store.
#[derive(Clone)]
pub struct PaymentGate {
    registry: Arc<RouteRegistry>,
    nonces: Arc<dyn NonceStore>,
}

impl fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentGate")
            .field("routes", &self.registry.len())
            .field("nonces", &self.nonces.len())
            .finish()
    }
}

impl PaymentGate {
    /// Creates a gate over `registry`, remembering authorizations in `nonces`.
    #[must_use]
    pub fn new(registry: Arc<RouteRegistry>, nonces: Arc<dyn NonceStore>) -> Self {
        Self { registry, nonces }
    }

    /// The protected routes.
    #[must_use]
    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// The nonce store.
    #[must_use]
    pub fn nonces(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Runs one request through the gate.
    ///
    /// `resource_url` is only evaluated when the route is protected.
    pub async fn process(
        &self,
        method: &Method,
        path: &str,
        payment_header: Option<&[u8]>,
        resource_url: impl FnOnce() -> String,
    ) -> GateOutcome {
        let Some(route) = self.registry.lookup(method, path) else {
            return GateOutcome::PassThrough;
        };
        let resource_url = resource_url();
        match self.admit(Arc::clone(&route), &resource_url, payment_header).await {
            Ok(grant) => GateOutcome::Granted(grant),
            Err(error) => GateOutcome::Denied(Denial::new(&route, &resource_url, error)),
        }
    }

    /// Checks, verifies and settles a payment for a protected route.
    ///
    /// # Errors
    ///
    /// Returns the [`PaymentError`] that refused the request.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "paygate.admit", skip_all, fields(route = %route.key()))
    )]
    pub async fn admit(
        &self,
        route: Arc<ProtectedRoute>,
        resource_url: &str,
        payment_header: Option<&[u8]>,
    ) -> Result<PaymentGrant, PaymentError> {
        transition(route.key(), GateState::Unchallenged);
        let Some(header) = payment_header else {
            transition(route.key(), GateState::Challenged);
            return Err(PaymentError::Required);
        };

        let (payload, key) = parse_payment(header, route.template().network, UnixTimestamp::now())
            .inspect_err(|_err| {
                #[cfg(feature = "telemetry")]
                tracing::info!(error = %_err, "rejected malformed payment");
                transition(route.key(), GateState::Denied);
            })?;

        let expires_at = payload.valid_before;
        let Some(reservation) = NonceReservation::acquire(Arc::clone(&self.nonces), key, expires_at)
        else {
            #[cfg(feature = "telemetry")]
            tracing::info!(payer = %payload.payer, nonce = %payload.nonce, "rejected replayed payment");
            transition(route.key(), GateState::Denied);
            return Err(PaymentError::Replayed);
        };

        let requirements = route.template().requirements(resource_url);
        let request = VerifyRequest::new(payload, requirements.clone());
        let task = redeem(Arc::clone(&route), request, reservation);
        #[cfg(feature = "telemetry")]
        let task = task.instrument(tracing::Span::current());

        // Detached so that dropping this future does not strand the nonce.
        let receipt = match tokio::spawn(task).await {
            Ok(result) => result,
            Err(join_error) => Err(PaymentError::Internal(format!(
                "payment task failed: {join_error}"
            ))),
        };
        match receipt {
            Ok(receipt) => {
                transition(route.key(), GateState::Granted);
                Ok(PaymentGrant {
                    receipt,
                    requirements,
                })
            }
            Err(error) => {
                transition(route.key(), GateState::Denied);
                Err(error)
            }
        }
    }
}

/// Decodes `header` and runs every check that needs no network call.
fn parse_payment(
    header: &[u8],
    network: Network,
    now: UnixTimestamp,
) -> Result<(PaymentPayload, NonceKey), MalformedPayment> {
    let payload: PaymentPayload = decode_json(header)?;
    if payload.network != network {
        return Err(MalformedPayment::NetworkMismatch {
            expected: network,
            got: payload.network,
        });
    }
    if payload.nonce.trim().is_empty() {
        return Err(MalformedPayment::EmptyNonce);
    }
    let key = NonceKey::from_payload(&payload).map_err(MalformedPayment::InvalidPayer)?;
    let (valid_after, valid_before) = (payload.valid_after, payload.valid_before);
    if valid_after > valid_before {
        return Err(MalformedPayment::InvertedWindow {
            valid_after,
            valid_before,
        });
    }
    if now < valid_after {
        return Err(MalformedPayment::NotYetValid { valid_after, now });
    }
    if now > valid_before {
        return Err(MalformedPayment::Expired { valid_before, now });
    }
    Ok((payload, key))
}

/// Verifies and settles, then confirms or releases the reservation.
async fn redeem(
    route: Arc<ProtectedRoute>,
    request: VerifyRequest,
    reservation: NonceReservation,
) -> Result<SettlementReceipt, PaymentError> {
    match verify_and_settle(&route, &request).await {
        Ok(receipt) => {
            if !reservation.confirm() {
                #[cfg(feature = "telemetry")]
                tracing::warn!("settled payment whose nonce reservation was already gone");
            }
            Ok(receipt)
        }
        Err(error) => {
            reservation.release();
            Err(error)
        }
    }
}

async fn verify_and_settle(
    route: &ProtectedRoute,
    request: &VerifyRequest,
) -> Result<SettlementReceipt, PaymentError> {
    let facilitator = route.binding().facilitator();
    let deadline = route.template().max_timeout();

    transition(route.key(), GateState::Verifying);
    let verified = with_deadline(Operation::Verify, deadline, facilitator.verify(request)).await?;
    if let VerifyResponse::Invalid {
        reason, message, ..
    } = verified
    {
        #[cfg(feature = "telemetry")]
        tracing::info!(%reason, ?message, "facilitator rejected payment");
        return Err(PaymentError::VerificationFailed { reason, message });
    }

    transition(route.key(), GateState::Settling);
    let settled = with_deadline(Operation::Settle, deadline, facilitator.settle(request)).await?;
    match settled {
        SettleResponse::Success { payer, transaction } => {
            #[cfg(feature = "telemetry")]
            tracing::info!(%payer, %transaction, network = %route.template().network, "payment settled");
            Ok(SettlementReceipt {
                success: true,
                network: route.template().network,
                payer,
                transaction,
                settled_at: UnixTimestamp::now(),
            })
        }
        SettleResponse::Failure { reason, message } => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(%reason, ?message, "facilitator failed to settle verified payment");
            Err(PaymentError::SettlementFailed { reason, message })
        }
    }
}

async fn with_deadline<T>(
    operation: Operation,
    deadline: Duration,
    call: impl Future<Output = Result<T, FacilitatorError>>,
) -> Result<T, PaymentError> {
    let result = match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(FacilitatorError::Timeout {
            operation: operation.as_str(),
            after: deadline,
        }),
    };
    result.map_err(|error| {
        #[cfg(feature = "telemetry")]
        tracing::warn!(%operation, %error, "facilitator unavailable");
        PaymentError::FacilitatorUnavailable(error)
    })
}
