//! Wire types of the x402 version 1 protocol as spoken by the gate.
//!
//! All types serialize to JSON with camelCase field names.
//!
//! # Key Types
//!
//! - [`PaymentPayload`] - Signed authorization sent by the payer in `X-PAYMENT`
//! - [`PaymentRequirements`] - One acceptable way to pay for a resource
//! - [`PaymentRequired`] - The 402 challenge body
//! - [`SettlementReceipt`] - Proof of settlement sent back in `X-PAYMENT-RESPONSE`
//! - [`ErrorReason`] - Machine-readable denial reason codes
//!
//! Messages exchanged with a facilitator live in [`facilitator`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::amount::TokenAmount;
use crate::networks::Network;
use crate::timestamp::UnixTimestamp;

pub mod encoding;
pub mod facilitator;

/// Version marker that serializes as `1` and rejects anything else.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct X402Version1;

impl X402Version1 {
    /// Numeric protocol version.
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = u8::deserialize(deserializer)?;
        if version == Self::VALUE {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported x402Version {version}"
            )))
        }
    }
}

/// Payment scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Pay exactly the advertised amount.
    #[default]
    Exact,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
        }
    }
}

/// A signed, time-bounded payment authorization.
///
/// The gate reads the structural fields (`network`, `payer`, `nonce` and the
/// validity window); `signed_blob` is opaque and only the facilitator can
/// interpret it.
///
/// `x402Version` and `scheme` may be omitted on the wire; they default to
/// version 1 and `exact`. A version other than 1 is still rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    #[serde(default)]
    pub x402_version: X402Version1,
    /// Payment scheme.
    #[serde(default)]
    pub scheme: Scheme,
    /// Network the authorization is valid on.
    pub network: Network,
    /// Address of the paying account.
    pub payer: String,
    /// Token that makes this authorization unique for the payer.
    pub nonce: String,
    /// Earliest time the authorization may be redeemed.
    pub valid_after: UnixTimestamp,
    /// Latest time the authorization may be redeemed.
    pub valid_before: UnixTimestamp,
    /// Signature material, interpreted by the facilitator only.
    pub signed_blob: String,
}

/// One acceptable way of paying for a resource, as advertised in a challenge
/// and forwarded to the facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme.
    pub scheme: Scheme,
    /// Settlement network.
    pub network: Network,
    /// Amount in the asset's smallest unit.
    pub max_amount_required: TokenAmount,
    /// Fully qualified URL of the resource being paid for.
    pub resource: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// MIME type of the resource.
    pub mime_type: String,
    /// Recipient address.
    pub pay_to: String,
    /// Upper bound for verify and settle, in seconds.
    pub max_timeout_seconds: u64,
    /// Token contract or mint address.
    pub asset: String,
}

/// Machine-readable reason attached to every denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// No payment was presented for a protected resource.
    PaymentRequired,
    /// The `X-PAYMENT` header failed structural checks.
    MalformedPayment,
    /// The authorization was already reserved or redeemed.
    ReplayedPayment,
    /// The facilitator rejected the authorization.
    PaymentVerificationFailed,
    /// The facilitator verified the authorization but could not settle it.
    SettlementFailed,
    /// The facilitator could not be reached in time.
    FacilitatorUnavailable,
    /// Unexpected fault inside the gate.
    InternalError,
}

impl ErrorReason {
    /// Snake-case wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentRequired => "payment_required",
            Self::MalformedPayment => "malformed_payment",
            Self::ReplayedPayment => "replayed_payment",
            Self::PaymentVerificationFailed => "payment_verification_failed",
            Self::SettlementFailed => "settlement_failed",
            Self::FacilitatorUnavailable => "facilitator_unavailable",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a 402 (or facilitator-failure) response.
///
/// `accepts` is always an array so that clients which understand
/// multi-option challenges keep working, even though the gate puts exactly
/// one requirement in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Human-readable description of why payment is required.
    pub error: String,
    /// Machine-readable reason.
    pub reason: ErrorReason,
    /// Acceptable payment options.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirements>,
}

/// Proof that a payment was settled, returned in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    /// Always `true` for receipts the gate emits.
    pub success: bool,
    /// Network the payment settled on.
    pub network: Network,
    /// Paying address, as reported by the facilitator.
    pub payer: String,
    /// Facilitator-defined transaction reference.
    pub transaction: String,
    /// When the gate observed the settlement.
    pub settled_at: UnixTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::encoding::{DecodeError, decode_json, encode_json};
    use serde_json::json;

    fn bare_payload() -> serde_json::Value {
        json!({
            "network": "base-sepolia",
            "payer": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "nonce": "0x01",
            "validAfter": "1700000000",
            "validBefore": 1_700_000_600,
            "signedBlob": "0xsig"
        })
    }

    #[test]
    fn payload_without_version_or_scheme_decodes() {
        let header = encode_json(&bare_payload()).unwrap();
        let payload: PaymentPayload = decode_json(header).unwrap();
        assert_eq!(payload.x402_version, X402Version1);
        assert_eq!(payload.scheme, Scheme::Exact);
        assert_eq!(payload.network, Network::BaseSepolia);
        assert_eq!(payload.nonce, "0x01");
        assert_eq!(payload.valid_after, UnixTimestamp::from_secs(1_700_000_000));
        assert_eq!(payload.valid_before, UnixTimestamp::from_secs(1_700_000_600));
    }

    #[test]
    fn explicit_version_must_be_one() {
        let mut value = bare_payload();
        value["x402Version"] = json!(1);
        value["scheme"] = json!("exact");
        let header = encode_json(&value).unwrap();
        assert!(decode_json::<PaymentPayload>(header).is_ok());

        value["x402Version"] = json!(2);
        let header = encode_json(&value).unwrap();
        let err = decode_json::<PaymentPayload>(header).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(err.to_string().contains("unsupported x402Version 2"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let mut value = bare_payload();
        value["scheme"] = json!("upto");
        let header = encode_json(&value).unwrap();
        assert!(decode_json::<PaymentPayload>(header).is_err());
    }
}
