//! Messages exchanged with a facilitator's `/verify` and `/settle` endpoints.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{PaymentPayload, PaymentRequirements, X402Version1};

/// Body of both `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The authorization presented by the payer.
    pub payment_payload: PaymentPayload,
    /// The requirement it is being checked against.
    pub payment_requirements: PaymentRequirements,
}

/// Settlement requests carry exactly the same body as verification.
pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    /// Pairs a payload with the requirement it must satisfy.
    #[must_use]
    pub const fn new(
        payment_payload: PaymentPayload,
        payment_requirements: PaymentRequirements,
    ) -> Self {
        Self {
            x402_version: X402Version1,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Outcome of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// Signature, amount, asset and network all check out.
    Valid {
        /// Address of the payer.
        payer: String,
    },
    /// Well-formed but not acceptable.
    Invalid {
        /// Machine-readable reason from the facilitator.
        reason: String,
        /// Optional human-readable detail.
        message: Option<String>,
        /// Payer address, when the facilitator could recover it.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Successful verification.
    #[must_use]
    pub const fn valid(payer: String) -> Self {
        Self::Valid { payer }
    }

    /// Failed verification.
    #[must_use]
    pub const fn invalid(reason: String, message: Option<String>) -> Self {
        Self::Invalid {
            reason,
            message,
            payer: None,
        }
    }

    /// Returns `true` for [`VerifyResponse::Valid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_message: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
                invalid_message: None,
            },
            Self::Invalid {
                reason,
                message,
                payer,
            } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
                invalid_message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            Ok(Self::Invalid {
                reason: wire
                    .invalid_reason
                    .unwrap_or_else(|| "unspecified".to_owned()),
                message: wire.invalid_message,
                payer: wire.payer,
            })
        }
    }
}

/// Outcome of `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// Value was transferred.
    Success {
        /// Address that paid.
        payer: String,
        /// Facilitator-defined transaction reference.
        transaction: String,
    },
    /// The facilitator answered but did not settle.
    Failure {
        /// Machine-readable reason from the facilitator.
        reason: String,
        /// Optional human-readable detail.
        message: Option<String>,
    },
}

impl SettleResponse {
    /// Returns `true` for [`SettleResponse::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<String>,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success { payer, transaction } => SettleResponseWire {
                success: true,
                error_reason: None,
                error_message: None,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: None,
            },
            Self::Failure { reason, message } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                error_message: message.clone(),
                payer: None,
                transaction: None,
                network: None,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success { payer, transaction })
        } else {
            Ok(Self::Failure {
                reason: wire.error_reason.unwrap_or_else(|| "unspecified".to_owned()),
                message: wire.error_message,
            })
        }
    }
}

/// One `(version, scheme, network)` combination a facilitator can handle.
///
/// Network names are kept as strings: facilitators routinely advertise
/// networks this gate does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version.
    pub x402_version: u8,
    /// Scheme name.
    pub scheme: String,
    /// Network name.
    pub network: String,
}

/// Body of `GET /supported`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    /// Supported payment kinds.
    #[serde(default)]
    pub kinds: Vec<SupportedKind>,
}

impl SupportedResponse {
    /// Whether the facilitator advertises x402 v1 `scheme` on `network`.
    #[must_use]
    pub fn supports(&self, scheme: &str, network: &str) -> bool {
        self.kinds.iter().any(|kind| {
            kind.x402_version == X402Version1::VALUE
                && kind.scheme == scheme
                && kind.network == network
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_requires_payer_when_valid() {
        let ok: VerifyResponse = serde_json::from_str(r#"{"isValid":true,"payer":"0xab"}"#).unwrap();
        assert_eq!(ok, VerifyResponse::valid("0xab".into()));
        assert!(serde_json::from_str::<VerifyResponse>(r#"{"isValid":true}"#).is_err());
    }

    #[test]
    fn verify_response_keeps_facilitator_reason() {
        let bad: VerifyResponse = serde_json::from_str(
            r#"{"isValid":false,"invalidReason":"invalid_signature","invalidMessage":"bad sig"}"#,
        )
        .unwrap();
        assert_eq!(
            bad,
            VerifyResponse::invalid("invalid_signature".into(), Some("bad sig".into()))
        );
    }

    #[test]
    fn settle_response_tolerates_extra_fields() {
        let ok: SettleResponse = serde_json::from_str(
            r#"{"success":true,"payer":"0xab","transaction":"0xdead","network":"base-sepolia","extra":1}"#,
        )
        .unwrap();
        assert!(ok.is_success());

        let failed: SettleResponse =
            serde_json::from_str(r#"{"success":false,"errorReason":"insufficient_funds"}"#).unwrap();
        assert_eq!(
            failed,
            SettleResponse::Failure {
                reason: "insufficient_funds".into(),
                message: None
            }
        );
    }

    #[test]
    fn supported_filters_by_version() {
        let supported: SupportedResponse = serde_json::from_str(
            r#"{"kinds":[{"x402Version":2,"scheme":"exact","network":"base"},{"x402Version":1,"scheme":"exact","network":"base-sepolia"}]}"#,
        )
        .unwrap();
        assert!(supported.supports("exact", "base-sepolia"));
        assert!(!supported.supports("exact", "base"));
    }
}
