//! Encoding and decoding of x402 header values.
//!
//! Both `X-PAYMENT` and `X-PAYMENT-RESPONSE` carry base64-encoded JSON.
//! Servers encode receipts and decode payments; clients do the opposite.

use http::HeaderValue;
use paygate::proto::encoding::{decode_json, encode_json};
use paygate::proto::{PaymentPayload, PaymentRequired, SettlementReceipt};

use crate::error::HttpError;

/// Codec for the `X-PAYMENT-RESPONSE` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiptEncoder;

impl ReceiptEncoder {
    /// Encodes a receipt as a header value.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if serialization fails.
    pub fn encode(receipt: &SettlementReceipt) -> Result<HeaderValue, HttpError> {
        let encoded = encode_json(receipt)?;
        Ok(HeaderValue::from_str(&encoded)?)
    }

    /// Decodes a header value back into a receipt.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Decode`] on bad base64 or JSON.
    pub fn decode(value: impl AsRef<[u8]>) -> Result<SettlementReceipt, HttpError> {
        Ok(decode_json(value)?)
    }
}

/// Encodes a payment authorization for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, HttpError> {
    Ok(encode_json(payload)?)
}

/// Decodes an `X-PAYMENT` header value.
///
/// # Errors
///
/// Returns [`HttpError::Decode`] on bad base64 or JSON.
pub fn decode_payment(value: impl AsRef<[u8]>) -> Result<PaymentPayload, HttpError> {
    Ok(decode_json(value)?)
}

/// Parses the JSON body of a 402 response.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if the body is not a challenge.
pub fn decode_challenge(body: &[u8]) -> Result<PaymentRequired, HttpError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate::Network;
    use paygate::timestamp::UnixTimestamp;

    #[test]
    fn receipt_header_is_base64_json() {
        let receipt = SettlementReceipt {
            success: true,
            network: Network::Base,
            payer: "0x209693bc6afc0c5328ba36faf03c514ef312287c".into(),
            transaction: "0xdeadbeef".into(),
            settled_at: UnixTimestamp::from_secs(1_700_000_000),
        };
        let header = ReceiptEncoder::encode(&receipt).unwrap();
        assert!(header.to_str().unwrap().bytes().all(|b| b.is_ascii_graphic()));
        assert_eq!(ReceiptEncoder::decode(header.as_bytes()).unwrap(), receipt);

        let json: serde_json::Value =
            serde_json::from_slice(&base64_decode(header.to_str().unwrap())).unwrap();
        assert_eq!(json["transaction"], "0xdeadbeef");
        assert_eq!(json["network"], "base");
        assert_eq!(json["settledAt"], "1700000000");
    }

    #[test]
    fn garbage_receipt_is_a_decode_error() {
        assert!(matches!(
            ReceiptEncoder::decode("%%%"),
            Err(HttpError::Decode(_))
        ));
    }

    fn base64_decode(value: &str) -> Vec<u8> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(value)
            .unwrap()
    }
}
