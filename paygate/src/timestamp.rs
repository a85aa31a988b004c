//! Unix timestamps bounding a payment authorization.
//!
//! A payment payload is only usable inside its `[validAfter, validBefore]`
//! window, and the nonce store keeps a redeemed authorization around until
//! `validBefore` passes. Both ends of the window are [`UnixTimestamp`]s.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, SystemTime};

/// Seconds since the Unix epoch.
///
/// Serialized as a stringified integer (`"1699999999"`) so that `JavaScript`
/// clients never lose precision. Deserialization accepts either that form or
/// a bare JSON integer, since wallets in the wild emit both.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Creates a timestamp from raw seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current wall-clock time.
    ///
    /// A clock set before the epoch reads as `0`, which makes every
    /// authorization look not-yet-valid rather than valid forever.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self(secs)
    }

    /// Returns the raw seconds value.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Adds a duration, saturating at `u64::MAX`.
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_secs()))
    }

    /// Subtracts a duration, saturating at the epoch.
    #[must_use]
    pub const fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_secs()))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct UnixTimestampVisitor;

impl Visitor<'_> for UnixTimestampVisitor {
    type Value = UnixTimestamp;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer timestamp, as a number or a string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(UnixTimestamp(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(UnixTimestamp)
            .map_err(|_| E::custom("timestamp must be a non-negative integer"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.trim()
            .parse::<u64>()
            .map(UnixTimestamp)
            .map_err(|_| E::custom("timestamp must be a non-negative integer"))
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnixTimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_and_number_forms() {
        let from_str: UnixTimestamp = serde_json::from_str("\"1700000000\"").unwrap();
        let from_num: UnixTimestamp = serde_json::from_str("1700000000").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(from_str.as_secs(), 1_700_000_000);
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(serde_json::from_str::<UnixTimestamp>("-5").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"soon\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("1.5").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&UnixTimestamp::from_secs(42)).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
