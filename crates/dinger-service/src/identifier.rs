//! Dinger identifier codec.
//!
//! Converts between the store's numeric dinger id and the external form used
//! in URLs: hexadecimal digits only, no sign, no `0x` prefix. Values are
//! restricted to the non-negative 63-bit range.

use crate::errors::DingerError;
use serde::{Serialize, Serializer};
use std::fmt;

/// Internal numeric identifier of a dinger.
///
/// Always non-negative. Serializes as its external hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DingerId(i64);

impl DingerId {
    /// Wrap a raw store id. Negative values are not valid identifiers.
    pub fn new(raw: i64) -> Option<Self> {
        (raw >= 0).then_some(Self(raw))
    }

    /// The raw store value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DingerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(*self))
    }
}

impl Serialize for DingerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(*self))
    }
}

/// Encode a dinger id into its external (lowercase hex) form.
pub fn encode(id: DingerId) -> String {
    format!("{:x}", id.0)
}

/// Decode an external dinger id.
///
/// The character-class check runs before numeric parsing: `from_str_radix`
/// accepts a leading `+`, which is not a valid external id.
pub fn decode(external: &str) -> Result<DingerId, DingerError> {
    if external.is_empty() || !external.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DingerError::InvalidIdentifier(external.to_string()));
    }

    i64::from_str_radix(external, 16)
        .ok()
        .and_then(DingerId::new)
        .ok_or_else(|| DingerError::InvalidIdentifier(external.to_string()))
}
