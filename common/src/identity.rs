use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The account invoking a ledger operation.
///
/// Supplied by the execution environment after it has authenticated the
/// command, never asserted by the caller itself. Serialized as lowercase hex
/// so it can key JSON maps.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub VerifyingKey);

impl CallerId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<VerifyingKey> for CallerId {
    fn from(key: VerifyingKey) -> Self {
        CallerId(key)
    }
}

impl PartialEq for CallerId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}
impl Eq for CallerId {}

impl PartialOrd for CallerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for CallerId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}
impl Hash for CallerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_bytes().hash(state);
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for CallerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid caller id: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "caller id must be 32 bytes".to_string())?;
        VerifyingKey::from_bytes(&bytes)
            .map(CallerId)
            .map_err(|e| format!("invalid caller key: {e}"))
    }
}

impl Serialize for CallerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CallerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn caller(seed: u8) -> CallerId {
        CallerId(SigningKey::from_bytes(&[seed; 32]).verifying_key())
    }

    #[test]
    fn ordering_follows_key_bytes() {
        let a = caller(1);
        let b = caller(2);
        assert_eq!(a.cmp(&b), a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(a, caller(1));
    }

    #[test]
    fn display_is_lowercase_hex() {
        let shown = caller(7).to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(shown.parse::<CallerId>().unwrap(), caller(7));
    }

    #[test]
    fn serializes_as_json_string() {
        let json = serde_json::to_string(&caller(3)).unwrap();
        assert_eq!(json, format!("\"{}\"", caller(3)));
        let back: CallerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, caller(3));
    }

    #[test]
    fn rejects_short_hex() {
        assert!("abcd".parse::<CallerId>().is_err());
        assert!("zz".parse::<CallerId>().is_err());
    }
}
