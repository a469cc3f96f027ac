use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Token amount in wei (1 dANT = 10^18 wei). u128 covers the initial
/// 5_000_000 dANT supply with room for centuries of emission.
pub type Balance = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── AccountId ────────────────────────────────────────────────────────────────

/// 20-byte account identifier. Users, engines and distributors all share this
/// address space; the all-zero value is the null address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    /// The null address: "no referrer", padding in referral chains.
    pub const NULL: AccountId = AccountId([0u8; 20]);

    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Deterministic address for a human-readable label: the first 20 bytes
    /// of BLAKE3(label). Used for named participants and component addresses.
    pub fn from_label(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&digest.as_bytes()[..20]);
        Self(arr)
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}…)", &self.to_hex()[..10])
    }
}

impl FromStr for AccountId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialized as a hex string so the same value works as a JSON map key and in
// bincode snapshots.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_deterministic_and_distinct() {
        assert_eq!(AccountId::from_label("alice"), AccountId::from_label("alice"));
        assert_ne!(AccountId::from_label("alice"), AccountId::from_label("bob"));
        assert!(!AccountId::from_label("alice").is_null());
        assert!(AccountId::NULL.is_null());
    }

    #[test]
    fn hex_round_trip() {
        let id = AccountId::from_label("carol");
        let parsed: AccountId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(AccountId::from_hex("0x1234").is_err());
    }

    #[test]
    fn serializes_as_json_string() {
        let id = AccountId::from_label("dave");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn bincode_stores_the_hex_form() {
        let id = AccountId::from_label("erin");
        let bytes = bincode::serialize(&id).unwrap();
        // u64 length prefix, then "0x" and 40 hex digits
        assert_eq!(bytes.len(), 8 + 42);
        assert_eq!(&bytes[8..], id.to_hex().as_bytes());
        let back: AccountId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }
}
