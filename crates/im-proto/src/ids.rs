//! Time-ordered identifiers.
//!
//! Message ids must sort lexically by creation time. UUIDv7 embeds a 48-bit
//! millisecond timestamp in its high bits, so ordering by the textual/byte
//! representation matches insertion order without a separate sequence.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A time-ordered, globally unique message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(Uuid);

impl MsgId {
    /// Generate a new id ordered after every previously generated one on this node.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MsgId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A channel's 64-bit monotonic sequence id.
///
/// Serialized as a JSON string everywhere it crosses the wire, since a
/// bare `u64` risks silent truncation in clients that decode JSON numbers as
/// `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId(pub u64);

impl SeqId {
    pub const ZERO: SeqId = SeqId(0);

    pub fn next(self) -> SeqId {
        SeqId(self.0 + 1)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SeqId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SeqId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(SeqId).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_id_is_monotonic_enough_to_sort() {
        let a = MsgId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = MsgId::generate();
        assert!(a < b);
    }

    #[test]
    fn seq_id_round_trips_as_json_string() {
        let seq = SeqId(42);
        let json = serde_json::to_string(&seq).unwrap();
        assert_eq!(json, "\"42\"");
        let back: SeqId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seq);
    }
}
