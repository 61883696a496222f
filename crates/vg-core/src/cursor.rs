//! # Cursor — Live Tail Position
//!
//! An opaque token naming the last record a live caller has seen. The
//! engine only ever reads records *strictly after* the cursor, and a
//! cursor can only move forward.
//!
//! The caller owns the cursor. The engine never persists it: a poll hands
//! one in, the response hands the next one back.
//!
//! Wire format: `"0"` for the origin, otherwise `"<micros>-<seq>"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::OrderingKey;

/// Position in the append-only stream, exclusive.
///
/// # Invariant
///
/// [`Cursor::advance`] never returns a cursor that compares lower than
/// `self`. This is what guarantees a monotonically polling caller never
/// sees the same record twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(OrderingKey);

impl Cursor {
    /// The cursor a caller starts with. Everything in the store is after it.
    #[inline]
    pub const fn origin() -> Self {
        Self(OrderingKey::ORIGIN)
    }

    #[inline]
    pub const fn at(key: OrderingKey) -> Self {
        Self(key)
    }

    #[inline]
    pub fn key(&self) -> OrderingKey {
        self.0
    }

    #[inline]
    pub fn is_origin(&self) -> bool {
        self.0 == OrderingKey::ORIGIN
    }

    /// Move to the key of the last delivered record.
    ///
    /// With nothing delivered, or a key that is not ahead of the cursor,
    /// the cursor stays where it is.
    #[inline]
    pub fn advance(self, last_delivered: Option<OrderingKey>) -> Self {
        match last_delivered {
            Some(key) if key > self.0 => Self(key),
            _ => self,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_origin() {
            write!(f, "0")
        } else {
            write!(f, "{}-{}", self.0.micros, self.0.seq)
        }
    }
}

/// A cursor token that does not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorParseError(pub String);

impl fmt::Display for CursorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed cursor '{}'", self.0)
    }
}

impl std::error::Error for CursorParseError {}

impl FromStr for Cursor {
    type Err = CursorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() || token == "0" {
            return Ok(Self::origin());
        }

        let err = || CursorParseError(token.to_string());
        let (micros, seq) = token.split_once('-').ok_or_else(err)?;
        if micros.starts_with('+') || seq.starts_with('+') {
            return Err(err());
        }
        let micros: i64 = micros.parse().map_err(|_| err())?;
        let seq: u64 = seq.parse().map_err(|_| err())?;
        if micros < 0 {
            return Err(err());
        }
        Ok(Self(OrderingKey::new(micros, seq)))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Kani Proofs: Cursor Monotonicity
// =============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    fn any_key() -> OrderingKey {
        OrderingKey::new(kani::any(), kani::any())
    }

    /// **Proof: a cursor never regresses**
    ///
    /// Whatever key the tailer reports as last delivered, the advanced
    /// cursor is never behind the one the caller submitted.
    #[kani::proof]
    fn verify_advance_never_regresses() {
        let cursor = Cursor::at(any_key());
        let last: Option<OrderingKey> = if kani::any() { Some(any_key()) } else { None };

        let next = cursor.advance(last);
        assert!(next >= cursor, "INVARIANT VIOLATED: cursor moved backwards");
    }

    /// **Proof: advancing twice with the same key is idempotent**
    #[kani::proof]
    fn verify_advance_idempotent() {
        let cursor = Cursor::at(any_key());
        let key = any_key();

        let once = cursor.advance(Some(key));
        let twice = once.advance(Some(key));
        assert!(once == twice);
    }

    /// **Proof: sorted keys have non-decreasing ingestion time**
    #[kani::proof]
    fn verify_sorted_keys_monotone() {
        let mut keys = [any_key(), any_key(), any_key()];
        keys.sort();
        for i in 0..keys.len() - 1 {
            assert!(keys[i].micros <= keys[i + 1].micros);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_round_trips_as_zero() {
        assert_eq!(Cursor::origin().to_string(), "0");
        assert_eq!("0".parse::<Cursor>().unwrap(), Cursor::origin());
        assert_eq!("".parse::<Cursor>().unwrap(), Cursor::origin());
    }

    #[test]
    fn test_token_format() {
        let c = Cursor::at(OrderingKey::new(1_700_000_000_000_000, 42));
        assert_eq!(c.to_string(), "1700000000000000-42");
        assert_eq!("1700000000000000-42".parse::<Cursor>().unwrap(), c);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for bad in ["abc", "12", "-5-1", "1-x", "1-2-3", "+1-2"] {
            assert!(bad.parse::<Cursor>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_advance_moves_forward_only() {
        let c = Cursor::at(OrderingKey::new(10, 3));
        assert_eq!(c.advance(None), c);
        assert_eq!(c.advance(Some(OrderingKey::new(9, 100))), c);
        assert_eq!(c.advance(Some(OrderingKey::new(10, 3))), c);
        let ahead = OrderingKey::new(10, 4);
        assert_eq!(c.advance(Some(ahead)).key(), ahead);
    }

    #[test]
    fn test_serde_as_string() {
        let c = Cursor::at(OrderingKey::new(5, 6));
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"5-6\"");
        let back: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
