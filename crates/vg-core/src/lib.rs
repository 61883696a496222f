//! # vg-core — The "Vocabulary" of VIGIL
//!
//! Defines what the query engine talks about: the two telemetry entity
//! types (IDS alerts and connection logs), the total ordering key assigned
//! at ingestion, the opaque tail cursor, and the static Field Registry that
//! governs which record attributes may be filtered on.
//!
//! The [`OrderingKey`] is the backbone of the system: every stored record
//! gets exactly one, keys are strictly increasing in ingestion order, and
//! both historical windows and live cursors are expressed in terms of it.

pub mod cursor;
pub mod fields;
pub mod record;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cursor::{Cursor, CursorParseError};
pub use fields::{describe, fields, FieldDescriptor, FieldKind, Operator};
pub use record::{AlertRecord, Endpoint, FieldValue, LogRecord, Queryable};

// =============================================================================
// Entity Types
// =============================================================================

/// The kinds of telemetry the engine can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// IDS alerts pushed by sensors.
    Alert,
    /// Network connection logs (Zeek `conn.log` shape).
    Log,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::Log => write!(f, "log"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alert" | "alerts" => Ok(Self::Alert),
            "log" | "logs" => Ok(Self::Log),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

// =============================================================================
// The Ordering Key: (ingestion micros, sequence)
// =============================================================================

/// Position of a record in the append-only stream.
///
/// Records are ordered by `(micros, seq)`. `micros` is the ingestion
/// timestamp in microseconds since the Unix epoch; `seq` is a store-wide
/// counter that breaks ties between records ingested in the same microsecond.
/// The store assigns both under its write lock, so keys are published in
/// strictly increasing order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderingKey {
    pub micros: i64,
    pub seq: u64,
}

impl OrderingKey {
    /// The smallest key. Every assigned key compares greater.
    pub const ORIGIN: Self = Self { micros: 0, seq: 0 };

    #[inline]
    pub const fn new(micros: i64, seq: u64) -> Self {
        Self { micros, seq }
    }

    /// Lowest key that can carry the given ingestion instant.
    #[inline]
    pub fn floor_of(at: DateTime<Utc>) -> Self {
        Self::new(at.timestamp_micros(), 0)
    }

    /// Highest key that can carry the given ingestion instant.
    #[inline]
    pub fn ceil_of(at: DateTime<Utc>) -> Self {
        Self::new(at.timestamp_micros(), u64::MAX)
    }
}

impl Ord for OrderingKey {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        (self.micros, self.seq).cmp(&(other.micros, other.seq))
    }
}

impl PartialOrd for OrderingKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderingKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderingKey {}

// =============================================================================
// Stored Records
// =============================================================================

/// A record as it exists in the store: immutable identity plus its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stored<R> {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: u64,
    pub ingested_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: R,
}

impl<R> Stored<R> {
    #[inline]
    pub fn key(&self) -> OrderingKey {
        OrderingKey::new(self.ingested_at.timestamp_micros(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ordering_by_micros_first() {
        let a = OrderingKey::new(1, 99);
        let b = OrderingKey::new(2, 0);
        assert!(a < b);
    }

    #[test]
    fn test_ordering_by_seq_second() {
        let a = OrderingKey::new(5, 1);
        let b = OrderingKey::new(5, 2);
        assert!(a < b);
        assert_eq!(OrderingKey::new(5, 2), b);
    }

    #[test]
    fn test_floor_and_ceil_bracket_an_instant() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let inside = OrderingKey::new(at.timestamp_micros(), 42);
        assert!(OrderingKey::floor_of(at) <= inside);
        assert!(inside <= OrderingKey::ceil_of(at));
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("alert".parse::<EntityKind>().unwrap(), EntityKind::Alert);
        assert_eq!("Logs".parse::<EntityKind>().unwrap(), EntityKind::Log);
        assert!("flows".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_stored_key_uses_ingestion_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        let stored = Stored {
            id: "x".into(),
            seq: 7,
            ingested_at: at,
            record: (),
        };
        assert_eq!(stored.key(), OrderingKey::new(1_704_067_201_000_000, 7));
    }
}
