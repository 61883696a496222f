//! # vg-store — The "Log" of VIGIL
//!
//! The underlying event store the query engine reads from: an ordered,
//! append-only log per entity type with a bounded range scan and a
//! secondary index for equality/range pushdown.
//!
//! The engine treats this crate as a black box behind [`EventStore`].
//! [`MemoryStore`] is the in-process implementation the hub runs on.

pub mod index;
pub mod memory;

use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use vg_core::{OrderingKey, Queryable, Stored};

pub use index::{IndexBound, IndexKey, IndexLookup};
pub use memory::MemoryStore;

/// Store failures. None of these are retried by the store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store is closed")]
    Closed,
}

/// Scan direction over the ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Record filter applied by the store to every candidate.
pub type RecordFilter<'a, R> = &'a (dyn Fn(&R) -> bool + Send + Sync);

/// A bounded scan request.
///
/// Candidates are the records whose key lies within `lower..upper`,
/// narrowed by `lookups` where an index exists. Every candidate is then
/// checked against `filter`; `lookups` only ever shrink the candidate set
/// to a superset of what `filter` accepts.
pub struct Scan<'a, R> {
    pub lower: Bound<OrderingKey>,
    pub upper: Bound<OrderingKey>,
    pub lookups: &'a [IndexLookup],
    pub order: ScanOrder,
    /// Matches to skip before collecting.
    pub offset: usize,
    /// Maximum records to collect.
    pub limit: usize,
    /// Keep counting matches after `limit` is reached.
    pub count_all: bool,
    pub filter: RecordFilter<'a, R>,
}

/// Result of a [`Scan`].
#[derive(Debug, Clone)]
pub struct ScanPage<R> {
    pub items: Vec<Stored<R>>,
    /// Number of matching records seen. Exact when `count_all` was set.
    pub matched: usize,
}

/// Ordered append-only log with indexed scans.
#[async_trait]
pub trait EventStore<R: Queryable>: Send + Sync {
    /// Append a record ingested now. Returns it with its assigned key.
    async fn append(&self, record: R) -> Result<Stored<R>, StoreError>;

    /// Append a record with an explicit ingestion instant.
    ///
    /// The store still guarantees monotonic keys: an instant earlier than
    /// the last assigned one is raised to it.
    async fn append_at(&self, record: R, at: DateTime<Utc>) -> Result<Stored<R>, StoreError>;

    /// Run a snapshot scan. Writes landing during the scan are not visible.
    async fn scan(&self, scan: Scan<'_, R>) -> Result<ScanPage<R>, StoreError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, StoreError>;
}
