//! # In-Memory Event Store
//!
//! Append-only vector of [`Stored`] records in key order, guarded by a
//! multi-reader/single-writer lock.
//!
//! - **Writes** take the write lock only long enough to assign the next key
//!   and push. Because the key is assigned and published under the same
//!   lock, no reader can ever observe key `k` without every key below `k`.
//! - **Reads** take the read lock only to fix the scan's position range and
//!   to copy out chunks of record handles. Filters run with the lock
//!   released, so a slow scan never holds up ingestion. Positions below the
//!   range end fixed at scan start never change, which keeps every scan a
//!   consistent snapshot.

use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vg_core::{OrderingKey, Queryable, Stored};

use crate::index::FieldIndex;
use crate::{EventStore, Scan, ScanOrder, ScanPage, StoreError};

/// Record handles copied out per read-lock acquisition during a scan.
const SNAPSHOT_CHUNK: usize = 1024;

struct Inner<R> {
    records: Vec<Arc<Stored<R>>>,
    index: FieldIndex,
    next_seq: u64,
    last_micros: i64,
}

pub struct MemoryStore<R> {
    inner: RwLock<Inner<R>>,
    closed: AtomicBool,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Queryable> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                index: FieldIndex::for_entity(R::ENTITY),
                next_seq: 1,
                last_micros: 0,
            }),
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    /// Reject all further calls with [`StoreError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(entity = %R::ENTITY, "event store closed");
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<R: Queryable> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// First index in `records` whose key is inside the lower bound.
fn lower_index<R>(records: &[Arc<Stored<R>>], bound: Bound<OrderingKey>) -> usize {
    match bound {
        Bound::Unbounded => 0,
        Bound::Included(k) => records.partition_point(|s| s.key() < k),
        Bound::Excluded(k) => records.partition_point(|s| s.key() <= k),
    }
}

/// One past the last index in `records` whose key is inside the upper bound.
fn upper_index<R>(records: &[Arc<Stored<R>>], bound: Bound<OrderingKey>) -> usize {
    match bound {
        Bound::Unbounded => records.len(),
        Bound::Included(k) => records.partition_point(|s| s.key() <= k),
        Bound::Excluded(k) => records.partition_point(|s| s.key() < k),
    }
}

#[async_trait]
impl<R: Queryable> EventStore<R> for MemoryStore<R> {
    async fn append(&self, record: R) -> Result<Stored<R>, StoreError> {
        self.append_at(record, Utc::now()).await
    }

    async fn append_at(&self, record: R, at: DateTime<Utc>) -> Result<Stored<R>, StoreError> {
        self.check_open()?;
        let mut inner = self.inner.write().await;

        let requested = at.timestamp_micros();
        if requested < inner.last_micros {
            tracing::debug!(
                requested,
                last = inner.last_micros,
                "ingestion clock went backwards; clamping"
            );
        }
        let micros = requested.max(inner.last_micros);
        let ingested_at = DateTime::from_timestamp_micros(micros).unwrap_or(at);
        let seq = inner.next_seq;

        let stored = Stored {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            ingested_at,
            record,
        };

        let position = inner.records.len();
        inner.index.insert(position, &stored.record);
        inner.records.push(Arc::new(stored.clone()));
        inner.next_seq += 1;
        inner.last_micros = micros;

        Ok(stored)
    }

    async fn scan(&self, scan: Scan<'_, R>) -> Result<ScanPage<R>, StoreError> {
        self.check_open()?;

        let (lo, hi, positions) = {
            let inner = self.inner.read().await;
            let lo = lower_index(&inner.records, scan.lower);
            let hi = upper_index(&inner.records, scan.upper).max(lo);
            let positions = inner.index.candidates(scan.lookups, lo..hi);
            (lo, hi, positions)
        };

        let mut candidates: Box<dyn Iterator<Item = usize> + Send> = match (positions, scan.order) {
            (Some(p), ScanOrder::Ascending) => Box::new(p.into_iter()),
            (Some(p), ScanOrder::Descending) => Box::new(p.into_iter().rev()),
            (None, ScanOrder::Ascending) => Box::new(lo..hi),
            (None, ScanOrder::Descending) => Box::new((lo..hi).rev()),
        };

        let mut items = Vec::with_capacity(scan.limit.min(hi - lo));
        let mut matched = 0usize;
        let mut chunk: Vec<Arc<Stored<R>>> = Vec::with_capacity(SNAPSHOT_CHUNK.min(hi - lo));

        'scan: loop {
            {
                let inner = self.inner.read().await;
                chunk.extend(
                    candidates
                        .by_ref()
                        .take(SNAPSHOT_CHUNK)
                        .filter_map(|pos| inner.records.get(pos).cloned()),
                );
            }
            if chunk.is_empty() {
                break;
            }

            for stored in chunk.drain(..) {
                if !(scan.filter)(&stored.record) {
                    continue;
                }
                if matched >= scan.offset && items.len() < scan.limit {
                    items.push(Stored::clone(&stored));
                }
                matched += 1;
                if !scan.count_all && items.len() >= scan.limit {
                    break 'scan;
                }
            }
        }

        Ok(ScanPage { items, matched })
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.check_open()?;
        Ok(self.inner.read().await.records.len())
    }
}
