//! # Cursor Tailer
//!
//! Incremental reads for live callers. Each call returns the matching
//! records strictly after the caller's cursor in ascending key order, and
//! the cursor to submit next time.
//!
//! Keys are published by the store in strictly increasing order, so a
//! record is either visible to a poll or has a key above everything that
//! poll returned. A caller that always resubmits the returned cursor
//! therefore sees every record exactly once.

use std::ops::Bound;
use std::time::Duration;

use vg_core::{Cursor, Queryable, Stored};
use vg_store::{EventStore, Scan, ScanOrder};

use super::evaluator::{matches, pushdown};
use super::executor::bounded;
use super::Predicate;
use crate::error::QueryError;

/// Next batch after `cursor`, at most `max_items` long.
///
/// With nothing new the cursor comes back unchanged.
pub async fn next<R: Queryable>(
    store: &dyn EventStore<R>,
    predicate: &Predicate,
    cursor: Cursor,
    max_items: usize,
    timeout: Duration,
) -> Result<(Vec<Stored<R>>, Cursor), QueryError> {
    if max_items == 0 {
        return Ok((Vec::new(), cursor));
    }

    let lookups = pushdown(predicate, R::ENTITY);
    let filter = |record: &R| matches(record, predicate);
    let scan = Scan {
        lower: Bound::Excluded(cursor.key()),
        upper: Bound::Unbounded,
        lookups: &lookups,
        order: ScanOrder::Ascending,
        offset: 0,
        limit: max_items,
        count_all: false,
        filter: &filter,
    };

    let page = bounded(timeout, store.scan(scan)).await?;
    let next_cursor = cursor.advance(page.items.last().map(Stored::key));
    Ok((page.items, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use chrono::DateTime;
    use vg_core::{AlertRecord, EntityKind, OrderingKey};
    use vg_store::MemoryStore;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn alert(priority: i64) -> AlertRecord {
        serde_json::from_value(serde_json::json!({
            "sensor_id": "sensor-1",
            "rule_id": "1:1:1",
            "priority": priority,
        }))
        .unwrap()
    }

    async fn store_at(micros: &[i64]) -> MemoryStore<AlertRecord> {
        let store = MemoryStore::new();
        for &m in micros {
            let at = DateTime::from_timestamp_micros(m).unwrap();
            store.append_at(alert(1), at).await.unwrap();
        }
        store
    }

    fn micros(items: &[Stored<AlertRecord>]) -> Vec<i64> {
        items.iter().map(|s| s.key().micros).collect()
    }

    #[tokio::test]
    async fn test_three_polls_over_three_records() {
        let store = store_at(&[10, 20, 30]).await;
        let all = Predicate::default();

        let (items, c1) = next(&store, &all, Cursor::origin(), 2, TIMEOUT).await.unwrap();
        assert_eq!(micros(&items), vec![10, 20]);
        assert_eq!(c1.key().micros, 20);

        let (items, c2) = next(&store, &all, c1, 2, TIMEOUT).await.unwrap();
        assert_eq!(micros(&items), vec![30]);
        assert_eq!(c2.key().micros, 30);

        let (items, c3) = next(&store, &all, c2, 2, TIMEOUT).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(c3, c2);
    }

    #[tokio::test]
    async fn test_same_cursor_without_new_data_is_idempotent() {
        let store = store_at(&[5]).await;
        let all = Predicate::default();
        let (_, cursor) = next(&store, &all, Cursor::origin(), 10, TIMEOUT).await.unwrap();

        for _ in 0..3 {
            let (items, again) = next(&store, &all, cursor, 10, TIMEOUT).await.unwrap();
            assert!(items.is_empty());
            assert_eq!(again, cursor);
        }
    }

    #[tokio::test]
    async fn test_same_microsecond_records_are_not_skipped() {
        // five records share one ingestion instant; seq breaks the tie
        let store = store_at(&[100, 100, 100, 100, 100]).await;
        let all = Predicate::default();

        let mut cursor = Cursor::origin();
        let mut seen = Vec::new();
        loop {
            let (items, next_cursor) = next(&store, &all, cursor, 2, TIMEOUT).await.unwrap();
            if items.is_empty() {
                break;
            }
            seen.extend(items.iter().map(|s| s.seq));
            cursor = next_cursor;
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_interleaved_writes_delivered_exactly_once() {
        let store = MemoryStore::new();
        let p = parse(EntityKind::Alert, "priority<3").unwrap();

        let mut cursor = Cursor::origin();
        let mut delivered = Vec::new();
        let mut expected = Vec::new();
        for round in 0..20i64 {
            for j in 0..(round % 4) {
                let s = store.append(alert((round + j) % 5)).await.unwrap();
                if s.record.priority < 3 {
                    expected.push(s.key());
                }
            }
            let (items, next_cursor) = next(&store, &p, cursor, 3, TIMEOUT).await.unwrap();
            assert!(next_cursor >= cursor);
            delivered.extend(items.iter().map(Stored::key));
            cursor = next_cursor;
        }
        // drain
        loop {
            let (items, next_cursor) = next(&store, &p, cursor, 3, TIMEOUT).await.unwrap();
            if items.is_empty() {
                break;
            }
            delivered.extend(items.iter().map(Stored::key));
            cursor = next_cursor;
        }

        assert_eq!(delivered, expected);
        let mut sorted = delivered.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, delivered);
    }

    #[tokio::test]
    async fn test_cursor_past_filtered_records_stays_put() {
        let store = store_at(&[1, 2, 3]).await;
        let none = parse(EntityKind::Alert, "priority>100").unwrap();
        let start = Cursor::at(OrderingKey::new(1, 1));
        let (items, cursor) = next(&store, &none, start, 10, TIMEOUT).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(cursor, start);
    }
}
