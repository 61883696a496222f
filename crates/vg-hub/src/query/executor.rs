//! # Query Orchestrator
//!
//! One request/response cycle: parse the filter, resolve the window, then
//! either slice a bounded newest-first scan into a page or hand off to the
//! tailer. Parser and resolver failures abort the whole request; there are
//! no partial results.

use std::future::Future;
use std::ops::Bound;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use vg_core::{OrderingKey, Queryable};
use vg_store::{EventStore, Scan, ScanOrder, StoreError};

use super::evaluator::{matches, pushdown};
use super::window::{self, ResolvedWindow};
use super::{parser, tailer, HistoryPage, LivePage, Page, Predicate, QueryRequest};
use crate::config::QuerySettings;
use crate::error::QueryError;

/// Run a store call under `timeout`. Elapsing counts as the store being
/// unavailable; the call is dropped, not retried.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(QueryError::from),
        Err(_) => Err(QueryError::StoreUnavailable(format!(
            "store did not answer within {} ms",
            timeout.as_millis()
        ))),
    }
}

/// Stateless between requests; holds only limits and defaults.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(settings: QuerySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Serve one request against the store of entity type `R`.
    pub async fn query<R: Queryable>(
        &self,
        store: &dyn EventStore<R>,
        req: &QueryRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<R>, QueryError> {
        let start = Instant::now();
        match self.run(store, req, now).await {
            Ok(page) => {
                tracing::debug!(
                    entity = %R::ENTITY,
                    mode = page.mode(),
                    returned = page.items().len(),
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "query served"
                );
                Ok(page)
            }
            Err(e) => {
                tracing::warn!(entity = %R::ENTITY, kind = e.kind(), "query rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Number of records held by `store`.
    pub async fn count<R: Queryable>(&self, store: &dyn EventStore<R>) -> Result<usize, QueryError> {
        bounded(self.settings.store_timeout(), store.len()).await
    }

    async fn run<R: Queryable>(
        &self,
        store: &dyn EventStore<R>,
        req: &QueryRequest,
        now: DateTime<Utc>,
    ) -> Result<Page<R>, QueryError> {
        let predicate = parser::parse(R::ENTITY, &req.filter)?;

        match window::resolve(&req.window, now)? {
            ResolvedWindow::Interval { start, end } => {
                let page = self
                    .history(store, &predicate, start, end, req.page, req.page_size)
                    .await?;
                Ok(Page::History(page))
            }
            ResolvedWindow::Tail => {
                if req.limit <= 0 {
                    return Err(QueryError::InvalidPage(format!(
                        "limit must be positive, got {}",
                        req.limit
                    )));
                }
                let limit = req.limit.min(self.settings.max_live_batch.max(1)) as usize;
                let (items, next_cursor) = tailer::next(
                    store,
                    &predicate,
                    req.cursor,
                    limit,
                    self.settings.store_timeout(),
                )
                .await?;
                Ok(Page::Live(LivePage { items, next_cursor }))
            }
        }
    }

    async fn history<R: Queryable>(
        &self,
        store: &dyn EventStore<R>,
        predicate: &Predicate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: i64,
        page_size: i64,
    ) -> Result<HistoryPage<R>, QueryError> {
        if page < 1 {
            return Err(QueryError::InvalidPage(format!(
                "page must be 1 or greater, got {}",
                page
            )));
        }
        if page_size <= 0 {
            return Err(QueryError::InvalidPage(format!(
                "page_size must be positive, got {}",
                page_size
            )));
        }
        let page_size = page_size.min(self.settings.max_page_size.max(1));
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| QueryError::InvalidPage(format!("page {} is out of range", page)))?;

        let lookups = pushdown(predicate, R::ENTITY);
        let filter = |record: &R| matches(record, predicate);
        let scan = Scan {
            lower: Bound::Included(OrderingKey::floor_of(start)),
            upper: Bound::Included(OrderingKey::ceil_of(end)),
            lookups: &lookups,
            order: ScanOrder::Descending,
            offset,
            limit: page_size as usize,
            count_all: true,
            filter: &filter,
        };
        let scanned = bounded(self.settings.store_timeout(), store.scan(scan)).await?;

        let total = scanned.matched as u64;
        let page_size = page_size as u64;
        Ok(HistoryPage {
            items: scanned.items,
            total,
            page: page as u64,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeWindow;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use vg_core::{AlertRecord, EntityKind, LogRecord, Stored};
    use vg_store::{MemoryStore, ScanPage};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn alert(priority: i64, action: &str) -> AlertRecord {
        serde_json::from_value(serde_json::json!({
            "sensor_id": "sensor-1",
            "rule_id": "1:1:1",
            "priority": priority,
            "action": action,
            "msg": "exploit attempt",
        }))
        .unwrap()
    }

    fn engine() -> QueryEngine {
        QueryEngine::new(QuerySettings::default())
    }

    fn history_req(filter: &str, page: i64, page_size: i64) -> QueryRequest {
        let mut req = QueryRequest::new(filter, TimeWindow::Preset { minutes: 60 }, &QuerySettings::default());
        req.page = page;
        req.page_size = page_size;
        req
    }

    /// 30 alerts one minute apart ending at noon, plus one outside the hour.
    async fn seeded() -> MemoryStore<AlertRecord> {
        let store = MemoryStore::new();
        store
            .append_at(alert(1, "block"), noon() - ChronoDuration::minutes(90))
            .await
            .unwrap();
        for i in (0..30).rev() {
            let action = if i % 2 == 0 { "block" } else { "allow" };
            store
                .append_at(alert(i % 4, action), noon() - ChronoDuration::minutes(i))
                .await
                .unwrap();
        }
        store
    }

    fn expect_history<R>(page: Page<R>) -> HistoryPage<R> {
        match page {
            Page::History(h) => h,
            Page::Live(_) => panic!("expected a history page"),
        }
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_windowed() {
        let store = seeded().await;
        let page = engine()
            .query(&store, &history_req("", 1, 100), noon())
            .await
            .unwrap();
        let h = expect_history(page);
        assert_eq!(h.total, 30);
        assert_eq!(h.total_pages, 1);
        assert!(h.items.windows(2).all(|w| w[0].key() > w[1].key()));
        assert_eq!(h.items[0].ingested_at, noon());
    }

    #[tokio::test]
    async fn test_pages_concatenate_to_full_result() {
        let store = seeded().await;
        let filter = "action=block priority<3";

        let full = expect_history(
            engine()
                .query(&store, &history_req(filter, 1, 500), noon())
                .await
                .unwrap(),
        );

        for page_size in [1i64, 4, 7, 15, 50] {
            let first = expect_history(
                engine()
                    .query(&store, &history_req(filter, 1, page_size), noon())
                    .await
                    .unwrap(),
            );
            assert_eq!(first.total, full.total);
            assert_eq!(first.total_pages, full.total.div_ceil(page_size as u64));

            let mut joined: Vec<Stored<AlertRecord>> = Vec::new();
            for p in 1..=first.total_pages as i64 {
                let h = expect_history(
                    engine()
                        .query(&store, &history_req(filter, p, page_size), noon())
                        .await
                        .unwrap(),
                );
                joined.extend(h.items);
            }
            let a: Vec<_> = joined.iter().map(|s| s.id.clone()).collect();
            let b: Vec<_> = full.items.iter().map(|s| s.id.clone()).collect();
            assert_eq!(a, b, "page_size {}", page_size);
        }
    }

    #[tokio::test]
    async fn test_page_beyond_end_is_empty() {
        let store = seeded().await;
        let h = expect_history(
            engine()
                .query(&store, &history_req("", 99, 10), noon())
                .await
                .unwrap(),
        );
        assert!(h.items.is_empty());
        assert_eq!(h.total, 30);
        assert_eq!(h.total_pages, 3);
    }

    #[tokio::test]
    async fn test_empty_result_is_a_valid_page() {
        let store = seeded().await;
        let h = expect_history(
            engine()
                .query(&store, &history_req("priority>50", 1, 10), noon())
                .await
                .unwrap(),
        );
        assert_eq!(h.total, 0);
        assert_eq!(h.total_pages, 0);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let store = seeded().await;
        let settings = QuerySettings {
            max_page_size: 5,
            ..Default::default()
        };
        let h = expect_history(
            QueryEngine::new(settings)
                .query(&store, &history_req("", 1, 100), noon())
                .await
                .unwrap(),
        );
        assert_eq!(h.page_size, 5);
        assert_eq!(h.items.len(), 5);
        assert_eq!(h.total_pages, 6);
    }

    #[tokio::test]
    async fn test_invalid_pages_rejected() {
        let store = seeded().await;
        for (page, size) in [(0, 10), (-1, 10), (1, 0), (1, -5)] {
            let err = engine()
                .query(&store, &history_req("", page, size), noon())
                .await
                .unwrap_err();
            assert!(matches!(err, QueryError::InvalidPage(_)), "{} {}", page, size);
        }
    }

    #[tokio::test]
    async fn test_parser_errors_propagate_before_window() {
        let store = seeded().await;
        let mut req = history_req("severity=high", 1, 10);
        req.window = TimeWindow::Preset { minutes: 0 };
        let err = engine().query(&store, &req, noon()).await.unwrap_err();
        assert!(matches!(err, QueryError::UnknownField { entity: EntityKind::Alert, .. }));

        req.filter = String::new();
        let err = engine().query(&store, &req, noon()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidWindow(_)));
    }

    #[tokio::test]
    async fn test_explicit_window_is_inclusive() {
        let store = seeded().await;
        let mut req = history_req("", 1, 100);
        req.window = TimeWindow::Explicit {
            from: noon() - ChronoDuration::minutes(2),
            to: noon() - ChronoDuration::minutes(1),
        };
        let h = expect_history(engine().query(&store, &req, noon()).await.unwrap());
        assert_eq!(h.total, 2);
    }

    #[tokio::test]
    async fn test_live_mode_uses_cursor() {
        let store = seeded().await;
        let mut req = history_req("action=block", 1, 10);
        req.window = TimeWindow::Live;
        req.limit = 4;

        let mut seen = 0;
        let mut polls = 0;
        loop {
            let page = engine().query(&store, &req, noon()).await.unwrap();
            let Page::Live(live) = page else {
                panic!("expected a live page");
            };
            assert!(live.next_cursor >= req.cursor);
            if live.items.is_empty() {
                break;
            }
            assert!(live.items.windows(2).all(|w| w[0].key() < w[1].key()));
            seen += live.items.len();
            req.cursor = live.next_cursor;
            polls += 1;
        }
        // 15 in the hour plus the one 90 minutes back: live ignores windows
        assert_eq!(seen, 16);
        assert_eq!(polls, 4);
    }

    #[tokio::test]
    async fn test_live_limit_validation() {
        let store = seeded().await;
        let mut req = history_req("", 1, 10);
        req.window = TimeWindow::Live;
        req.limit = 0;
        assert!(matches!(
            engine().query(&store, &req, noon()).await,
            Err(QueryError::InvalidPage(_))
        ));

        req.limit = 1_000_000;
        let settings = QuerySettings {
            max_live_batch: 3,
            ..Default::default()
        };
        let page = QueryEngine::new(settings).query(&store, &req, noon()).await.unwrap();
        assert_eq!(page.items().len(), 3);
    }

    /// The engine's indexed result must equal a plain scan filtered by the
    /// evaluator alone.
    async fn assert_same_as_unindexed<R: Queryable>(store: &MemoryStore<R>, filter: &str) {
        let predicate = parser::parse(R::ENTITY, filter).unwrap();
        assert!(
            !pushdown(&predicate, R::ENTITY).is_empty(),
            "{} does not reach the index",
            filter
        );

        let keep = |r: &R| matches(r, &predicate);
        let full = store
            .scan(Scan {
                lower: Bound::Unbounded,
                upper: Bound::Unbounded,
                lookups: &[],
                order: ScanOrder::Descending,
                offset: 0,
                limit: usize::MAX,
                count_all: true,
                filter: &keep,
            })
            .await
            .unwrap();

        let h = expect_history(
            engine()
                .query(store, &history_req(filter, 1, 500), noon())
                .await
                .unwrap(),
        );
        let indexed: Vec<_> = h.items.iter().map(|s| s.seq).collect();
        let plain: Vec<_> = full.items.iter().map(|s| s.seq).collect();
        assert!(!plain.is_empty(), "{} matched nothing", filter);
        assert_eq!(indexed, plain, "{}", filter);
        assert_eq!(h.total as usize, full.matched);
    }

    #[tokio::test]
    async fn test_pushdown_keeps_membership_for_ports_and_addresses() {
        let alerts = MemoryStore::new();
        let sources = [Some("10.0.0.5"), Some("::ffff:10.0.0.5"), Some("10.0.0.6"), None];
        for i in 0..40i64 {
            let mut a = alert(i % 4, "allow");
            a.dst.port = if i % 7 == 0 { None } else { Some((i * 37 % 1000) as u16) };
            a.src.ip = sources[(i % 4) as usize].and_then(|ip| ip.parse().ok());
            alerts.append_at(a, noon()).await.unwrap();
        }
        for filter in [
            "dst.port<500",
            "dst.port=74",
            "dst.port>100 dst.port<900",
            "src.ip=10.0.0.5",
            "src.ip=::ffff:10.0.0.6 priority>1",
        ] {
            assert_same_as_unindexed(&alerts, filter).await;
        }

        let logs = MemoryStore::new();
        for i in 0..40u16 {
            let orig = if i % 3 == 0 { "192.168.1.10" } else { "192.168.1.11" };
            let (port, proto) = if i % 2 == 0 { (53, "udp") } else { (443, "tcp") };
            let log: LogRecord = serde_json::from_value(serde_json::json!({
                "uid": format!("C{}", i),
                "id.orig_h": orig,
                "id.resp_h": "8.8.8.8",
                "id.resp_p": port,
                "proto": proto,
            }))
            .unwrap();
            logs.append_at(log, noon()).await.unwrap();
        }
        for filter in [
            "id.resp_p=53",
            "id.resp_p<100 proto=udp",
            "id.orig_h=192.168.1.10",
            "dst.port>100 src.ip=192.168.1.11",
        ] {
            assert_same_as_unindexed(&logs, filter).await;
        }
    }

    struct FailingStore;

    #[async_trait]
    impl EventStore<AlertRecord> for FailingStore {
        async fn append(&self, _: AlertRecord) -> Result<Stored<AlertRecord>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        async fn append_at(
            &self,
            _: AlertRecord,
            _: DateTime<Utc>,
        ) -> Result<Stored<AlertRecord>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        async fn scan(&self, _: Scan<'_, AlertRecord>) -> Result<ScanPage<AlertRecord>, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        async fn len(&self) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl EventStore<AlertRecord> for StalledStore {
        async fn append(&self, _: AlertRecord) -> Result<Stored<AlertRecord>, StoreError> {
            std::future::pending().await
        }
        async fn append_at(
            &self,
            _: AlertRecord,
            _: DateTime<Utc>,
        ) -> Result<Stored<AlertRecord>, StoreError> {
            std::future::pending().await
        }
        async fn scan(&self, _: Scan<'_, AlertRecord>) -> Result<ScanPage<AlertRecord>, StoreError> {
            std::future::pending().await
        }
        async fn len(&self) -> Result<usize, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_failing_store_surfaces_unavailable() {
        let err = engine()
            .query(&FailingStore, &history_req("", 1, 10), noon())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(ref m) if m.contains("disk on fire")));

        let mut live = history_req("", 1, 10);
        live.window = TimeWindow::Live;
        assert!(matches!(
            engine().query(&FailingStore, &live, noon()).await,
            Err(QueryError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let settings = QuerySettings {
            store_timeout_ms: 20,
            ..Default::default()
        };
        let engine = QueryEngine::new(settings);
        let err = engine
            .query(&StalledStore, &history_req("", 1, 10), noon())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(_)));
        assert!(matches!(
            engine.count(&StalledStore).await,
            Err(QueryError::StoreUnavailable(_))
        ));
    }
}
