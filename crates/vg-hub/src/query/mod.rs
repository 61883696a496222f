//! # Telemetry Query Engine
//!
//! Turns a request of {filter expression, time window, page or cursor}
//! into a page of stored records.
//!
//! ```text
//! QueryParams ──► QueryRequest ──► parser::parse ──► Predicate
//!                                  window::resolve ─► Interval │ Tail
//!                                                      │          │
//!                        executor (bounded scan) ◄─────┘          └──► tailer::next
//! ```
//!
//! Filter grammar: whitespace-separated `field op value` clauses, implicitly
//! ANDed, e.g. `priority<3 action=block msg contains exploit`.

pub mod evaluator;
pub mod executor;
pub mod parser;
pub mod tailer;
pub mod window;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use vg_core::{Cursor, FieldKind, Operator, Stored};

use crate::config::QuerySettings;
use crate::error::QueryError;
pub use executor::QueryEngine;
pub use window::TimeWindow;

// =============================================================================
// Predicates
// =============================================================================

/// A clause value, already normalized to the field's kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Str(String),
    Int(i64),
    Ip(IpAddr),
}

/// `field op value` against a registry field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    /// Canonical registry name, even when an alias was typed.
    pub field: &'static str,
    pub kind: FieldKind,
    pub op: Operator,
    pub value: Literal,
}

/// Implicit AND of comparisons. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Predicate {
    pub clauses: Vec<Comparison>,
}

// =============================================================================
// Requests and Pages
// =============================================================================

/// One engine request. `page`/`page_size` apply to history mode,
/// `cursor`/`limit` to live mode.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub filter: String,
    pub window: TimeWindow,
    pub page: i64,
    pub page_size: i64,
    pub cursor: Cursor,
    pub limit: i64,
}

impl QueryRequest {
    pub fn new(filter: impl Into<String>, window: TimeWindow, settings: &QuerySettings) -> Self {
        Self {
            filter: filter.into(),
            window,
            page: 1,
            page_size: settings.default_page_size,
            cursor: Cursor::origin(),
            limit: settings.live_batch_limit,
        }
    }
}

/// Query-string parameters accepted by the query endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryParams {
    pub filters: Option<String>,
    pub realtime: Option<bool>,
    /// `live` or `history`.
    pub mode: Option<String>,
    pub since_minutes: Option<i64>,
    /// RFC 3339 or epoch seconds.
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    /// Epoch seconds.
    pub start_ts: Option<f64>,
    pub end_ts: Option<f64>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl QueryParams {
    /// Window precedence: live, then an explicit range, then a preset.
    pub fn into_request(self, settings: &QuerySettings) -> Result<QueryRequest, QueryError> {
        let live = self.realtime.unwrap_or(false)
            || self
                .mode
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case("live"));

        let window = if live {
            TimeWindow::Live
        } else if self.from_time.is_some() || self.to_time.is_some() {
            match (&self.from_time, &self.to_time) {
                (Some(from), Some(to)) => TimeWindow::Explicit {
                    from: window::parse_timestamp(from)?,
                    to: window::parse_timestamp(to)?,
                },
                _ => {
                    return Err(QueryError::InvalidWindow(
                        "from_time and to_time must be given together".into(),
                    ))
                }
            }
        } else if self.start_ts.is_some() || self.end_ts.is_some() {
            match (self.start_ts, self.end_ts) {
                (Some(start), Some(end)) => TimeWindow::Explicit {
                    from: window::from_epoch_secs(start)?,
                    to: window::from_epoch_secs(end)?,
                },
                _ => {
                    return Err(QueryError::InvalidWindow(
                        "start_ts and end_ts must be given together".into(),
                    ))
                }
            }
        } else {
            TimeWindow::Preset {
                minutes: self.since_minutes.unwrap_or(settings.default_since_minutes),
            }
        };

        let cursor = match self.cursor.as_deref().map(str::trim) {
            None | Some("") => Cursor::origin(),
            Some(token) => token.parse::<Cursor>()?,
        };

        let mut req = QueryRequest::new(self.filters.unwrap_or_default(), window, settings);
        req.cursor = cursor;
        if let Some(page) = self.page {
            req.page = page;
        }
        if let Some(page_size) = self.page_size {
            req.page_size = page_size;
        }
        if let Some(limit) = self.limit {
            req.limit = limit;
        }
        Ok(req)
    }
}

/// A slice of an interval-bounded result, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage<R> {
    pub items: Vec<Stored<R>>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// New records strictly after the submitted cursor, in arrival order.
#[derive(Debug, Clone, Serialize)]
pub struct LivePage<R> {
    pub items: Vec<Stored<R>>,
    pub next_cursor: Cursor,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Page<R> {
    History(HistoryPage<R>),
    Live(LivePage<R>),
}

impl<R> Page<R> {
    pub fn items(&self) -> &[Stored<R>] {
        match self {
            Page::History(p) => &p.items,
            Page::Live(p) => &p.items,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Page::History(_) => "history",
            Page::Live(_) => "live",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn settings() -> QuerySettings {
        QuerySettings::default()
    }

    #[test]
    fn test_no_window_defaults_to_preset() {
        let req = QueryParams::default().into_request(&settings()).unwrap();
        assert!(matches!(req.window, TimeWindow::Preset { minutes: 60 }));
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 50);
        assert!(req.cursor.is_origin());
    }

    #[test]
    fn test_live_takes_precedence() {
        let params = QueryParams {
            realtime: Some(true),
            since_minutes: Some(5),
            from_time: Some("2024-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        let req = params.into_request(&settings()).unwrap();
        assert!(matches!(req.window, TimeWindow::Live));

        let params = QueryParams {
            mode: Some("LIVE".into()),
            cursor: Some("1700000000000000-4".into()),
            ..Default::default()
        };
        let req = params.into_request(&settings()).unwrap();
        assert!(matches!(req.window, TimeWindow::Live));
        assert_eq!(req.cursor.to_string(), "1700000000000000-4");
    }

    #[test]
    fn test_explicit_beats_preset() {
        let params = QueryParams {
            since_minutes: Some(5),
            from_time: Some("2024-01-01T10:00:00Z".into()),
            to_time: Some("2024-01-01T11:00:00Z".into()),
            ..Default::default()
        };
        let req = params.into_request(&settings()).unwrap();
        match req.window {
            TimeWindow::Explicit { from, to } => {
                assert_eq!(from, Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
                assert_eq!(to, Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap());
            }
            other => panic!("expected explicit window, got {:?}", other),
        }
    }

    #[test]
    fn test_epoch_range() {
        let params = QueryParams {
            mode: Some("history".into()),
            start_ts: Some(1_704_067_200.0),
            end_ts: Some(1_704_070_800.5),
            ..Default::default()
        };
        let req = params.into_request(&settings()).unwrap();
        assert!(matches!(req.window, TimeWindow::Explicit { .. }));
    }

    #[test]
    fn test_half_open_range_rejected() {
        let params = QueryParams {
            from_time: Some("2024-01-01T10:00:00Z".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.into_request(&settings()),
            Err(QueryError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_bad_cursor_rejected() {
        let params = QueryParams {
            realtime: Some(true),
            cursor: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.into_request(&settings()),
            Err(QueryError::InvalidCursor(_))
        ));
    }
}
