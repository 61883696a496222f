//! # Time Window Resolver
//!
//! Collapses the three caller-facing window shapes into either a closed
//! interval of ingestion time or the open-ended tail mode.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::QueryError;

/// Window as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeWindow {
    /// The last `minutes` minutes up to now.
    Preset { minutes: i64 },
    /// A fixed range, both ends inclusive.
    Explicit {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// No upper bound; read through the tailer.
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedWindow {
    /// Closed interval `[start, end]`.
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Tail,
}

pub fn resolve(window: &TimeWindow, now: DateTime<Utc>) -> Result<ResolvedWindow, QueryError> {
    match *window {
        TimeWindow::Preset { minutes } => {
            if minutes <= 0 {
                return Err(QueryError::InvalidWindow(format!(
                    "preset must be a positive number of minutes, got {}",
                    minutes
                )));
            }
            let start = Duration::try_minutes(minutes)
                .and_then(|d| now.checked_sub_signed(d))
                .ok_or_else(|| {
                    QueryError::InvalidWindow(format!("preset of {} minutes is out of range", minutes))
                })?;
            Ok(ResolvedWindow::Interval { start, end: now })
        }
        TimeWindow::Explicit { from, to } => {
            if from > to {
                return Err(QueryError::InvalidWindow(format!(
                    "from ({}) is after to ({})",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
            Ok(ResolvedWindow::Interval {
                start: from,
                end: to,
            })
        }
        TimeWindow::Live => Ok(ResolvedWindow::Tail),
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC, or
/// epoch seconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, QueryError> {
    let value = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(secs) = value.parse::<f64>() {
        return from_epoch_secs(secs);
    }
    Err(QueryError::InvalidWindow(format!(
        "cannot parse timestamp '{}'",
        value
    )))
}

pub fn from_epoch_secs(secs: f64) -> Result<DateTime<Utc>, QueryError> {
    let micros = secs * 1_000_000.0;
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(QueryError::InvalidWindow(format!(
            "epoch timestamp {} is out of range",
            secs
        )));
    }
    DateTime::from_timestamp_micros(micros.round() as i64).ok_or_else(|| {
        QueryError::InvalidWindow(format!("epoch timestamp {} is out of range", secs))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_preset_sixty_is_one_hour() {
        for now in [noon(), noon() + Duration::milliseconds(123_456), Utc::now()] {
            match resolve(&TimeWindow::Preset { minutes: 60 }, now).unwrap() {
                ResolvedWindow::Interval { start, end } => {
                    assert_eq!(end, now);
                    assert_eq!((end - start).num_seconds(), 3600);
                }
                ResolvedWindow::Tail => panic!("preset resolved to tail"),
            }
        }
    }

    #[test]
    fn test_since_sixty_at_noon() {
        let resolved = resolve(&TimeWindow::Preset { minutes: 60 }, noon()).unwrap();
        assert_eq!(
            resolved,
            ResolvedWindow::Interval {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap(),
                end: noon(),
            }
        );
    }

    #[test]
    fn test_non_positive_preset_rejected() {
        for minutes in [0, -5] {
            assert!(matches!(
                resolve(&TimeWindow::Preset { minutes }, noon()),
                Err(QueryError::InvalidWindow(_))
            ));
        }
        assert!(matches!(
            resolve(&TimeWindow::Preset { minutes: i64::MAX }, noon()),
            Err(QueryError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_explicit_window() {
        let from = noon() - Duration::hours(2);
        let ok = resolve(&TimeWindow::Explicit { from, to: noon() }, noon()).unwrap();
        assert_eq!(ok, ResolvedWindow::Interval { start: from, end: noon() });

        // single instant is a valid closed interval
        assert!(resolve(&TimeWindow::Explicit { from, to: from }, noon()).is_ok());

        assert!(matches!(
            resolve(&TimeWindow::Explicit { from: noon(), to: from }, noon()),
            Err(QueryError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_live_is_tail() {
        assert_eq!(resolve(&TimeWindow::Live, noon()).unwrap(), ResolvedWindow::Tail);
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = noon();
        assert_eq!(parse_timestamp("2024-01-01T12:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T13:00:00+01:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1704110400").unwrap(), expected);
        assert!(parse_timestamp("last tuesday").is_err());
        assert!(from_epoch_secs(f64::NAN).is_err());
    }
}
