//! # Ingestion Normalization
//!
//! Sensors push alerts and connection logs in a few loosely-typed shapes.
//! Everything is mapped onto [`AlertRecord`] / [`LogRecord`] here, before
//! it reaches the store, so the query side only ever sees one shape.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use vg_core::{AlertRecord, LogRecord};

use crate::error::ApiError;

/// A push body is one object or an array of objects.
fn into_batch(body: Value) -> Result<Vec<Map<String, Value>>, ApiError> {
    match body {
        Value::Object(obj) => Ok(vec![obj]),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(ApiError::BadRequest(format!(
                    "item {} is not an object: {}",
                    i, other
                ))),
            })
            .collect(),
        other => Err(ApiError::BadRequest(format!(
            "expected an object or an array of objects, got {}",
            other
        ))),
    }
}

// =============================================================================
// Alerts
// =============================================================================

/// Convert a sensor timestamp of the form `MM/DD-HH:MM:SS.ffffff` to ISO
/// 8601 using `year`. Anything else is kept as sent.
pub fn parse_sensor_ts(raw: &str, year: i32) -> String {
    let candidate = format!("{}/{}", year, raw.trim());
    match NaiveDateTime::parse_from_str(&candidate, "%Y/%m/%d-%H:%M:%S%.f") {
        Ok(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Numeric strings become numbers and empty strings become null, so that
/// typed fields accept what sensors commonly send.
fn coerce_number(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(s),
        },
        other => other,
    }
}

fn coerce_ip(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        other => other,
    }
}

fn rename(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if !obj.contains_key(to) {
        if let Some(v) = obj.remove(from) {
            obj.insert(to.to_string(), v);
        }
    }
}

/// Keys the stored envelope writes itself. A pushed attribute with one of
/// these names is kept under the `source_` prefix instead.
const RESERVED_KEYS: [&str; 3] = ["_id", "seq", "ingested_at"];

fn shelve_reserved(obj: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        if let Some(value) = obj.remove(key) {
            obj.entry(format!("source_{}", key.trim_start_matches('_')))
                .or_insert(value);
        }
    }
}

fn normalize_alert(mut a: Map<String, Value>, now: DateTime<Utc>) -> Map<String, Value> {
    shelve_reserved(&mut a);
    if !a.contains_key("ts") {
        let ts = match a.remove("timestamp") {
            Some(Value::String(raw)) => Value::String(parse_sensor_ts(&raw, now.year())),
            Some(other) => other,
            None => Value::Null,
        };
        a.insert("ts".into(), ts);
    }

    rename(&mut a, "rule", "rule_id");
    rename(&mut a, "class", "classification");

    let flat = ["src_addr", "src_port", "dst_addr", "dst_port"];
    if flat.iter().any(|k| a.contains_key(*k)) {
        for side in ["src", "dst"] {
            let mut endpoint = Map::new();
            endpoint.insert(
                "ip".into(),
                a.remove(&format!("{}_addr", side)).unwrap_or(Value::Null),
            );
            endpoint.insert(
                "port".into(),
                a.remove(&format!("{}_port", side)).unwrap_or(Value::Null),
            );
            a.insert(side.into(), Value::Object(endpoint));
        }
    }

    for side in ["src", "dst"] {
        if let Some(Value::Object(endpoint)) = a.get_mut(side) {
            if let Some(ip) = endpoint.remove("ip") {
                endpoint.insert("ip".into(), coerce_ip(ip));
            }
            if let Some(port) = endpoint.remove("port") {
                endpoint.insert("port".into(), coerce_number(port));
            }
        }
    }

    match a.remove("priority") {
        Some(Value::Null) | None => {}
        Some(p) => {
            a.insert("priority".into(), coerce_number(p));
        }
    }
    for (key, default) in [("action", "allow"), ("proto", "IP")] {
        let missing = match a.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            a.insert(key.into(), Value::String(default.into()));
        }
    }

    a
}

/// Normalize and type-check an alert push body.
pub fn alerts_from_body(body: Value, now: DateTime<Utc>) -> Result<Vec<AlertRecord>, ApiError> {
    into_batch(body)?
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            serde_json::from_value(Value::Object(normalize_alert(raw, now)))
                .map_err(|e| ApiError::BadRequest(format!("alert {}: {}", i, e)))
        })
        .collect()
}

// =============================================================================
// Connection Logs
// =============================================================================

/// Zeek writes `-` for unset fields.
fn normalize_log(mut l: Map<String, Value>) -> Map<String, Value> {
    shelve_reserved(&mut l);
    l.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) if s == "-" => (k, Value::Null),
            other => (k, other),
        })
        .collect()
}

pub fn logs_from_body(body: Value) -> Result<Vec<LogRecord>, ApiError> {
    into_batch(body)?
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            serde_json::from_value(Value::Object(normalize_log(raw)))
                .map_err(|e| ApiError::BadRequest(format!("log {}: {}", i, e)))
        })
        .collect()
}
