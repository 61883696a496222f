//! # Telemetry Records
//!
//! Each record type is a fixed struct of known fields plus an open
//! `extra` side-map that keeps any attribute the sensor sent which the
//! registry does not know about. Only the known fields are queryable.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::EntityKind;

/// A normalized, typed view of one field of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
    Ip(IpAddr),
    Port(u16),
}

/// Records the engine can filter.
///
/// `field` takes a canonical registry name and returns `None` when the
/// record does not carry a value for it.
pub trait Queryable: Clone + Send + Sync + 'static {
    const ENTITY: EntityKind;

    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// One side of a network flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

// =============================================================================
// IDS Alerts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Event time as reported by the sensor (free-form, not used for ordering).
    #[serde(default)]
    pub ts: Option<String>,
    pub sensor_id: String,
    pub rule_id: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "default_proto")]
    pub proto: String,
    #[serde(default)]
    pub src: Endpoint,
    #[serde(default)]
    pub dst: Endpoint,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_priority() -> i64 {
    3
}
fn default_action() -> String {
    "allow".into()
}
fn default_proto() -> String {
    "IP".into()
}

impl Queryable for AlertRecord {
    const ENTITY: EntityKind = EntityKind::Alert;

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "rule_id" => Some(FieldValue::Str(&self.rule_id)),
            "priority" => Some(FieldValue::Int(self.priority)),
            "msg" => Some(FieldValue::Str(&self.msg)),
            "src.ip" => self.src.ip.map(FieldValue::Ip),
            "src.port" => self.src.port.map(FieldValue::Port),
            "dst.ip" => self.dst.ip.map(FieldValue::Ip),
            "dst.port" => self.dst.port.map(FieldValue::Port),
            "sensor_id" => Some(FieldValue::Str(&self.sensor_id)),
            "action" => Some(FieldValue::Str(&self.action)),
            "classification" => self.classification.as_deref().map(FieldValue::Str),
            "proto" => Some(FieldValue::Str(&self.proto)),
            _ => None,
        }
    }
}

// =============================================================================
// Connection Logs
// =============================================================================

/// A connection record in Zeek `conn.log` shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Connection start, epoch seconds.
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "id.orig_h", default)]
    pub orig_h: Option<IpAddr>,
    #[serde(rename = "id.orig_p", default)]
    pub orig_p: Option<u16>,
    #[serde(rename = "id.resp_h", default)]
    pub resp_h: Option<IpAddr>,
    #[serde(rename = "id.resp_p", default)]
    pub resp_p: Option<u16>,
    #[serde(default)]
    pub proto: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub conn_state: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub orig_bytes: Option<i64>,
    #[serde(default)]
    pub resp_bytes: Option<i64>,
    #[serde(default, alias = "_sensor_hostname")]
    pub sensor_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Queryable for LogRecord {
    const ENTITY: EntityKind = EntityKind::Log;

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "uid" => self.uid.as_deref().map(FieldValue::Str),
            "sensor_id" => self.sensor_id.as_deref().map(FieldValue::Str),
            "proto" => self.proto.as_deref().map(FieldValue::Str),
            "service" => self.service.as_deref().map(FieldValue::Str),
            "conn_state" => self.conn_state.as_deref().map(FieldValue::Str),
            "src.ip" => self.orig_h.map(FieldValue::Ip),
            "src.port" => self.orig_p.map(FieldValue::Port),
            "dst.ip" => self.resp_h.map(FieldValue::Ip),
            "dst.port" => self.resp_p.map(FieldValue::Port),
            "orig_bytes" => self.orig_bytes.map(FieldValue::Int),
            "resp_bytes" => self.resp_bytes.map(FieldValue::Int),
            "duration_ms" => self
                .duration
                .filter(|d| d.is_finite())
                .map(|d| FieldValue::Int((d * 1000.0).round() as i64)),
            _ => None,
        }
    }
}
