//! Synthetic telemetry for demos and load checks.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use vg_core::{AlertRecord, Endpoint, LogRecord};

const SENSORS: &[&str] = &["sensor-1", "sensor-2", "edge-1"];

const SIGNATURES: &[(&str, &str, &str, i64)] = &[
    ("1:2019401:3", "ET SCAN Suspicious inbound to MSSQL port 1433", "attempted-recon", 2),
    ("1:2024792:2", "ET EXPLOIT Possible exploit attempt against SMB", "attempted-admin", 1),
    ("1:2100498:7", "GPL ATTACK_RESPONSE id check returned root", "bad-unknown", 2),
    ("1:10000001:0", "LOCAL ICMP ping sweep", "misc-activity", 3),
    ("1:2013028:7", "ET POLICY curl User-Agent Outbound", "policy-violation", 3),
    ("1:2027865:4", "ET INFO Observed DNS Query to .cloud TLD", "misc-activity", 4),
];

const ACTIONS: &[&str] = &["allow", "allow", "allow", "block", "drop"];
const SERVICES: &[(&str, &str, u16)] = &[
    ("tcp", "http", 80),
    ("tcp", "ssl", 443),
    ("udp", "dns", 53),
    ("tcp", "ssh", 22),
    ("tcp", "smb", 445),
];
const CONN_STATES: &[&str] = &["SF", "S0", "REJ", "RSTO", "SH"];

fn private_ip<R: Rng>(rng: &mut R) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, rng.gen_range(0..4), rng.gen_range(1..255)))
}

fn public_ip<R: Rng>(rng: &mut R) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(
        rng.gen_range(11..223),
        rng.gen(),
        rng.gen(),
        rng.gen_range(1..255),
    ))
}

fn pick<'a, R: Rng, T>(rng: &mut R, items: &'a [T]) -> &'a T {
    // callers only pass non-empty constant tables
    items.choose(rng).unwrap_or(&items[0])
}

pub fn random_alert<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> AlertRecord {
    let (rule_id, msg, class, priority) = *pick(rng, SIGNATURES);
    let (proto, _, port) = *pick(rng, SERVICES);
    AlertRecord {
        ts: Some(now.to_rfc3339()),
        sensor_id: pick(rng, SENSORS).to_string(),
        rule_id: rule_id.into(),
        priority,
        classification: Some(class.into()),
        action: pick(rng, ACTIONS).to_string(),
        msg: msg.into(),
        proto: proto.to_uppercase(),
        src: Endpoint {
            ip: Some(public_ip(rng)),
            port: Some(rng.gen_range(1024..65535)),
            netmask: None,
        },
        dst: Endpoint {
            ip: Some(private_ip(rng)),
            port: Some(port),
            netmask: None,
        },
        extra: BTreeMap::new(),
    }
}

pub fn random_log<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> LogRecord {
    let (proto, service, port) = *pick(rng, SERVICES);
    let uid: String = (0..17)
        .map(|_| *pick(rng, b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789") as char)
        .collect();
    LogRecord {
        ts: Some(now.timestamp_micros() as f64 / 1_000_000.0),
        uid: Some(format!("C{}", uid)),
        orig_h: Some(private_ip(rng)),
        orig_p: Some(rng.gen_range(1024..65535)),
        resp_h: Some(public_ip(rng)),
        resp_p: Some(port),
        proto: Some(proto.into()),
        service: Some(service.into()),
        conn_state: Some(pick(rng, CONN_STATES).to_string()),
        duration: Some(rng.gen_range(0.0..30.0)),
        orig_bytes: Some(rng.gen_range(0..50_000)),
        resp_bytes: Some(rng.gen_range(0..500_000)),
        sensor_id: Some(pick(rng, SENSORS).to_string()),
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::{fields, EntityKind, Queryable};

    #[test]
    fn test_generated_records_fill_every_field() {
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        for _ in 0..50 {
            let a = random_alert(&mut rng, now);
            for d in fields::fields(EntityKind::Alert) {
                assert!(a.field(d.name).is_some(), "alert {}", d.name);
            }
            let l = random_log(&mut rng, now);
            for d in fields::fields(EntityKind::Log) {
                assert!(l.field(d.name).is_some(), "log {}", d.name);
            }
        }
    }
}
