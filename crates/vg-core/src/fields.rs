//! # Field Registry
//!
//! The fixed set of queryable fields per entity type, with each field's
//! value kind and the operators it accepts. The tables are `const` data:
//! built at compile time, read-only for the life of the process.
//!
//! The parser validates every clause against this registry; the evaluator
//! and the store index use the value kind to pick comparison semantics.

use std::fmt;

use serde::Serialize;

use crate::EntityKind;

/// How a field's values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Case-sensitive text. Lexicographic equality, substring search.
    String,
    /// Signed integer.
    Integer,
    /// IPv4/IPv6 address, compared as a parsed address.
    Ip,
    /// Transport port, compared numerically.
    Port,
}

impl FieldKind {
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Port)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Ip => write!(f, "ip"),
            Self::Port => write!(f, "port"),
        }
    }
}

/// Comparison operators of the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

impl Operator {
    /// The operator as it is typed in a filter expression.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One queryable field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    /// Canonical name, as used in predicates and by [`crate::Queryable::field`].
    pub name: &'static str,
    pub kind: FieldKind,
    pub operators: &'static [Operator],
    /// Whether the store keeps a secondary index for this field.
    pub indexed: bool,
    /// Alternate spellings accepted in filter expressions.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub aliases: &'static [&'static str],
}

impl FieldDescriptor {
    #[inline]
    pub fn allows(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }
}

const STRING_OPS: &[Operator] = &[Operator::Eq, Operator::Ne, Operator::Contains];
const NUMERIC_OPS: &[Operator] = &[Operator::Eq, Operator::Ne, Operator::Gt, Operator::Lt];
const IP_OPS: &[Operator] = &[Operator::Eq, Operator::Ne];

const fn field(
    name: &'static str,
    kind: FieldKind,
    indexed: bool,
    aliases: &'static [&'static str],
) -> FieldDescriptor {
    let operators = match kind {
        FieldKind::String => STRING_OPS,
        FieldKind::Integer | FieldKind::Port => NUMERIC_OPS,
        FieldKind::Ip => IP_OPS,
    };
    FieldDescriptor {
        name,
        kind,
        operators,
        indexed,
        aliases,
    }
}

/// Fields of IDS alerts.
pub const ALERT_FIELDS: &[FieldDescriptor] = &[
    field("rule_id", FieldKind::String, true, &[]),
    field("priority", FieldKind::Integer, true, &[]),
    field("msg", FieldKind::String, false, &[]),
    field("src.ip", FieldKind::Ip, true, &[]),
    field("src.port", FieldKind::Port, false, &[]),
    field("dst.ip", FieldKind::Ip, true, &[]),
    field("dst.port", FieldKind::Port, true, &[]),
    field("sensor_id", FieldKind::String, true, &[]),
    field("action", FieldKind::String, true, &[]),
    field("classification", FieldKind::String, false, &[]),
    field("proto", FieldKind::String, false, &[]),
];

/// Fields of connection logs. Zeek's `id.*` names are accepted as aliases.
pub const LOG_FIELDS: &[FieldDescriptor] = &[
    field("uid", FieldKind::String, true, &[]),
    field("sensor_id", FieldKind::String, true, &["sensor", "_sensor_hostname"]),
    field("proto", FieldKind::String, true, &[]),
    field("service", FieldKind::String, true, &[]),
    field("conn_state", FieldKind::String, false, &[]),
    field("src.ip", FieldKind::Ip, true, &["id.orig_h"]),
    field("src.port", FieldKind::Port, false, &["id.orig_p"]),
    field("dst.ip", FieldKind::Ip, true, &["id.resp_h"]),
    field("dst.port", FieldKind::Port, true, &["id.resp_p"]),
    field("orig_bytes", FieldKind::Integer, false, &[]),
    field("resp_bytes", FieldKind::Integer, false, &[]),
    field("duration_ms", FieldKind::Integer, false, &[]),
];

/// All queryable fields of an entity type.
pub fn fields(entity: EntityKind) -> &'static [FieldDescriptor] {
    match entity {
        EntityKind::Alert => ALERT_FIELDS,
        EntityKind::Log => LOG_FIELDS,
    }
}

/// Look up a field by canonical name or alias.
pub fn describe(entity: EntityKind, name: &str) -> Option<&'static FieldDescriptor> {
    fields(entity)
        .iter()
        .find(|f| f.name == name || f.aliases.contains(&name))
}
