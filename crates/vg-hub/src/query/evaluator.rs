//! # Predicate Evaluator
//!
//! [`matches`] is the single source of truth for result membership. The
//! store-level translation in [`pushdown`] only narrows the candidate set
//! the evaluator then runs over, so it can never change which records match.

use std::cmp::Ordering;

use vg_core::{describe, EntityKind, FieldKind, FieldValue, Operator, Queryable};
use vg_store::{IndexBound, IndexKey, IndexLookup};

use super::{Comparison, Literal, Predicate};

/// True iff every clause holds. A clause on a field the record does not
/// carry is false, whatever its operator.
pub fn matches<R: Queryable>(record: &R, predicate: &Predicate) -> bool {
    predicate.clauses.iter().all(|c| holds(record, c))
}

fn holds<R: Queryable>(record: &R, clause: &Comparison) -> bool {
    let Some(value) = record.field(clause.field) else {
        return false;
    };

    match (clause.kind, &clause.value) {
        (FieldKind::String, Literal::Str(expected)) => {
            let FieldValue::Str(actual) = value else {
                return false;
            };
            match clause.op {
                Operator::Eq => actual == expected.as_str(),
                Operator::Ne => actual != expected.as_str(),
                Operator::Contains => actual.contains(expected.as_str()),
                Operator::Gt => actual > expected.as_str(),
                Operator::Lt => actual < expected.as_str(),
            }
        }
        (kind, Literal::Int(expected)) if kind.is_numeric() => {
            let actual = match value {
                FieldValue::Int(n) => n,
                FieldValue::Port(p) => i64::from(p),
                _ => return false,
            };
            ordered(actual.cmp(expected), clause.op)
        }
        (FieldKind::Ip, Literal::Ip(expected)) => {
            let FieldValue::Ip(actual) = value else {
                return false;
            };
            // IPv4-mapped IPv6 compares equal to the plain IPv4 address
            let same = actual.to_canonical() == expected.to_canonical();
            match clause.op {
                Operator::Eq => same,
                Operator::Ne => !same,
                _ => false,
            }
        }
        _ => false,
    }
}

fn ordered(ord: Ordering, op: Operator) -> bool {
    match op {
        Operator::Eq => ord == Ordering::Equal,
        Operator::Ne => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Lt => ord == Ordering::Less,
        Operator::Contains => false,
    }
}

/// Index lookups equivalent to a subset of the predicate's clauses.
///
/// Only `=`, `>` and `<` on indexed fields translate. Everything else is
/// left to [`matches`], which the store applies to every candidate.
pub fn pushdown(predicate: &Predicate, entity: EntityKind) -> Vec<IndexLookup> {
    predicate
        .clauses
        .iter()
        .filter(|c| describe(entity, c.field).is_some_and(|d| d.indexed))
        .filter_map(|c| {
            let key = match &c.value {
                Literal::Str(s) => IndexKey::Str(s.clone()),
                Literal::Int(i) => IndexKey::Int(*i),
                Literal::Ip(ip) => IndexKey::Ip(ip.to_canonical()),
            };
            let bound = match c.op {
                Operator::Eq => IndexBound::Eq(key),
                Operator::Gt => IndexBound::Above(key),
                Operator::Lt => IndexBound::Below(key),
                Operator::Ne | Operator::Contains => return None,
            };
            Some(IndexLookup::new(c.field, bound))
        })
        .collect()
}
