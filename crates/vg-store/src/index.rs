//! # Secondary Index
//!
//! One ordered map per indexed field, from normalized value to the
//! positions of the records carrying it. Positions are offsets into the
//! append-only record vector and therefore never change once written.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::ops::{Bound, Range};

use vg_core::{fields, EntityKind, FieldValue, Queryable};

/// Normalized value as stored in the index.
///
/// Ports are folded into `Int` so that a port and an integer literal with
/// the same numeric value land on the same key. Addresses are canonical, so
/// `::ffff:10.0.0.1` and `10.0.0.1` share a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Int(i64),
    Ip(IpAddr),
    Str(String),
}

impl From<FieldValue<'_>> for IndexKey {
    fn from(value: FieldValue<'_>) -> Self {
        match value {
            FieldValue::Str(s) => Self::Str(s.to_string()),
            FieldValue::Int(i) => Self::Int(i),
            FieldValue::Ip(ip) => Self::Ip(ip.to_canonical()),
            FieldValue::Port(p) => Self::Int(i64::from(p)),
        }
    }
}

/// Which index entries a lookup selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBound {
    Eq(IndexKey),
    /// Strictly greater than.
    Above(IndexKey),
    /// Strictly less than.
    Below(IndexKey),
}

/// A store-level filter fragment on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLookup {
    pub field: String,
    pub bound: IndexBound,
}

impl IndexLookup {
    pub fn new(field: impl Into<String>, bound: IndexBound) -> Self {
        Self {
            field: field.into(),
            bound,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FieldIndex {
    maps: HashMap<&'static str, BTreeMap<IndexKey, Vec<usize>>>,
}

impl FieldIndex {
    pub(crate) fn for_entity(entity: EntityKind) -> Self {
        let maps = fields::fields(entity)
            .iter()
            .filter(|d| d.indexed)
            .map(|d| (d.name, BTreeMap::new()))
            .collect();
        Self { maps }
    }

    pub(crate) fn insert<R: Queryable>(&mut self, position: usize, record: &R) {
        for (name, map) in self.maps.iter_mut() {
            if let Some(value) = record.field(name) {
                map.entry(IndexKey::from(value))
                    .or_default()
                    .push(position);
            }
        }
    }

    /// Positions inside `window` selected by one lookup, ascending.
    ///
    /// `None` means the lookup cannot narrow anything: the field has no
    /// index, or a range lookup spans more keys than `window` has positions,
    /// in which case walking the window directly is cheaper.
    pub(crate) fn positions(&self, lookup: &IndexLookup, window: Range<usize>) -> Option<Vec<usize>> {
        let map = self.maps.get(lookup.field.as_str())?;
        if window.is_empty() {
            return Some(Vec::new());
        }
        let range = match &lookup.bound {
            IndexBound::Eq(key) => {
                return Some(
                    map.get(key)
                        .map(|list| clip(list, &window).to_vec())
                        .unwrap_or_default(),
                );
            }
            IndexBound::Above(key) => map.range((Bound::Excluded(key), Bound::Unbounded)),
            IndexBound::Below(key) => map.range((Bound::Unbounded, Bound::Excluded(key))),
        };

        let mut out = Vec::new();
        for (visited, (_, list)) in range.enumerate() {
            if visited >= window.len() {
                return None;
            }
            out.extend_from_slice(clip(list, &window));
        }
        out.sort_unstable();
        Some(out)
    }

    /// Intersect all usable lookups within `window`. `None` means no lookup
    /// applied.
    pub(crate) fn candidates(&self, lookups: &[IndexLookup], window: Range<usize>) -> Option<Vec<usize>> {
        let mut acc: Option<Vec<usize>> = None;
        for lookup in lookups {
            let Some(positions) = self.positions(lookup, window.clone()) else {
                continue;
            };
            acc = Some(match acc {
                None => positions,
                Some(prev) => intersect_sorted(&prev, &positions),
            });
        }
        acc
    }
}

/// The part of an ascending posting list that falls inside `window`.
fn clip<'a>(list: &'a [usize], window: &Range<usize>) -> &'a [usize] {
    let start = list.partition_point(|&p| p < window.start);
    let end = list.partition_point(|&p| p < window.end);
    &list[start..end.max(start)]
}

fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
