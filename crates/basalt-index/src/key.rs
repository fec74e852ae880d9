use std::cmp::Ordering;

use basalt_core::{Document, Value};

/// A value wrapped with a total order suitable for B-tree keys.
///
/// Unlike the sort-path comparison (where cross-family pairs are
/// order-equal to keep stable sorts stable), index keys bracket by type
/// so that mixed-type keys coexist deterministically in one tree:
/// null < numbers < strings < object ids < booleans < timestamps <
/// arrays < documents. Int and Double still share the number bracket.
#[derive(Debug, Clone)]
pub struct KeyValue(pub Value);

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Int(_) | Value::Double(_) => 1,
        Value::String(_) => 2,
        Value::ObjectId(_) => 3,
        Value::Bool(_) => 4,
        Value::DateTime(_) => 5,
        Value::Array(_) => 6,
        Value::Document(_) => 7,
    }
}

fn total_cmp(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (x, y) if x.is_number() && y.is_number() => {
            x.as_f64().unwrap().total_cmp(&y.as_f64().unwrap())
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::ObjectId(x), Value::ObjectId(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let ord = total_cmp(xi, yi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Document(x), Value::Document(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let key_ord = kx.cmp(ky);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let val_ord = total_cmp(vx, vy);
                if val_ord != Ordering::Equal {
                    return val_ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => unreachable!("type ranks matched"),
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        total_cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        total_cmp(&self.0, &other.0)
    }
}

/// A composite index key: one component per indexed field, compared
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub Vec<KeyValue>);

impl IndexKey {
    pub fn from_values(values: Vec<Value>) -> IndexKey {
        IndexKey(values.into_iter().map(KeyValue).collect())
    }

    pub fn components(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &[KeyValue]) -> bool {
        self.0.len() >= prefix.len() && self.0[..prefix.len()] == *prefix
    }

    /// Extract the key for `fields` from a document. `None` when any
    /// field is missing — the document then contributes nothing to the
    /// index. An explicit null is a real key component.
    pub fn extract(doc: &Document, fields: &[String]) -> Option<IndexKey> {
        let mut components = Vec::with_capacity(fields.len());
        for field in fields {
            components.push(KeyValue(doc.get(field)?.clone()));
        }
        Some(IndexKey(components))
    }

    /// Render for duplicate-key error messages.
    pub fn display(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|kv| kv.0.canonical()).collect();
        parts.join(", ")
    }
}
