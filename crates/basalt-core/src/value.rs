use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::document::Document;
use crate::oid::ObjectId;

/// A dynamically typed field value.
///
/// Integers and floats are kept as distinct variants at the representation
/// level; comparison and equality coerce them to a common numeric domain.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    DateTime(DateTime<Utc>),
    Array(Vec<Value>),
    Document(Document),
}

/// The closed set of value type tags, as exposed by the `$type` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Double,
    String,
    ObjectId,
    Date,
    Array,
    Object,
}

impl ValueType {
    /// Parse a type name as accepted by `$type`.
    pub fn parse(name: &str) -> Option<ValueType> {
        Some(match name {
            "null" => ValueType::Null,
            "bool" => ValueType::Bool,
            "int" | "long" => ValueType::Int,
            "double" => ValueType::Double,
            "string" => ValueType::String,
            "objectId" => ValueType::ObjectId,
            "date" => ValueType::Date,
            "array" => ValueType::Array,
            "object" => ValueType::Object,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::ObjectId => "objectId",
            ValueType::Date => "date",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::ObjectId(_) => ValueType::ObjectId,
            Value::DateTime(_) => ValueType::Date,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Numeric view, coercing Int to the float domain.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Compare two values of a comparable type family.
    ///
    /// Returns `None` when the values cannot be meaningfully ordered
    /// (different families, or either side is null against a non-null).
    /// The predicate engine treats `None` as a non-match.
    pub fn compare_typed(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => {
                // Mixed Int/Double coerce to the float domain.
                let (x, y) = (a.as_f64().unwrap(), b.as_f64().unwrap());
                Some(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::ObjectId(a), Value::ObjectId(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return Some(ord);
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Value::Document(a), Value::Document(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let key_ord = ka.cmp(kb);
                    if key_ord != Ordering::Equal {
                        return Some(key_ord);
                    }
                    let val_ord = va.compare(vb);
                    if val_ord != Ordering::Equal {
                        return Some(val_ord);
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total comparison used for sorting.
    ///
    /// Null orders below any present value. Cross-family pairs (e.g.
    /// string vs number) have no defined order and compare as equal so a
    /// stable sort preserves their incoming order.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self.compare_typed(other).unwrap_or(Ordering::Equal),
        }
    }

    /// The string form a value takes when used as a document identity:
    /// strings pass through, object ids render as hex, everything else
    /// falls back to the canonical rendering.
    pub fn as_id_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::ObjectId(oid) => oid.to_hex(),
            other => other.canonical(),
        }
    }

    /// Render with map keys sorted, for cache fingerprints.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Double(d) => out.push_str(&format!("{d:?}")),
            Value::String(s) => write_escaped(out, s),
            Value::ObjectId(oid) => {
                out.push_str("oid:");
                out.push_str(&oid.to_hex());
            }
            Value::DateTime(dt) => {
                out.push_str(&dt.to_rfc3339_opts(SecondsFormat::Nanos, true));
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Value::Document(doc) => {
                let mut keys: Vec<&str> = doc.keys().collect();
                keys.sort_unstable();
                out.push('{');
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_escaped(out, key);
                    out.push(':');
                    doc.get(key).unwrap().write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Equality coerces Int and Double to a common numeric domain; everything
/// else is strict per-variant equality.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => {
                a.as_f64().unwrap() == b.as_f64().unwrap()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
