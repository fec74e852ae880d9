use std::cmp::Ordering;

use basalt_core::{Document, Utc, Value};

use crate::update::{BitKind, DateKind, PopFrom, UpdateOp, UpdateSpec};

impl UpdateSpec {
    /// Apply every operator to the document in place.
    ///
    /// Total — a wrong-typed target degrades to a no-op for that operator.
    /// Returns whether anything changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for fu in &self.ops {
            changed |= apply_op(doc, &fu.field, &fu.op);
        }
        changed
    }
}

fn apply_op(doc: &mut Document, field: &str, op: &UpdateOp) -> bool {
    match op {
        UpdateOp::Set(value) => op_set(doc, field, value),
        UpdateOp::Unset => doc.remove(field).is_some(),
        UpdateOp::Inc(amount) => op_inc(doc, field, amount),
        UpdateOp::Mul(factor) => op_mul(doc, field, factor),
        UpdateOp::Min(candidate) => op_min_max(doc, field, candidate, Ordering::Less),
        UpdateOp::Max(candidate) => op_min_max(doc, field, candidate, Ordering::Greater),
        UpdateOp::Push(values) => op_push(doc, field, values, false),
        UpdateOp::AddToSet(values) => op_push(doc, field, values, true),
        UpdateOp::Pull(value) => op_pull(doc, field, std::slice::from_ref(value)),
        UpdateOp::PullAll(values) => op_pull(doc, field, values),
        UpdateOp::Pop(from) => op_pop(doc, field, *from),
        UpdateOp::Rename(new_name) => op_rename(doc, field, new_name),
        UpdateOp::CurrentDate(kind) => op_current_date(doc, field, *kind),
        UpdateOp::Bit(kind, operand) => op_bit(doc, field, *kind, *operand),
    }
}

fn op_set(doc: &mut Document, field: &str, value: &Value) -> bool {
    if doc.get(field) == Some(value) {
        return false;
    }
    doc.set(field, value.clone());
    true
}

/// Add two numeric values. Int + Int stays Int (wrapping); any Double
/// pushes the result into the float domain.
fn numeric_add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(*y)),
        _ => Value::Double(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
    }
}

fn numeric_mul(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_mul(*y)),
        _ => Value::Double(a.as_f64().unwrap_or(0.0) * b.as_f64().unwrap_or(0.0)),
    }
}

fn op_inc(doc: &mut Document, field: &str, amount: &Value) -> bool {
    match doc.get(field) {
        None => {
            doc.set(field, amount.clone());
            true
        }
        Some(current) if current.is_number() => {
            let next = numeric_add(current, amount);
            doc.set(field, next);
            true
        }
        Some(_) => false,
    }
}

fn op_mul(doc: &mut Document, field: &str, factor: &Value) -> bool {
    match doc.get(field) {
        None => {
            // Missing field multiplies from zero, keeping the operand's
            // numeric domain.
            let zero = match factor {
                Value::Int(_) => Value::Int(0),
                _ => Value::Double(0.0),
            };
            doc.set(field, zero);
            true
        }
        Some(current) if current.is_number() => {
            let next = numeric_mul(current, factor);
            let changed = doc.get(field) != Some(&next);
            doc.set(field, next);
            changed
        }
        Some(_) => false,
    }
}

fn op_min_max(doc: &mut Document, field: &str, candidate: &Value, wanted: Ordering) -> bool {
    match doc.get(field) {
        None => {
            doc.set(field, candidate.clone());
            true
        }
        Some(current) => match candidate.compare_typed(current) {
            Some(ord) if ord == wanted => {
                doc.set(field, candidate.clone());
                true
            }
            _ => false,
        },
    }
}

fn op_push(doc: &mut Document, field: &str, values: &[Value], set_semantics: bool) -> bool {
    if !doc.contains_key(field) {
        doc.set(field, Value::Array(Vec::new()));
    }
    let Some(arr) = doc.get_mut(field).and_then(Value::as_array_mut) else {
        return false;
    };
    let mut changed = false;
    for value in values {
        if set_semantics && arr.contains(value) {
            continue;
        }
        arr.push(value.clone());
        changed = true;
    }
    changed
}

fn op_pull(doc: &mut Document, field: &str, values: &[Value]) -> bool {
    let Some(arr) = doc.get_mut(field).and_then(Value::as_array_mut) else {
        return false;
    };
    let before = arr.len();
    arr.retain(|elem| !values.contains(elem));
    arr.len() != before
}

fn op_pop(doc: &mut Document, field: &str, from: PopFrom) -> bool {
    let Some(arr) = doc.get_mut(field).and_then(Value::as_array_mut) else {
        return false;
    };
    if arr.is_empty() {
        return false;
    }
    match from {
        PopFrom::First => {
            arr.remove(0);
        }
        PopFrom::Last => {
            arr.pop();
        }
    }
    true
}

fn op_rename(doc: &mut Document, field: &str, new_name: &str) -> bool {
    match doc.remove(field) {
        Some(value) => {
            doc.set(new_name, value);
            true
        }
        None => false,
    }
}

fn op_current_date(doc: &mut Document, field: &str, kind: DateKind) -> bool {
    let now = Utc::now();
    let value = match kind {
        DateKind::Date => Value::DateTime(now),
        DateKind::TimestampSeconds => Value::Int(now.timestamp()),
    };
    doc.set(field, value);
    true
}

fn op_bit(doc: &mut Document, field: &str, kind: BitKind, operand: i64) -> bool {
    let current = match doc.get(field) {
        None => 0,
        Some(Value::Int(i)) => *i,
        Some(_) => return false,
    };
    let next = match kind {
        BitKind::And => current & operand,
        BitKind::Or => current | operand,
        BitKind::Xor => current ^ operand,
    };
    let changed = doc.get(field) != Some(&Value::Int(next));
    doc.set(field, Value::Int(next));
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::parse_update;
    use basalt_core::doc;

    fn apply(doc: &mut Document, update: Document) -> bool {
        parse_update(&update).unwrap().apply(doc)
    }

    #[test]
    fn set_is_idempotent() {
        let mut d = doc! { "a": 1 };
        assert!(apply(&mut d, doc! { "$set": { "a": 2, "b": "x" } }));
        assert_eq!(d, doc! { "a": 2, "b": "x" });
        assert!(!apply(&mut d, doc! { "$set": { "a": 2, "b": "x" } }));
    }

    #[test]
    fn inc_accumulates() {
        let mut d = doc! { "n": 10 };
        apply(&mut d, doc! { "$inc": { "n": 5, "fresh": 3 } });
        assert_eq!(d.get_i64("n"), Some(15));
        assert_eq!(d.get_i64("fresh"), Some(3));
        apply(&mut d, doc! { "$inc": { "n": -20 } });
        assert_eq!(d.get_i64("n"), Some(-5));
    }

    #[test]
    fn inc_mixed_domain_goes_float() {
        let mut d = doc! { "n": 1 };
        apply(&mut d, doc! { "$inc": { "n": 0.5 } });
        assert_eq!(d.get("n"), Some(&Value::Double(1.5)));
    }

    #[test]
    fn inc_on_non_numeric_is_noop() {
        let mut d = doc! { "n": "text" };
        assert!(!apply(&mut d, doc! { "$inc": { "n": 1 } }));
        assert_eq!(d.get_str("n"), Some("text"));
    }

    #[test]
    fn mul_missing_field_becomes_zero() {
        let mut d = doc! {};
        apply(&mut d, doc! { "$mul": { "n": 7 } });
        assert_eq!(d.get_i64("n"), Some(0));
    }

    #[test]
    fn min_max() {
        let mut d = doc! { "lo": 10, "hi": 10 };
        assert!(apply(&mut d, doc! { "$min": { "lo": 3 } }));
        assert!(!apply(&mut d, doc! { "$min": { "lo": 5 } }));
        assert!(apply(&mut d, doc! { "$max": { "hi": 20 } }));
        assert!(!apply(&mut d, doc! { "$max": { "hi": 20 } }));
        assert_eq!(d.get_i64("lo"), Some(3));
        assert_eq!(d.get_i64("hi"), Some(20));
        // Missing field assigns unconditionally.
        assert!(apply(&mut d, doc! { "$min": { "other": 99 } }));
        assert_eq!(d.get_i64("other"), Some(99));
    }

    #[test]
    fn push_creates_and_appends() {
        let mut d = doc! {};
        apply(&mut d, doc! { "$push": { "tags": "a" } });
        apply(&mut d, doc! { "$push": { "tags": { "$each": ["b", "c"] } } });
        assert_eq!(d.get("tags"), Some(&Value::Array(vec![
            Value::String("a".into()),
            Value::String("b".into()),
            Value::String("c".into()),
        ])));
    }

    #[test]
    fn add_to_set_deduplicates() {
        let mut d = doc! { "tags": ["a"] };
        assert!(apply(&mut d, doc! { "$addToSet": { "tags": { "$each": ["a", "b"] } } }));
        assert!(!apply(&mut d, doc! { "$addToSet": { "tags": "b" } }));
        assert_eq!(d.get_array("tags").unwrap().len(), 2);
    }

    #[test]
    fn pull_and_pull_all() {
        let mut d = doc! { "n": [1, 2, 1, 3, 4] };
        assert!(apply(&mut d, doc! { "$pull": { "n": 1 } }));
        assert_eq!(d.get("n"), Some(&Value::Array(vec![
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
        ])));
        assert!(apply(&mut d, doc! { "$pullAll": { "n": [2, 4] } }));
        assert_eq!(d.get("n"), Some(&Value::Array(vec![Value::Int(3)])));
        assert!(!apply(&mut d, doc! { "$pull": { "n": 9 } }));
    }

    #[test]
    fn pop_both_ends() {
        let mut d = doc! { "n": [1, 2, 3] };
        apply(&mut d, doc! { "$pop": { "n": -1 } });
        apply(&mut d, doc! { "$pop": { "n": 1 } });
        assert_eq!(d.get("n"), Some(&Value::Array(vec![Value::Int(2)])));
    }

    #[test]
    fn rename_overwrites_target() {
        let mut d = doc! { "old": 1, "new": 2 };
        assert!(apply(&mut d, doc! { "$rename": { "old": "new" } }));
        assert!(!d.contains_key("old"));
        assert_eq!(d.get_i64("new"), Some(1));
        // Missing source is a no-op.
        assert!(!apply(&mut d, doc! { "$rename": { "gone": "x" } }));
    }

    #[test]
    fn current_date_kinds() {
        let mut d = doc! {};
        apply(&mut d, doc! {
            "$currentDate": { "at": true, "secs": { "$type": "timestamp" } }
        });
        assert!(matches!(d.get("at"), Some(Value::DateTime(_))));
        let secs = d.get_i64("secs").unwrap();
        assert!((secs - Utc::now().timestamp()).abs() <= 2);
    }

    #[test]
    fn bit_operations() {
        let mut d = doc! { "flags": 0b1100 };
        apply(&mut d, doc! { "$bit": { "flags": { "and": 0b1010 } } });
        assert_eq!(d.get_i64("flags"), Some(0b1000));
        apply(&mut d, doc! { "$bit": { "flags": { "or": 0b0001 } } });
        assert_eq!(d.get_i64("flags"), Some(0b1001));
        apply(&mut d, doc! { "$bit": { "flags": { "xor": 0b1001 } } });
        assert_eq!(d.get_i64("flags"), Some(0));
        // Missing field initializes to 0 before the operation.
        apply(&mut d, doc! { "$bit": { "fresh": { "or": 5 } } });
        assert_eq!(d.get_i64("fresh"), Some(5));
    }

    #[test]
    fn unset_removes() {
        let mut d = doc! { "a": 1, "b": 2 };
        assert!(apply(&mut d, doc! { "$unset": { "a": "" } }));
        assert_eq!(d, doc! { "b": 2 });
        assert!(!apply(&mut d, doc! { "$unset": { "a": "" } }));
    }

    #[test]
    fn bare_field_assignment() {
        let mut d = doc! { "status": "old" };
        apply(&mut d, doc! { "status": "new", "extra": 1 });
        assert_eq!(d, doc! { "status": "new", "extra": 1 });
    }
}
