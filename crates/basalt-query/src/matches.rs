use std::cmp::Ordering;

use basalt_core::{Document, Value};

use crate::filter::{Condition, ElemFilter, Filter};

/// Evaluate a filter against a document.
///
/// Total — never fails. Type-incompatible comparisons and comparisons
/// against missing fields are non-matches; `$exists` is the one operator
/// that can match an absent field.
///
/// `Text` and `Geo` nodes evaluate as satisfied here: the planner only
/// admits them through the matching index class, which has already
/// restricted the candidate set.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(doc, c)),
        Filter::Or(children) => children.iter().any(|c| matches(doc, c)),
        Filter::Nor(children) => !children.iter().any(|c| matches(doc, c)),
        Filter::Field { field, cond } => condition_matches(doc.get(field), cond),
        Filter::Text(_) | Filter::Geo { .. } => true,
    }
}

/// Evaluate one condition against an optional field value.
pub fn condition_matches(value: Option<&Value>, cond: &Condition) -> bool {
    match cond {
        Condition::Exists(wanted) => value.is_some() == *wanted,
        _ => match value {
            Some(v) => present_matches(v, cond),
            None => false,
        },
    }
}

fn present_matches(value: &Value, cond: &Condition) -> bool {
    match cond {
        Condition::Eq(rhs) => value == rhs,
        Condition::Ne(rhs) => value != rhs,
        Condition::Gt(rhs) => compare_is(value, rhs, |ord| ord == Ordering::Greater),
        Condition::Gte(rhs) => compare_is(value, rhs, |ord| ord != Ordering::Less),
        Condition::Lt(rhs) => compare_is(value, rhs, |ord| ord == Ordering::Less),
        Condition::Lte(rhs) => compare_is(value, rhs, |ord| ord != Ordering::Greater),
        Condition::In(set) => set.iter().any(|candidate| value == candidate),
        Condition::Nin(set) => !set.iter().any(|candidate| value == candidate),
        Condition::Exists(_) => unreachable!("handled in condition_matches"),
        Condition::Type(ty) => value.value_type() == *ty,
        Condition::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        Condition::Size(n) => value.as_array().is_some_and(|a| a.len() == *n),
        Condition::All(wanted) => value
            .as_array()
            .is_some_and(|a| wanted.iter().all(|w| a.contains(w))),
        Condition::ElemMatch(elem) => value
            .as_array()
            .is_some_and(|a| a.iter().any(|e| elem_matches(e, elem))),
    }
}

fn elem_matches(element: &Value, elem: &ElemFilter) -> bool {
    match elem {
        ElemFilter::Document(filter) => match element {
            Value::Document(doc) => matches(doc, filter),
            _ => false,
        },
        ElemFilter::Conditions(conds) => conds
            .iter()
            .all(|cond| condition_matches(Some(element), cond)),
    }
}

fn compare_is(lhs: &Value, rhs: &Value, pred: fn(Ordering) -> bool) -> bool {
    match lhs.compare_typed(rhs) {
        Some(ord) => pred(ord),
        None => false,
    }
}
