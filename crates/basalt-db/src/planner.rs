use std::cmp::Ordering;
use std::collections::HashMap;

use basalt_core::Value;
use basalt_index::{FieldRange, Index, OrderedIndex};
use basalt_query::{Condition, Filter, FindOptions, GeoQuery, SortDirection};
use tracing::debug;

use crate::collection::Inner;
use crate::error::DbError;
use crate::plan::{AccessPath, Plan};

/// Choose an access path for a filter.
///
/// `$text` and geo nodes force their index class (erroring when absent);
/// otherwise candidates are ranked equality > range, then by whether the
/// index also serves the sort, then by coverage, with index-name order as
/// the deterministic tie break. When nothing restricts, scan.
pub(crate) fn plan(
    inner: &Inner,
    filter: &Filter,
    options: &FindOptions,
) -> Result<(Plan, Vec<String>), DbError> {
    if let Some(query) = filter.text_query() {
        let index = ready_text_index(inner)
            .ok_or_else(|| DbError::TextUnavailable(query.to_string()))?;
        return Ok((
            Plan {
                access: AccessPath::TextSearch {
                    index: index.to_string(),
                    query: query.to_string(),
                },
                covered: false,
                serves_sort: false,
            },
            vec![index.to_string()],
        ));
    }

    if let Some((field, query)) = filter.geo_query() {
        let index = ready_geo_index(inner, field, query)
            .ok_or_else(|| DbError::GeoUnavailable(field.to_string()))?;
        return Ok((
            Plan {
                access: AccessPath::Geo {
                    index: index.to_string(),
                    query: query.clone(),
                },
                covered: false,
                serves_sort: options.sort.is_empty(),
            },
            vec![index.to_string()],
        ));
    }

    let constraints = field_constraints(filter);

    // Equality on `_id` short-circuits to the primary index.
    if let Some(constraint) = constraints.get("_id") {
        if let Some(value) = &constraint.eq {
            let id = value.as_id_string();
            return Ok((
                Plan {
                    access: AccessPath::IdLookup { id },
                    covered: false,
                    serves_sort: false,
                },
                vec!["_id_".to_string()],
            ));
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for slot in inner.indexes.values() {
        if !slot.state.is_ready() {
            continue;
        }
        let Index::Ordered(idx) = &slot.index else {
            continue;
        };
        if let Some(candidate) = candidate_for(idx, filter, &constraints, options) {
            candidates.push(candidate);
        }
    }

    candidates.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then(b.serves_sort.cmp(&a.serves_sort))
            .then(b.covered.cmp(&a.covered))
            .then(a.name.cmp(&b.name))
    });
    let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();

    let plan = match candidates.into_iter().next() {
        Some(best) => {
            debug!(index = %best.name, tier = best.tier, "planner selected index");
            Plan {
                access: AccessPath::IndexScan {
                    index: best.name,
                    prefix: best.prefix,
                    range: best.range,
                    reverse: best.reverse,
                },
                covered: best.covered,
                serves_sort: best.serves_sort,
            }
        }
        None => Plan::scan(),
    };
    Ok((plan, names))
}

struct Candidate {
    name: String,
    /// 2 = equality restriction, 1 = range restriction.
    tier: u8,
    serves_sort: bool,
    covered: bool,
    prefix: Vec<Value>,
    range: Option<FieldRange>,
    reverse: bool,
}

#[derive(Default)]
struct FieldConstraint {
    eq: Option<Value>,
    range: FieldRange,
}

impl FieldConstraint {
    fn has_range(&self) -> bool {
        self.range.lower.is_some() || self.range.upper.is_some()
    }
}

/// Collect per-field restrictions from the top-level AND-conjuncts.
fn field_constraints(filter: &Filter) -> HashMap<String, FieldConstraint> {
    let mut out: HashMap<String, FieldConstraint> = HashMap::new();
    for conjunct in filter.conjuncts() {
        let Filter::Field { field, cond } = conjunct else {
            continue;
        };
        let entry = out.entry(field.clone()).or_default();
        match cond {
            Condition::Eq(v) => {
                if entry.eq.is_none() {
                    entry.eq = Some(v.clone());
                }
            }
            Condition::Gt(v) => tighten_lower(entry, v, false),
            Condition::Gte(v) => tighten_lower(entry, v, true),
            Condition::Lt(v) => tighten_upper(entry, v, false),
            Condition::Lte(v) => tighten_upper(entry, v, true),
            _ => {}
        }
    }
    out
}

fn tighten_lower(entry: &mut FieldConstraint, value: &Value, inclusive: bool) {
    let replace = match &entry.range.lower {
        None => true,
        Some((current, _)) => value.compare_typed(current) == Some(Ordering::Greater),
    };
    if replace {
        entry.range.lower = Some((value.clone(), inclusive));
    }
}

fn tighten_upper(entry: &mut FieldConstraint, value: &Value, inclusive: bool) {
    let replace = match &entry.range.upper {
        None => true,
        Some((current, _)) => value.compare_typed(current) == Some(Ordering::Less),
    };
    if replace {
        entry.range.upper = Some((value.clone(), inclusive));
    }
}

/// Build a candidate for one ordered index, or `None` when the filter
/// does not restrict its leading key.
fn candidate_for(
    idx: &OrderedIndex,
    filter: &Filter,
    constraints: &HashMap<String, FieldConstraint>,
    options: &FindOptions,
) -> Option<Candidate> {
    // A partial index is admissible only when the query filter implies
    // its stored predicate; otherwise it under-approximates.
    if let Some(partial) = idx.partial_filter() {
        if !implied_by(partial, &filter.conjuncts()) {
            return None;
        }
    }

    // Equality on a strict prefix of the field list, optionally followed
    // by a range on the next field.
    let mut prefix: Vec<Value> = Vec::new();
    for field in idx.fields() {
        match constraints.get(field).and_then(|c| c.eq.as_ref()) {
            Some(value) => prefix.push(value.clone()),
            None => break,
        }
    }
    let range = idx
        .fields()
        .get(prefix.len())
        .and_then(|next| constraints.get(next))
        .filter(|c| c.has_range())
        .map(|c| c.range.clone());

    let tier = if !prefix.is_empty() {
        2
    } else if range.is_some() {
        1
    } else {
        return None;
    };

    let serves_sort = options.sort.len() == 1 && options.sort[0].field == idx.fields()[0];
    let reverse = serves_sort && options.sort[0].direction == SortDirection::Desc;
    let covered = options
        .projection
        .as_ref()
        .and_then(|p| p.required_fields())
        .is_some_and(|fields| fields.iter().all(|f| idx.fields().contains(f)));

    Some(Candidate {
        name: idx.name().to_string(),
        tier,
        serves_sort,
        covered,
        prefix,
        range,
        reverse,
    })
}

/// Conservative syntactic implication: every conjunct of the partial
/// filter appears verbatim among the query's conjuncts.
fn implied_by(partial: &Filter, query_conjuncts: &[&Filter]) -> bool {
    match partial {
        Filter::And(children) => children.iter().all(|c| implied_by(c, query_conjuncts)),
        Filter::Field { field, cond } => query_conjuncts.iter().any(|qc| match qc {
            Filter::Field {
                field: q_field,
                cond: q_cond,
            } => q_field == field && condition_eq(cond, q_cond),
            _ => false,
        }),
        _ => false,
    }
}

fn condition_eq(a: &Condition, b: &Condition) -> bool {
    match (a, b) {
        (Condition::Eq(x), Condition::Eq(y))
        | (Condition::Ne(x), Condition::Ne(y))
        | (Condition::Gt(x), Condition::Gt(y))
        | (Condition::Gte(x), Condition::Gte(y))
        | (Condition::Lt(x), Condition::Lt(y))
        | (Condition::Lte(x), Condition::Lte(y)) => x == y,
        (Condition::Exists(x), Condition::Exists(y)) => x == y,
        (Condition::Type(x), Condition::Type(y)) => x == y,
        _ => false,
    }
}

fn ready_text_index(inner: &Inner) -> Option<&str> {
    inner
        .indexes
        .values()
        .filter(|slot| slot.state.is_ready())
        .find_map(|slot| match &slot.index {
            Index::Text(idx) => Some(idx.name()),
            _ => None,
        })
}

fn ready_geo_index<'a>(inner: &'a Inner, field: &str, query: &GeoQuery) -> Option<&'a str> {
    let want_spherical = match query {
        GeoQuery::Near { spherical, .. } => Some(*spherical),
        // Containment queries run on either class.
        GeoQuery::Within(_) | GeoQuery::Intersects(_) => None,
    };
    inner
        .indexes
        .values()
        .filter(|slot| slot.state.is_ready())
        .find_map(|slot| match &slot.index {
            Index::Geo2d(idx) if idx.field() == field && want_spherical != Some(true) => {
                Some(idx.name())
            }
            Index::Geo2dSphere(idx) if idx.field() == field && want_spherical != Some(false) => {
                Some(idx.name())
            }
            _ => None,
        })
}
