use basalt_core::{Document, Value, ValueType};
use regex::Regex;

use crate::error::QueryError;
use crate::filter::{Condition, ElemFilter, Filter, GeoQuery};

/// Parse a filter document into a [`Filter`] tree.
///
/// Follows MongoDB query semantics:
/// - Top-level document is an implicit AND of all entries
/// - `{ "field": value }` is implicit `$eq`
/// - `{ "field": { "$gt": v } }` uses operator sub-documents
/// - `{ "$or": [...] }` / `{ "$and": [...] }` / `{ "$nor": [...] }`
/// - `{ "field": { "$regex": "pattern", "$options": "i" } }` for regex
/// - `{ "$text": { "$search": "..." } }` as a planner hint
///
/// The empty document parses to a filter that matches everything.
pub fn parse_filter(doc: &Document) -> Result<Filter, QueryError> {
    let mut children = Vec::new();

    for (key, value) in doc.iter() {
        match key {
            "$and" => children.push(parse_logical_array(value, Filter::And)?),
            "$or" => children.push(parse_disjunction(value, Filter::Or)?),
            "$nor" => children.push(parse_disjunction(value, Filter::Nor)?),
            "$text" => children.push(parse_text(value)?),
            k if k.starts_with('$') => {
                return Err(QueryError::InvalidFilter(format!(
                    "unknown top-level operator: {k}"
                )));
            }
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    if children.len() == 1 {
        Ok(children.pop().unwrap())
    } else {
        Ok(Filter::And(children))
    }
}

/// Parse a `$and` / `$or` / `$nor` array into a logical node.
///
/// An explicit `$and` is just the implicit top-level conjunction spelled
/// out, so its children may carry `$text`/geo nodes — `conjuncts()`
/// flattens them back to the top level for the planner.
fn parse_logical_array(
    value: &Value,
    make: fn(Vec<Filter>) -> Filter,
) -> Result<Filter, QueryError> {
    let arr = value.as_array().ok_or_else(|| {
        QueryError::InvalidFilter("logical operator value must be an array".into())
    })?;

    let mut children = Vec::new();
    for elem in arr {
        match elem {
            Value::Document(sub) => children.push(parse_filter(sub)?),
            _ => {
                return Err(QueryError::InvalidFilter(
                    "logical operator array elements must be documents".into(),
                ));
            }
        }
    }

    if children.is_empty() {
        return Err(QueryError::InvalidFilter(
            "logical operator array must not be empty".into(),
        ));
    }

    Ok(make(children))
}

/// Parse a `$or` / `$nor` array. `$text` and geo operators resolve
/// through an index; buried in a disjunction they could not restrict
/// anything, so they are rejected here.
fn parse_disjunction(
    value: &Value,
    make: fn(Vec<Filter>) -> Filter,
) -> Result<Filter, QueryError> {
    let parsed = parse_logical_array(value, make)?;
    let (Filter::Or(children) | Filter::Nor(children)) = &parsed else {
        return Ok(parsed);
    };
    if children.iter().any(Filter::has_index_dependent_node) {
        return Err(QueryError::InvalidFilter(
            "$text and geo operators cannot appear inside $or/$nor".into(),
        ));
    }
    Ok(parsed)
}

/// Parse `{ "$text": { "$search": "..." } }`.
fn parse_text(value: &Value) -> Result<Filter, QueryError> {
    let doc = value
        .as_document()
        .ok_or_else(|| QueryError::InvalidFilter("$text value must be a document".into()))?;
    let query = doc
        .get_str("$search")
        .ok_or_else(|| QueryError::InvalidFilter("$text requires a $search string".into()))?;
    Ok(Filter::Text(query.to_string()))
}

/// Parse a field condition: implicit `$eq`, or an operator sub-document.
fn parse_field_condition(field: &str, value: &Value) -> Result<Filter, QueryError> {
    if let Value::Document(sub) = value {
        if sub.keys().next().is_some_and(|k| k.starts_with('$')) {
            return parse_operator_doc(field, sub);
        }
    }

    Ok(Filter::Field {
        field: field.to_string(),
        cond: Condition::Eq(value.clone()),
    })
}

/// Parse an operator sub-document like `{ "$gt": 21, "$lte": 100 }`.
fn parse_operator_doc(field: &str, doc: &Document) -> Result<Filter, QueryError> {
    // $regex consumes its $options sibling; geo operators consume
    // $maxDistance. Both take over the whole sub-document.
    if doc.contains_key("$regex") {
        let cond = parse_regex(doc)?;
        return Ok(Filter::Field {
            field: field.to_string(),
            cond,
        });
    }
    for geo_key in ["$near", "$nearSphere", "$geoWithin", "$geoIntersects"] {
        if doc.contains_key(geo_key) {
            let query = parse_geo(doc)?;
            return Ok(Filter::Geo {
                field: field.to_string(),
                query,
            });
        }
    }

    let mut conditions = Vec::new();
    for (op_key, op_value) in doc.iter() {
        conditions.push(parse_condition(op_key, op_value)?);
    }

    if conditions.is_empty() {
        return Err(QueryError::InvalidFilter("empty operator document".into()));
    }

    let mut filters: Vec<Filter> = conditions
        .into_iter()
        .map(|cond| Filter::Field {
            field: field.to_string(),
            cond,
        })
        .collect();

    if filters.len() == 1 {
        Ok(filters.pop().unwrap())
    } else {
        Ok(Filter::And(filters))
    }
}

/// Parse one `$op: value` pair into a [`Condition`].
fn parse_condition(op_key: &str, op_value: &Value) -> Result<Condition, QueryError> {
    Ok(match op_key {
        "$eq" => Condition::Eq(op_value.clone()),
        "$ne" => Condition::Ne(op_value.clone()),
        "$gt" => Condition::Gt(op_value.clone()),
        "$gte" => Condition::Gte(op_value.clone()),
        "$lt" => Condition::Lt(op_value.clone()),
        "$lte" => Condition::Lte(op_value.clone()),
        "$in" => Condition::In(value_list(op_key, op_value)?),
        "$nin" => Condition::Nin(value_list(op_key, op_value)?),
        "$all" => Condition::All(value_list(op_key, op_value)?),
        "$exists" => match op_value {
            Value::Bool(b) => Condition::Exists(*b),
            _ => {
                return Err(QueryError::InvalidFilter(
                    "$exists value must be a boolean".into(),
                ));
            }
        },
        "$type" => {
            let name = op_value.as_str().ok_or_else(|| {
                QueryError::InvalidFilter("$type value must be a string".into())
            })?;
            let ty = ValueType::parse(name).ok_or_else(|| {
                QueryError::InvalidFilter(format!("unknown type name: {name}"))
            })?;
            Condition::Type(ty)
        }
        "$size" => match op_value {
            Value::Int(n) if *n >= 0 => Condition::Size(*n as usize),
            _ => {
                return Err(QueryError::InvalidFilter(
                    "$size value must be a non-negative integer".into(),
                ));
            }
        },
        "$elemMatch" => {
            let sub = op_value.as_document().ok_or_else(|| {
                QueryError::InvalidFilter("$elemMatch value must be a document".into())
            })?;
            Condition::ElemMatch(parse_elem_match(sub)?)
        }
        "$options" => {
            return Err(QueryError::InvalidFilter("$options without $regex".into()));
        }
        k => {
            return Err(QueryError::InvalidFilter(format!(
                "unknown field operator: {k}"
            )));
        }
    })
}

fn value_list(op: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
    value
        .as_array()
        .map(<[Value]>::to_vec)
        .ok_or_else(|| QueryError::InvalidFilter(format!("{op} value must be an array")))
}

/// `$elemMatch` body: operator-only spec for scalar elements, or a full
/// nested filter for document elements.
fn parse_elem_match(doc: &Document) -> Result<ElemFilter, QueryError> {
    let all_operators = !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'));
    if all_operators {
        let mut conditions = Vec::new();
        for (op_key, op_value) in doc.iter() {
            conditions.push(parse_condition(op_key, op_value)?);
        }
        Ok(ElemFilter::Conditions(conditions))
    } else {
        let nested = parse_filter(doc)?;
        if nested.has_index_dependent_node() {
            return Err(QueryError::InvalidFilter(
                "$text and geo operators cannot appear inside $elemMatch".into(),
            ));
        }
        Ok(ElemFilter::Document(Box::new(nested)))
    }
}

/// Parse a `$regex` + optional `$options` sub-document.
fn parse_regex(doc: &Document) -> Result<Condition, QueryError> {
    let mut pattern: Option<&str> = None;
    let mut options: Option<&str> = None;

    for (key, value) in doc.iter() {
        match key {
            "$regex" => match value {
                Value::String(s) => pattern = Some(s),
                _ => {
                    return Err(QueryError::InvalidFilter(
                        "$regex value must be a string".into(),
                    ));
                }
            },
            "$options" => match value {
                Value::String(s) => options = Some(s),
                _ => {
                    return Err(QueryError::InvalidFilter(
                        "$options value must be a string".into(),
                    ));
                }
            },
            k => {
                return Err(QueryError::InvalidFilter(format!(
                    "unexpected key alongside $regex: {k}"
                )));
            }
        }
    }

    let pat = pattern.ok_or_else(|| QueryError::InvalidFilter("missing $regex pattern".into()))?;

    // Build final pattern with inline flags.
    let full_pattern = if let Some(opts) = options {
        let mut prefix = String::with_capacity(4 + opts.len() + pat.len());
        prefix.push_str("(?");
        for ch in opts.chars() {
            match ch {
                'i' | 's' | 'm' | 'x' => prefix.push(ch),
                c => {
                    return Err(QueryError::InvalidFilter(format!(
                        "unknown regex option: {c}"
                    )));
                }
            }
        }
        prefix.push(')');
        prefix.push_str(pat);
        prefix
    } else {
        pat.to_string()
    };

    let re = Regex::new(&full_pattern)
        .map_err(|e| QueryError::InvalidFilter(format!("invalid regex pattern: {e}")))?;

    Ok(Condition::Regex(re))
}

/// Parse a geo operator sub-document.
///
/// Supported shapes:
/// - `{ "$near": [x, y], "$maxDistance": d }`
/// - `{ "$nearSphere": [lng, lat], "$maxDistance": meters }`
/// - `{ "$geoWithin": { "$polygon": [[x, y], ...] } }`
/// - `{ "$geoIntersects": { "$polygon": [[x, y], ...] } }`
fn parse_geo(doc: &Document) -> Result<GeoQuery, QueryError> {
    let mut near: Option<(f64, f64, bool)> = None;
    let mut max_distance: Option<f64> = None;
    let mut within: Option<Vec<(f64, f64)>> = None;
    let mut intersects: Option<Vec<(f64, f64)>> = None;

    for (key, value) in doc.iter() {
        match key {
            "$near" => {
                let (x, y) = parse_point(value)?;
                near = Some((x, y, false));
            }
            "$nearSphere" => {
                let (x, y) = parse_point(value)?;
                near = Some((x, y, true));
            }
            "$maxDistance" => {
                max_distance = Some(value.as_f64().ok_or_else(|| {
                    QueryError::InvalidFilter("$maxDistance must be numeric".into())
                })?);
            }
            "$geoWithin" => within = Some(parse_polygon(value)?),
            "$geoIntersects" => intersects = Some(parse_polygon(value)?),
            k => {
                return Err(QueryError::InvalidFilter(format!(
                    "unexpected key in geo operator document: {k}"
                )));
            }
        }
    }

    match (near, within, intersects) {
        (Some((x, y, spherical)), None, None) => Ok(GeoQuery::Near {
            x,
            y,
            max_distance,
            spherical,
        }),
        (None, Some(vertices), None) if max_distance.is_none() => Ok(GeoQuery::Within(vertices)),
        (None, None, Some(vertices)) if max_distance.is_none() => {
            Ok(GeoQuery::Intersects(vertices))
        }
        _ => Err(QueryError::InvalidFilter(
            "conflicting geo operators in one document".into(),
        )),
    }
}

fn parse_point(value: &Value) -> Result<(f64, f64), QueryError> {
    let arr = value
        .as_array()
        .ok_or_else(|| QueryError::InvalidFilter("geo point must be a two-element array".into()))?;
    if arr.len() != 2 {
        return Err(QueryError::InvalidFilter(
            "geo point must be a two-element array".into(),
        ));
    }
    match (arr[0].as_f64(), arr[1].as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(QueryError::InvalidFilter(
            "geo point coordinates must be numeric".into(),
        )),
    }
}

fn parse_polygon(value: &Value) -> Result<Vec<(f64, f64)>, QueryError> {
    let doc = value
        .as_document()
        .ok_or_else(|| QueryError::InvalidFilter("geo shape must be a document".into()))?;
    let ring = doc
        .get_array("$polygon")
        .ok_or_else(|| QueryError::InvalidFilter("geo shape requires $polygon".into()))?;
    if ring.len() < 3 {
        return Err(QueryError::InvalidFilter(
            "$polygon requires at least three vertices".into(),
        ));
    }
    ring.iter().map(parse_point).collect()
}
