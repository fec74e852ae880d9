use basalt_core::{Document, Value};

use crate::error::QueryError;
use crate::filter::Filter;
use crate::parse_filter::parse_filter;
use crate::projection::{Projection, parse_projection};
use crate::sort::{SortDirection, SortSpec};

/// One aggregation pipeline stage. The stage set is closed; unknown
/// stages fail at parse time.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    Sort(Vec<SortSpec>),
    Limit(usize),
    Skip(usize),
    Group(GroupSpec),
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub key: GroupKey,
    /// Output field name → accumulator, in declaration order.
    pub fields: Vec<(String, Accumulator)>,
}

/// The `_id` expression of a `$group`: a `$field` reference or a constant.
#[derive(Debug, Clone)]
pub enum GroupKey {
    Field(String),
    Constant(Value),
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(AccInput),
    Avg(AccInput),
    Min(AccInput),
    Max(AccInput),
    Count,
}

/// An accumulator argument: a `$field` reference or a numeric constant.
#[derive(Debug, Clone)]
pub enum AccInput {
    Field(String),
    Constant(Value),
}

/// Parse a pipeline: each stage document holds exactly one `$stage` key.
pub fn parse_pipeline(stages: &[Document]) -> Result<Vec<Stage>, QueryError> {
    stages.iter().map(parse_stage).collect()
}

fn parse_stage(doc: &Document) -> Result<Stage, QueryError> {
    if doc.len() != 1 {
        return Err(QueryError::InvalidStage(
            "pipeline stage must hold exactly one operator".into(),
        ));
    }
    let (name, value) = doc.iter().next().unwrap();

    match name {
        "$match" => {
            let sub = value.as_document().ok_or_else(|| {
                QueryError::InvalidStage("$match value must be a document".into())
            })?;
            Ok(Stage::Match(parse_filter(sub)?))
        }
        "$project" => {
            let sub = value.as_document().ok_or_else(|| {
                QueryError::InvalidStage("$project value must be a document".into())
            })?;
            Ok(Stage::Project(parse_projection(sub)?))
        }
        "$sort" => Ok(Stage::Sort(parse_sort(value)?)),
        "$limit" => match value.as_i64() {
            Some(n) if n > 0 => Ok(Stage::Limit(n as usize)),
            Some(_) => Err(QueryError::InvalidStage(
                "$limit must be a positive integer".into(),
            )),
            None => Err(QueryError::InvalidStage("$limit must be an integer".into())),
        },
        "$skip" => match value.as_i64() {
            Some(n) if n >= 0 => Ok(Stage::Skip(n as usize)),
            _ => Err(QueryError::InvalidStage(
                "$skip must be a non-negative integer".into(),
            )),
        },
        "$group" => {
            let sub = value.as_document().ok_or_else(|| {
                QueryError::InvalidStage("$group value must be a document".into())
            })?;
            Ok(Stage::Group(parse_group(sub)?))
        }
        other => Err(QueryError::InvalidStage(format!(
            "unsupported pipeline stage: {other}"
        ))),
    }
}

/// `$sort` spec: field → 1 | -1.
fn parse_sort(value: &Value) -> Result<Vec<SortSpec>, QueryError> {
    let doc = value
        .as_document()
        .ok_or_else(|| QueryError::InvalidStage("$sort value must be a document".into()))?;
    if doc.is_empty() {
        return Err(QueryError::InvalidStage("$sort must not be empty".into()));
    }
    let mut sorts = Vec::with_capacity(doc.len());
    for (field, dir) in doc.iter() {
        let direction = match dir.as_i64() {
            Some(1) => SortDirection::Asc,
            Some(-1) => SortDirection::Desc,
            _ => {
                return Err(QueryError::InvalidStage(format!(
                    "$sort direction for '{field}' must be 1 or -1"
                )));
            }
        };
        sorts.push(SortSpec {
            field: field.to_string(),
            direction,
        });
    }
    Ok(sorts)
}

fn parse_group(doc: &Document) -> Result<GroupSpec, QueryError> {
    let key_value = doc
        .get("_id")
        .ok_or_else(|| QueryError::InvalidStage("$group requires an _id expression".into()))?;
    let key = match key_value {
        Value::String(s) if s.starts_with('$') => GroupKey::Field(s[1..].to_string()),
        other => GroupKey::Constant(other.clone()),
    };

    let mut fields = Vec::new();
    for (name, value) in doc.iter() {
        if name == "_id" {
            continue;
        }
        let spec = value.as_document().ok_or_else(|| {
            QueryError::InvalidStage(format!(
                "$group field '{name}' must be an accumulator document"
            ))
        })?;
        if spec.len() != 1 {
            return Err(QueryError::InvalidStage(format!(
                "$group field '{name}' must hold exactly one accumulator"
            )));
        }
        let (acc_name, acc_value) = spec.iter().next().unwrap();
        let acc = match acc_name {
            "$sum" => Accumulator::Sum(parse_acc_input(name, acc_value)?),
            "$avg" => Accumulator::Avg(parse_acc_input(name, acc_value)?),
            "$min" => Accumulator::Min(parse_acc_input(name, acc_value)?),
            "$max" => Accumulator::Max(parse_acc_input(name, acc_value)?),
            "$count" => Accumulator::Count,
            other => {
                return Err(QueryError::InvalidStage(format!(
                    "unknown accumulator: {other}"
                )));
            }
        };
        fields.push((name.to_string(), acc));
    }

    Ok(GroupSpec { key, fields })
}

fn parse_acc_input(field: &str, value: &Value) -> Result<AccInput, QueryError> {
    match value {
        Value::String(s) if s.starts_with('$') => Ok(AccInput::Field(s[1..].to_string())),
        v if v.is_number() => Ok(AccInput::Constant(v.clone())),
        _ => Err(QueryError::InvalidStage(format!(
            "accumulator argument for '{field}' must be a $field reference or a number"
        ))),
    }
}
