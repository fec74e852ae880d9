use basalt_core::{Document, Value};

use crate::error::QueryError;

/// A single field-level update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Assign a value. Creates the field if absent.
    Set(Value),
    /// Remove the field.
    Unset,
    /// Add to a numeric field. A missing field is created with the operand.
    Inc(Value),
    /// Multiply a numeric field. A missing field is created as 0.
    Mul(Value),
    /// Assign only if the operand orders strictly below the current value.
    Min(Value),
    /// Assign only if the operand orders strictly above the current value.
    Max(Value),
    /// Append one or more values to an array field.
    Push(Vec<Value>),
    /// Append values not already present under value equality.
    AddToSet(Vec<Value>),
    /// Remove all elements equal to the operand.
    Pull(Value),
    /// Remove all elements equal to any operand.
    PullAll(Vec<Value>),
    /// Drop the first or last element.
    Pop(PopFrom),
    /// Move the field to a new name; an existing target is overwritten.
    Rename(String),
    /// Assign the current wall-clock time.
    CurrentDate(DateKind),
    /// Bitwise operation on an integer field; a missing field starts at 0.
    Bit(BitKind, i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopFrom {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    /// Full timestamp value.
    Date,
    /// Unix seconds as an integer.
    TimestampSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    And,
    Or,
    Xor,
}

/// One field + operator pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: String,
    pub op: UpdateOp,
}

/// A parsed update: an unordered set of independent field operators.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub ops: Vec<FieldUpdate>,
}

/// Parse an update document into a validated [`UpdateSpec`].
///
/// Top-level keys beginning with `$` are operators whose values map field
/// names to operands; any bare top-level key is a direct field assignment.
/// Unknown operators and `_id` mutations are rejected.
pub fn parse_update(doc: &Document) -> Result<UpdateSpec, QueryError> {
    let mut ops = Vec::new();

    for (key, value) in doc.iter() {
        match key {
            "_id" => continue,
            "$set" => parse_value_fields(value, UpdateOp::Set, &mut ops)?,
            "$unset" => parse_marker_fields(value, "$unset", |_| UpdateOp::Unset, &mut ops)?,
            "$inc" => parse_numeric_fields(value, "$inc", UpdateOp::Inc, &mut ops)?,
            "$mul" => parse_numeric_fields(value, "$mul", UpdateOp::Mul, &mut ops)?,
            "$min" => parse_value_fields(value, UpdateOp::Min, &mut ops)?,
            "$max" => parse_value_fields(value, UpdateOp::Max, &mut ops)?,
            "$push" => parse_each_fields(value, "$push", UpdateOp::Push, &mut ops)?,
            "$addToSet" => parse_each_fields(value, "$addToSet", UpdateOp::AddToSet, &mut ops)?,
            "$pull" => parse_value_fields(value, UpdateOp::Pull, &mut ops)?,
            "$pullAll" => parse_pull_all(value, &mut ops)?,
            "$pop" => parse_pop_fields(value, &mut ops)?,
            "$rename" => parse_rename_fields(value, &mut ops)?,
            "$currentDate" => parse_current_date(value, &mut ops)?,
            "$bit" => parse_bit_fields(value, &mut ops)?,
            k if k.starts_with('$') => {
                return Err(QueryError::InvalidUpdate(format!("unknown operator: {k}")));
            }
            _ => ops.push(FieldUpdate {
                field: key.to_string(),
                op: UpdateOp::Set(value.clone()),
            }),
        }
    }

    if ops.is_empty() {
        return Err(QueryError::InvalidUpdate("empty update document".into()));
    }

    for fu in &ops {
        if fu.field == "_id" {
            return Err(QueryError::InvalidUpdate("cannot mutate _id field".into()));
        }
        if let UpdateOp::Rename(target) = &fu.op {
            if target == "_id" {
                return Err(QueryError::InvalidUpdate("cannot rename onto _id".into()));
            }
        }
    }

    Ok(UpdateSpec { ops })
}

// ── Internal helpers ────────────────────────────────────────────

fn operator_doc<'a>(value: &'a Value, op: &str) -> Result<&'a Document, QueryError> {
    value
        .as_document()
        .ok_or_else(|| QueryError::InvalidUpdate(format!("{op} value must be a document")))
}

/// Operators whose operand is any value: $set, $min, $max, $pull.
fn parse_value_fields(
    value: &Value,
    make_op: fn(Value) -> UpdateOp,
    ops: &mut Vec<FieldUpdate>,
) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "operator")?.iter() {
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: make_op(val.clone()),
        });
    }
    Ok(())
}

/// Operators whose operand is ignored: $unset.
fn parse_marker_fields(
    value: &Value,
    op_name: &str,
    make_op: fn(&Value) -> UpdateOp,
    ops: &mut Vec<FieldUpdate>,
) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, op_name)?.iter() {
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: make_op(val),
        });
    }
    Ok(())
}

/// Operators whose operand must be numeric: $inc, $mul.
fn parse_numeric_fields(
    value: &Value,
    op_name: &str,
    make_op: fn(Value) -> UpdateOp,
    ops: &mut Vec<FieldUpdate>,
) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, op_name)?.iter() {
        if !val.is_number() {
            return Err(QueryError::InvalidUpdate(format!(
                "{op_name} value for '{field}' must be numeric"
            )));
        }
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: make_op(val.clone()),
        });
    }
    Ok(())
}

/// $push / $addToSet: a single value, or `{ "$each": [...] }`.
fn parse_each_fields(
    value: &Value,
    op_name: &str,
    make_op: fn(Vec<Value>) -> UpdateOp,
    ops: &mut Vec<FieldUpdate>,
) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, op_name)?.iter() {
        let values = match val {
            Value::Document(sub) if sub.contains_key("$each") => {
                let each = sub.get_array("$each").ok_or_else(|| {
                    QueryError::InvalidUpdate(format!("{op_name} $each must be an array"))
                })?;
                if sub.len() != 1 {
                    return Err(QueryError::InvalidUpdate(format!(
                        "{op_name} supports no modifiers besides $each"
                    )));
                }
                each.to_vec()
            }
            other => vec![other.clone()],
        };
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: make_op(values),
        });
    }
    Ok(())
}

fn parse_pull_all(value: &Value, ops: &mut Vec<FieldUpdate>) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "$pullAll")?.iter() {
        let values = val.as_array().ok_or_else(|| {
            QueryError::InvalidUpdate(format!("$pullAll value for '{field}' must be an array"))
        })?;
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: UpdateOp::PullAll(values.to_vec()),
        });
    }
    Ok(())
}

/// $pop: -1 drops the first element, 1 the last.
fn parse_pop_fields(value: &Value, ops: &mut Vec<FieldUpdate>) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "$pop")?.iter() {
        let from = match val.as_i64() {
            Some(-1) => PopFrom::First,
            Some(1) => PopFrom::Last,
            _ => {
                return Err(QueryError::InvalidUpdate(format!(
                    "$pop value for '{field}' must be -1 or 1"
                )));
            }
        };
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: UpdateOp::Pop(from),
        });
    }
    Ok(())
}

fn parse_rename_fields(value: &Value, ops: &mut Vec<FieldUpdate>) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "$rename")?.iter() {
        let new_name = match val {
            Value::String(s) => s.clone(),
            _ => {
                return Err(QueryError::InvalidUpdate(format!(
                    "$rename value for '{field}' must be a string"
                )));
            }
        };
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: UpdateOp::Rename(new_name),
        });
    }
    Ok(())
}

/// $currentDate: `true` or `{ "$type": "date" | "timestamp" }`.
fn parse_current_date(value: &Value, ops: &mut Vec<FieldUpdate>) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "$currentDate")?.iter() {
        let kind = match val {
            Value::Bool(true) => DateKind::Date,
            Value::Document(sub) => match sub.get_str("$type") {
                Some("date") => DateKind::Date,
                Some("timestamp") => DateKind::TimestampSeconds,
                _ => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "$currentDate $type for '{field}' must be \"date\" or \"timestamp\""
                    )));
                }
            },
            _ => {
                return Err(QueryError::InvalidUpdate(format!(
                    "$currentDate value for '{field}' must be true or {{$type: ...}}"
                )));
            }
        };
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: UpdateOp::CurrentDate(kind),
        });
    }
    Ok(())
}

/// $bit: `{ field: { "and" | "or" | "xor": int } }`.
fn parse_bit_fields(value: &Value, ops: &mut Vec<FieldUpdate>) -> Result<(), QueryError> {
    for (field, val) in operator_doc(value, "$bit")?.iter() {
        let sub = val.as_document().ok_or_else(|| {
            QueryError::InvalidUpdate(format!("$bit value for '{field}' must be a document"))
        })?;
        if sub.len() != 1 {
            return Err(QueryError::InvalidUpdate(format!(
                "$bit for '{field}' takes exactly one of and/or/xor"
            )));
        }
        let (kind_name, operand) = sub.iter().next().unwrap();
        let kind = match kind_name {
            "and" => BitKind::And,
            "or" => BitKind::Or,
            "xor" => BitKind::Xor,
            k => {
                return Err(QueryError::InvalidUpdate(format!(
                    "unknown $bit operation: {k}"
                )));
            }
        };
        let operand = operand.as_i64().ok_or_else(|| {
            QueryError::InvalidUpdate(format!("$bit operand for '{field}' must be an integer"))
        })?;
        ops.push(FieldUpdate {
            field: field.to_string(),
            op: UpdateOp::Bit(kind, operand),
        });
    }
    Ok(())
}
