use basalt_core::{Document, Value};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    Include,
    Exclude,
}

/// A parsed projection: either an include list or an exclude list.
///
/// `_id` rides along by default and is the only field allowed to go
/// against the projection mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub mode: ProjectionMode,
    pub fields: Vec<String>,
    pub include_id: bool,
}

/// Parse a projection document mapping field names to include flags
/// (booleans or 0/1 integers).
///
/// Mixing include and exclude flags is an error, except for `_id`.
pub fn parse_projection(doc: &Document) -> Result<Projection, QueryError> {
    let mut mode: Option<ProjectionMode> = None;
    let mut fields = Vec::new();
    let mut include_id = true;

    for (key, value) in doc.iter() {
        let include = match value {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            _ => {
                return Err(QueryError::InvalidProjection(format!(
                    "projection flag for '{key}' must be a boolean or 0/1"
                )));
            }
        };

        if key == "_id" {
            include_id = include;
            continue;
        }

        let this_mode = if include {
            ProjectionMode::Include
        } else {
            ProjectionMode::Exclude
        };
        match mode {
            None => mode = Some(this_mode),
            Some(m) if m != this_mode => {
                return Err(QueryError::InvalidProjection(
                    "cannot mix include and exclude projections".into(),
                ));
            }
            Some(_) => {}
        }
        fields.push(key.to_string());
    }

    // An `_id`-only projection defaults to include mode.
    let mode = mode.unwrap_or(ProjectionMode::Include);
    Ok(Projection {
        mode,
        fields,
        include_id,
    })
}

impl Projection {
    /// Fields a covering index would have to supply.
    pub fn required_fields(&self) -> Option<&[String]> {
        match self.mode {
            ProjectionMode::Include => Some(&self.fields),
            ProjectionMode::Exclude => None,
        }
    }

    /// Apply to one document, preserving its field order.
    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::new();
        for (key, value) in doc.iter() {
            let keep = if key == "_id" {
                self.include_id
            } else {
                match self.mode {
                    ProjectionMode::Include => self.fields.iter().any(|f| f == key),
                    ProjectionMode::Exclude => !self.fields.iter().any(|f| f == key),
                }
            };
            if keep {
                out.set(key, value.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;

    #[test]
    fn include_mode_keeps_id_by_default() {
        let proj = parse_projection(&doc! { "name": true }).unwrap();
        let out = proj.apply(&doc! { "_id": "x", "name": "Ada", "age": 36 });
        assert_eq!(out, doc! { "_id": "x", "name": "Ada" });
    }

    #[test]
    fn id_can_be_excluded_in_include_mode() {
        let proj = parse_projection(&doc! { "name": 1, "_id": 0 }).unwrap();
        let out = proj.apply(&doc! { "_id": "x", "name": "Ada" });
        assert_eq!(out, doc! { "name": "Ada" });
    }

    #[test]
    fn exclude_mode_drops_listed_fields() {
        let proj = parse_projection(&doc! { "secret": false }).unwrap();
        let out = proj.apply(&doc! { "_id": "x", "name": "Ada", "secret": "s" });
        assert_eq!(out, doc! { "_id": "x", "name": "Ada" });
    }

    #[test]
    fn mixing_modes_errors() {
        assert!(parse_projection(&doc! { "a": 1, "b": 0 }).is_err());
    }

    #[test]
    fn non_flag_value_errors() {
        assert!(parse_projection(&doc! { "a": "yes" }).is_err());
    }

    #[test]
    fn id_only_projection() {
        let proj = parse_projection(&doc! { "_id": 1 }).unwrap();
        let out = proj.apply(&doc! { "_id": "x", "name": "Ada" });
        assert_eq!(out, doc! { "_id": "x" });
    }
}
