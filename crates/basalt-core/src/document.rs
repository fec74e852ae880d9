use std::fmt;

use indexmap::IndexMap;

use crate::value::Value;

/// An insertion-ordered mapping of field name to value.
///
/// Field names are unique; setting an existing name overwrites in place and
/// keeps the original position. Names are opaque — a dot inside a name is
/// part of the name, not a path separator.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Document {
        Document {
            fields: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set a field, returning the previous value if any.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Remove a field, preserving the order of the remaining fields.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// The underlying ordered map.
    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    // ── Typed accessors ─────────────────────────────────────────

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_array(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_array)
    }

    pub fn get_document(&self, name: &str) -> Option<&Document> {
        self.get(name).and_then(Value::as_document)
    }

    /// String form of `_id`, the document's identity within a collection.
    pub fn id_string(&self) -> Option<String> {
        self.get("_id").map(Value::as_id_string)
    }
}

impl PartialEq for Document {
    /// Order-sensitive: two documents are equal when they hold the same
    /// fields with equal values in the same insertion order.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Value::Document(self.clone()).canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_preserves_insertion_order() {
        let mut doc = Document::new();
        doc.set("z", Value::Int(1));
        doc.set("a", Value::Int(2));
        doc.set("m", Value::Int(3));
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut doc = Document::new();
        doc.set("a", Value::Int(1));
        doc.set("b", Value::Int(2));
        let old = doc.set("a", Value::Int(9));
        assert_eq!(old, Some(Value::Int(1)));
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get_i64("a"), Some(9));
    }

    #[test]
    fn remove_keeps_order() {
        let mut doc = Document::new();
        doc.set("a", Value::Int(1));
        doc.set("b", Value::Int(2));
        doc.set("c", Value::Int(3));
        assert_eq!(doc.remove("b"), Some(Value::Int(2)));
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(doc.remove("b"), None);
    }

    #[test]
    fn dotted_name_is_literal() {
        let mut doc = Document::new();
        doc.set("a.b", Value::Int(1));
        assert!(doc.contains_key("a.b"));
        assert!(!doc.contains_key("a"));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let mut a = Document::new();
        a.set("x", Value::Int(1));
        a.set("y", Value::Int(2));
        let mut b = Document::new();
        b.set("y", Value::Int(2));
        b.set("x", Value::Int(1));
        assert_ne!(a, b);
    }

    #[test]
    fn id_string_for_non_string_ids() {
        let mut doc = Document::new();
        doc.set("_id", Value::Int(7));
        assert_eq!(doc.id_string(), Some("7".to_string()));
    }
}
