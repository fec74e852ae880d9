use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use basalt_core::{Document, Value};
use basalt_query::{Filter, matches};

use crate::key::{IndexKey, KeyValue};
use crate::{DocId, IndexError};

/// Bounds on one key component for a range scan.
#[derive(Debug, Clone, Default)]
pub struct FieldRange {
    pub lower: Option<(Value, bool)>,
    pub upper: Option<(Value, bool)>,
}

impl FieldRange {
    fn contains(&self, value: &KeyValue) -> bool {
        if let Some((bound, inclusive)) = &self.lower {
            let ord = value.cmp(&KeyValue(bound.clone()));
            if ord == std::cmp::Ordering::Less || (ord == std::cmp::Ordering::Equal && !inclusive)
            {
                return false;
            }
        }
        if let Some((bound, inclusive)) = &self.upper {
            let ord = value.cmp(&KeyValue(bound.clone()));
            if ord == std::cmp::Ordering::Greater
                || (ord == std::cmp::Ordering::Equal && !inclusive)
            {
                return false;
            }
        }
        true
    }
}

/// An ordered map from composite key to the set of documents carrying it.
///
/// Covers the single-field, compound, unique, and partial index classes.
/// Documents missing any indexed field, or failing the partial filter,
/// contribute nothing.
#[derive(Debug)]
pub struct OrderedIndex {
    name: String,
    fields: Vec<String>,
    unique: bool,
    partial: Option<Filter>,
    map: BTreeMap<IndexKey, BTreeSet<DocId>>,
}

impl OrderedIndex {
    pub fn new(name: impl Into<String>, fields: Vec<String>, unique: bool) -> OrderedIndex {
        OrderedIndex {
            name: name.into(),
            fields,
            unique,
            partial: None,
            map: BTreeMap::new(),
        }
    }

    pub fn with_partial(mut self, filter: Filter) -> OrderedIndex {
        self.partial = Some(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn partial_filter(&self) -> Option<&Filter> {
        self.partial.as_ref()
    }

    /// Number of indexed documents.
    pub fn entry_count(&self) -> usize {
        self.map.values().map(BTreeSet::len).sum()
    }

    /// The key this document would contribute, after the partial filter.
    pub fn key_for(&self, doc: &Document) -> Option<IndexKey> {
        if let Some(filter) = &self.partial {
            if !matches(doc, filter) {
                return None;
            }
        }
        IndexKey::extract(doc, &self.fields)
    }

    /// Insert a document's entry. A unique index rejects a key already
    /// held by a different document and stays unchanged.
    pub fn insert_doc(&mut self, id: &str, doc: &Document) -> Result<(), IndexError> {
        match self.key_for(doc) {
            Some(key) => self.insert_key(key, id),
            None => Ok(()),
        }
    }

    /// Insert a pre-extracted key. Used by the background builder, which
    /// snapshots `(id, key)` pairs under the write lock and fills the
    /// index outside it.
    pub fn insert_key(&mut self, key: IndexKey, id: &str) -> Result<(), IndexError> {
        if self.unique {
            if let Some(ids) = self.map.get(&key) {
                if !ids.is_empty() && !ids.contains(id) {
                    return Err(IndexError::DuplicateKey {
                        index: self.name.clone(),
                        key: key.display(),
                    });
                }
            }
        }
        self.map.entry(key).or_default().insert(id.to_string());
        Ok(())
    }

    pub fn remove_doc(&mut self, id: &str, doc: &Document) {
        // Attempt removal whenever the key shape is present; if the
        // document never satisfied the partial filter the entry simply
        // is not there.
        if let Some(key) = IndexKey::extract(doc, &self.fields) {
            self.remove_key(&key, id);
        }
    }

    pub fn remove_key(&mut self, key: &IndexKey, id: &str) {
        if let Some(ids) = self.map.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Ids for an exact key, in id order.
    pub fn lookup(&self, key: &IndexKey) -> Vec<DocId> {
        self.map
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Scan: equality on a key prefix, then an optional range on the next
    /// component. Ids come back in key order (ascending).
    pub fn scan(&self, prefix: &[Value], range: Option<&FieldRange>) -> Vec<DocId> {
        let prefix: Vec<KeyValue> = prefix.iter().cloned().map(KeyValue).collect();
        let range_pos = prefix.len();

        // Seek directly to the range's lower bound when we have one.
        let start: Bound<IndexKey> = match range.and_then(|r| r.lower.as_ref()) {
            Some((value, _inclusive)) => {
                let mut components = prefix.clone();
                components.push(KeyValue(value.clone()));
                // Exclusive bounds still start here: coarser keys with
                // more components sort after this prefix.
                Bound::Included(IndexKey(components))
            }
            None => {
                if prefix.is_empty() {
                    Bound::Unbounded
                } else {
                    Bound::Included(IndexKey(prefix.clone()))
                }
            }
        };

        let mut out = Vec::new();
        for (key, ids) in self.map.range((start, Bound::Unbounded)) {
            if !key.has_prefix(&prefix) {
                break;
            }
            if let Some(range) = range {
                match key.components().get(range_pos) {
                    Some(component) => {
                        if let Some((bound, _)) = &range.upper {
                            // Past the upper bound: nothing further matches.
                            if component.cmp(&KeyValue(bound.clone()))
                                == std::cmp::Ordering::Greater
                            {
                                break;
                            }
                        }
                        if !range.contains(component) {
                            continue;
                        }
                    }
                    None => continue,
                }
            }
            out.extend(ids.iter().cloned());
        }
        out
    }

    /// All ids in key order.
    pub fn scan_all(&self) -> Vec<DocId> {
        self.map.values().flat_map(|ids| ids.iter().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;
    use basalt_query::parse_filter;

    fn single(name: &str, field: &str, unique: bool) -> OrderedIndex {
        OrderedIndex::new(name, vec![field.to_string()], unique)
    }

    #[test]
    fn insert_lookup_remove() {
        let mut idx = single("age_1", "age", false);
        idx.insert_doc("a", &doc! { "age": 30 }).unwrap();
        idx.insert_doc("b", &doc! { "age": 30 }).unwrap();
        idx.insert_doc("c", &doc! { "age": 40 }).unwrap();

        let key = IndexKey::from_values(vec![Value::Int(30)]);
        assert_eq!(idx.lookup(&key), vec!["a", "b"]);
        assert_eq!(idx.entry_count(), 3);

        idx.remove_doc("a", &doc! { "age": 30 });
        assert_eq!(idx.lookup(&key), vec!["b"]);
    }

    #[test]
    fn missing_field_not_indexed() {
        let mut idx = single("age_1", "age", false);
        idx.insert_doc("a", &doc! { "name": "no age" }).unwrap();
        assert_eq!(idx.entry_count(), 0);
        // Explicit null is indexed.
        idx.insert_doc("b", &doc! { "age": null }).unwrap();
        assert_eq!(idx.entry_count(), 1);
    }

    #[test]
    fn unique_rejects_second_doc_with_same_key() {
        let mut idx = single("email_1", "email", true);
        idx.insert_doc("a", &doc! { "email": "a@x" }).unwrap();
        let err = idx.insert_doc("b", &doc! { "email": "a@x" }).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey { .. }));
        // Index unchanged: only the original entry remains.
        assert_eq!(idx.entry_count(), 1);
        let key = IndexKey::from_values(vec![Value::String("a@x".into())]);
        assert_eq!(idx.lookup(&key), vec!["a"]);
    }

    #[test]
    fn unique_reinsert_same_doc_is_fine() {
        let mut idx = single("email_1", "email", true);
        idx.insert_doc("a", &doc! { "email": "a@x" }).unwrap();
        idx.insert_doc("a", &doc! { "email": "a@x" }).unwrap();
        assert_eq!(idx.entry_count(), 1);
    }

    #[test]
    fn range_scan_single_field() {
        let mut idx = single("n_1", "n", false);
        for (id, n) in [("a", 1), ("b", 5), ("c", 10), ("d", 20)] {
            idx.insert_doc(id, &doc! { "n": n }).unwrap();
        }
        let range = FieldRange {
            lower: Some((Value::Int(5), true)),
            upper: Some((Value::Int(10), false)),
        };
        assert_eq!(idx.scan(&[], Some(&range)), vec!["b"]);
        let range = FieldRange {
            lower: Some((Value::Int(5), false)),
            upper: None,
        };
        assert_eq!(idx.scan(&[], Some(&range)), vec!["c", "d"]);
    }

    #[test]
    fn compound_prefix_scan() {
        let fields = vec!["country".to_string(), "age".to_string()];
        let mut idx = OrderedIndex::new("country_1_age_1", fields, false);
        idx.insert_doc("us30", &doc! { "country": "US", "age": 30 }).unwrap();
        idx.insert_doc("us40", &doc! { "country": "US", "age": 40 }).unwrap();
        idx.insert_doc("de30", &doc! { "country": "DE", "age": 30 }).unwrap();
        idx.insert_doc("de50", &doc! { "country": "DE", "age": 50 }).unwrap();

        assert_eq!(
            idx.scan(&[Value::String("US".into())], None),
            vec!["us30", "us40"]
        );
        let range = FieldRange {
            lower: Some((Value::Int(35), true)),
            upper: None,
        };
        assert_eq!(
            idx.scan(&[Value::String("DE".into())], Some(&range)),
            vec!["de50"]
        );
    }

    #[test]
    fn partial_filter_gates_entries() {
        let filter = parse_filter(&doc! { "active": true }).unwrap();
        let mut idx = single("score_1", "score", false).with_partial(filter);
        idx.insert_doc("a", &doc! { "score": 1, "active": true }).unwrap();
        idx.insert_doc("b", &doc! { "score": 2, "active": false }).unwrap();
        assert_eq!(idx.entry_count(), 1);
        // Removing the unindexed doc is a harmless no-op.
        idx.remove_doc("b", &doc! { "score": 2, "active": false });
        assert_eq!(idx.entry_count(), 1);
    }

    #[test]
    fn scan_orders_by_key() {
        let mut idx = single("n_1", "n", false);
        for (id, n) in [("c", 3), ("a", 1), ("b", 2)] {
            idx.insert_doc(id, &doc! { "n": n }).unwrap();
        }
        assert_eq!(idx.scan_all(), vec!["a", "b", "c"]);
    }
}
