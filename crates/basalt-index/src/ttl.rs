use std::collections::{BTreeMap, BTreeSet};

use basalt_core::{DateTime, Document, Utc, Value};

use crate::DocId;

/// Expiration index over a timestamp field.
///
/// Maps `stored timestamp + offset` (as unix milliseconds) to the ids
/// expiring at that instant. Documents whose field is missing or not a
/// timestamp are simply not tracked.
#[derive(Debug)]
pub struct TtlIndex {
    name: String,
    field: String,
    offset_secs: i64,
    expiry: BTreeMap<i64, BTreeSet<DocId>>,
}

impl TtlIndex {
    pub fn new(name: impl Into<String>, field: impl Into<String>, offset_secs: i64) -> TtlIndex {
        TtlIndex {
            name: name.into(),
            field: field.into(),
            offset_secs,
            expiry: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn offset_secs(&self) -> i64 {
        self.offset_secs
    }

    pub fn len(&self) -> usize {
        self.expiry.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.expiry.is_empty()
    }

    fn expire_at(&self, doc: &Document) -> Option<i64> {
        match doc.get(&self.field) {
            Some(Value::DateTime(ts)) => {
                Some(ts.timestamp_millis().saturating_add(self.offset_secs * 1000))
            }
            _ => None,
        }
    }

    pub fn insert_doc(&mut self, id: &str, doc: &Document) {
        if let Some(at) = self.expire_at(doc) {
            self.expiry.entry(at).or_default().insert(id.to_string());
        }
    }

    pub fn remove_doc(&mut self, id: &str, doc: &Document) {
        if let Some(at) = self.expire_at(doc) {
            if let Some(ids) = self.expiry.get_mut(&at) {
                ids.remove(id);
                if ids.is_empty() {
                    self.expiry.remove(&at);
                }
            }
        }
    }

    /// Ids whose expiration instant has passed. The caller feeds these to
    /// the collection's delete path; the entries leave this index when the
    /// deletes come back through `remove_doc`, so the sweep stays
    /// idempotent.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<DocId> {
        let cutoff = now.timestamp_millis();
        self.expiry
            .range(..=cutoff)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }
}
