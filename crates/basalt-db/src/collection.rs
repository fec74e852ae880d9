use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use basalt_core::{Document, ObjectIdGenerator, Utc, Value, doc};
use basalt_index::{
    DEFAULT_CELL_SIZE, DEFAULT_PRECISION, Geo2dIndex, Geo2dSphereIndex, Index, IndexKey,
    IndexState, OrderedIndex, TextIndex, TtlIndex,
};
use basalt_query::{FindOptions, parse_filter, parse_pipeline, parse_update};
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::cache::{CacheStats, QueryCache, fingerprint};
use crate::change::{ChangeEvent, ChangeOp, ChangePublisher};
use crate::error::DbError;
use crate::executor;
use crate::plan::Explain;
use crate::planner;
use crate::result::{DeleteResult, InsertResult, UpdateResult};

/// An index plus its lifecycle state. Writes maintain `Building` and
/// `Ready` slots identically; the planner consults only `Ready` ones.
pub(crate) struct IndexSlot {
    pub(crate) index: Index,
    pub(crate) state: IndexState,
}

/// Everything guarded by the collection's readers-writer lock: the id
/// map, the index registry, and the result cache.
pub(crate) struct Inner {
    pub(crate) docs: BTreeMap<String, Document>,
    pub(crate) indexes: BTreeMap<String, IndexSlot>,
    pub(crate) cache: QueryCache,
    /// Updates whose post-image was rejected by a unique secondary index
    /// leave that index under-populated; this counter surfaces the skew.
    pub(crate) index_skew: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CreateIndexOptions {
    pub unique: bool,
    /// Register immediately and fill from a snapshot on a worker thread.
    pub background: bool,
    /// Restrict the index to documents matching this filter.
    pub partial_filter: Option<Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub kind: String,
    pub unique: bool,
    pub entries: usize,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub doc_count: usize,
    pub index_count: usize,
    pub indexes: Vec<IndexInfo>,
    pub cache: CacheStats,
    pub index_skew: u64,
}

/// A named, independently locked bag of documents with its secondary
/// indexes and result cache.
///
/// Writes serialize on the exclusive lock; within one write the order is
/// fixed: index pre-image deletion, update application, index post-image
/// insertion, cache invalidation, change publication, unlock.
pub struct Collection {
    name: RwLock<String>,
    oid: Arc<ObjectIdGenerator>,
    inner: RwLock<Inner>,
    events: ChangePublisher,
    /// Back-reference handed to background build workers.
    self_ref: Weak<Collection>,
}

impl Collection {
    pub(crate) fn new(
        name: impl Into<String>,
        oid: Arc<ObjectIdGenerator>,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Arc<Collection> {
        let name = name.into();
        Arc::new_cyclic(|self_ref| Collection {
            name: RwLock::new(name),
            oid,
            inner: RwLock::new(Inner {
                docs: BTreeMap::new(),
                indexes: BTreeMap::new(),
                cache: QueryCache::new(cache_capacity, cache_ttl),
                index_skew: 0,
            }),
            events: ChangePublisher::default(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.write() = name;
    }

    pub fn doc_count(&self) -> usize {
        self.inner.read().docs.len()
    }

    /// Subscribe to this collection's mutation events.
    pub fn watch(&self) -> Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    // ── Insert ──────────────────────────────────────────────────

    /// Insert a single document. A missing `_id` gets a fresh ObjectId.
    /// Fails with DuplicateKey when the id, or any unique index key,
    /// already exists; a failed insert leaves every index untouched.
    pub fn insert_one(&self, doc: Document) -> Result<InsertResult, DbError> {
        let inner = &mut *self.inner.write();
        self.insert_locked(inner, doc)
    }

    /// Insert a batch under one lock grant. Stops at the first failure;
    /// documents inserted before it remain.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<InsertResult>, DbError> {
        let inner = &mut *self.inner.write();
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            results.push(self.insert_locked(inner, doc)?);
        }
        Ok(results)
    }

    fn insert_locked(&self, inner: &mut Inner, mut doc: Document) -> Result<InsertResult, DbError> {
        let id = match doc.get("_id") {
            Some(value) => value.as_id_string(),
            None => {
                let oid = self.oid.generate();
                doc.set("_id", Value::ObjectId(oid));
                oid.to_hex()
            }
        };

        if inner.docs.contains_key(&id) {
            return Err(DbError::DuplicateKey(format!("_id_: {id}")));
        }

        // Secondary indexes first, so a unique violation can unwind
        // without ever exposing the document.
        let mut inserted: Vec<String> = Vec::new();
        let mut failure = None;
        for (name, slot) in inner.indexes.iter_mut() {
            match slot.index.insert_doc(&id, &doc) {
                Ok(()) => inserted.push(name.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for name in &inserted {
                if let Some(slot) = inner.indexes.get_mut(name) {
                    slot.index.remove_doc(&id, &doc);
                }
            }
            return Err(e.into());
        }

        inner.docs.insert(id.clone(), doc.clone());
        inner.cache.invalidate_all();
        self.events.publish(ChangeEvent {
            op: ChangeOp::Insert,
            collection: self.name(),
            id: id.clone(),
            doc: Some(doc),
        });
        Ok(InsertResult { id })
    }

    // ── Read ────────────────────────────────────────────────────

    pub fn find(&self, filter: &Document) -> Result<Vec<Document>, DbError> {
        self.find_with_options(filter, &FindOptions::default())
    }

    pub fn find_with_options(
        &self,
        filter_doc: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>, DbError> {
        let filter = parse_filter(filter_doc)?;
        let inner = self.inner.read();

        let key = fingerprint(filter_doc, options);
        if let Some(hit) = inner.cache.get(&key) {
            return Ok(hit);
        }

        let (plan, _) = planner::plan(&inner, &filter, options)?;
        let docs = executor::execute(&inner, &plan, &filter, options)?;
        inner.cache.store(key, docs.clone());
        Ok(docs)
    }

    pub fn find_one(&self, filter: &Document) -> Result<Option<Document>, DbError> {
        let results = self.find_with_options(filter, &FindOptions::default().with_limit(1))?;
        Ok(results.into_iter().next())
    }

    /// Direct lookup by the string form of `_id`. Bypasses the planner
    /// and the result cache.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Document>, DbError> {
        Ok(self.inner.read().docs.get(id).cloned())
    }

    pub fn count(&self, filter: &Document) -> Result<u64, DbError> {
        Ok(self.find(filter)?.len() as u64)
    }

    /// Distinct values of a field among matching documents, in canonical
    /// order.
    pub fn distinct(&self, field: &str, filter: &Document) -> Result<Vec<Value>, DbError> {
        let docs = self.find(filter)?;
        let mut seen: BTreeMap<String, Value> = BTreeMap::new();
        for doc in &docs {
            if let Some(value) = doc.get(field) {
                seen.entry(value.canonical()).or_insert_with(|| value.clone());
            }
        }
        Ok(seen.into_values().collect())
    }

    /// Report which access path a filter would use, without executing.
    pub fn explain(&self, filter_doc: &Document) -> Result<Explain, DbError> {
        let filter = parse_filter(filter_doc)?;
        let inner = self.inner.read();
        let (plan, candidates) = planner::plan(&inner, &filter, &FindOptions::default())?;
        Ok(Explain {
            plan: plan.kind().to_string(),
            index: plan.index_name().map(str::to_string),
            covered: plan.covered,
            serves_sort: plan.serves_sort,
            candidates,
        })
    }

    /// Run an aggregation pipeline over a snapshot of the collection.
    pub fn aggregate(&self, stages: &[Document]) -> Result<Vec<Document>, DbError> {
        let stages = parse_pipeline(stages)?;
        let input: Vec<Document> = {
            let inner = self.inner.read();
            inner.docs.values().cloned().collect()
        };
        aggregate::run_pipeline(input, &stages)
    }

    // ── Update ──────────────────────────────────────────────────

    /// Apply an update to the first matching document.
    pub fn update_one(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, DbError> {
        self.update_with_limit(filter, update, Some(1), false)
    }

    /// Apply an update to every matching document.
    pub fn update_many(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, DbError> {
        self.update_with_limit(filter, update, None, false)
    }

    /// Update the first matching document, or insert one when nothing
    /// matches, under a single lock grant. The inserted document starts
    /// from the filter's top-level equality fields and then has the
    /// update applied.
    pub fn upsert_one(
        &self,
        filter: &Document,
        update: &Document,
    ) -> Result<UpdateResult, DbError> {
        self.update_with_limit(filter, update, Some(1), true)
    }

    fn update_with_limit(
        &self,
        filter_doc: &Document,
        update_doc: &Document,
        limit: Option<usize>,
        upsert: bool,
    ) -> Result<UpdateResult, DbError> {
        let filter = parse_filter(filter_doc)?;
        let update = parse_update(update_doc)?;
        let collection_name = self.name();

        let inner = &mut *self.inner.write();
        let mut ids = executor::find_matching_ids(inner, &filter)?;
        if let Some(limit) = limit {
            ids.truncate(limit);
        }

        if ids.is_empty() && upsert {
            let mut seed = equality_seed(filter_doc);
            update.apply(&mut seed);
            let inserted = self.insert_locked(inner, seed)?;
            return Ok(UpdateResult {
                matched: 0,
                modified: 0,
                upserted_id: Some(inserted.id),
            });
        }

        let Inner {
            docs,
            indexes,
            cache,
            index_skew,
        } = inner;

        let matched = ids.len() as u64;
        let mut modified = 0u64;
        let mut events: Vec<ChangeEvent> = Vec::with_capacity(ids.len());

        for id in &ids {
            let Some(pre) = docs.get(id).cloned() else {
                continue;
            };

            // Pre-image out of every index before the document changes.
            for slot in indexes.values_mut() {
                slot.index.remove_doc(id, &pre);
            }

            let mut post = pre;
            if update.apply(&mut post) {
                modified += 1;
            }

            // Post-image back in. A duplicate on a unique secondary index
            // is logged and skipped: the update itself stands, the index
            // stays short one entry, and the skew counter records it.
            for (name, slot) in indexes.iter_mut() {
                if let Err(e) = slot.index.insert_doc(id, &post) {
                    warn!(
                        collection = %collection_name,
                        index = %name,
                        error = %e,
                        "post-image rejected by unique index; entry skipped"
                    );
                    *index_skew += 1;
                }
            }

            docs.insert(id.clone(), post.clone());
            events.push(ChangeEvent {
                op: ChangeOp::Update,
                collection: collection_name.clone(),
                id: id.clone(),
                doc: Some(post),
            });
        }

        if !events.is_empty() {
            cache.invalidate_all();
        }
        for event in events {
            self.events.publish(event);
        }
        Ok(UpdateResult {
            matched,
            modified,
            upserted_id: None,
        })
    }

    /// Replace the first matching document wholesale, keeping its `_id`.
    pub fn replace_one(
        &self,
        filter_doc: &Document,
        mut replacement: Document,
    ) -> Result<UpdateResult, DbError> {
        let filter = parse_filter(filter_doc)?;
        let collection_name = self.name();

        let inner = &mut *self.inner.write();
        let mut ids = executor::find_matching_ids(inner, &filter)?;
        ids.truncate(1);
        let Some(id) = ids.into_iter().next() else {
            return Ok(UpdateResult::default());
        };

        let Some(pre) = inner.docs.get(&id).cloned() else {
            return Ok(UpdateResult::default());
        };
        for slot in inner.indexes.values_mut() {
            slot.index.remove_doc(&id, &pre);
        }

        // The replacement keeps the original identity.
        replacement.remove("_id");
        let mut post = Document::new();
        if let Some(original_id) = pre.get("_id") {
            post.set("_id", original_id.clone());
        }
        for (key, value) in replacement.iter() {
            post.set(key, value.clone());
        }

        let Inner {
            docs,
            indexes,
            cache,
            index_skew,
        } = inner;
        for (name, slot) in indexes.iter_mut() {
            if let Err(e) = slot.index.insert_doc(&id, &post) {
                warn!(
                    collection = %collection_name,
                    index = %name,
                    error = %e,
                    "replacement rejected by unique index; entry skipped"
                );
                *index_skew += 1;
            }
        }
        let modified = if post == pre { 0 } else { 1 };
        docs.insert(id.clone(), post.clone());
        cache.invalidate_all();
        self.events.publish(ChangeEvent {
            op: ChangeOp::Update,
            collection: collection_name,
            id,
            doc: Some(post),
        });
        Ok(UpdateResult {
            matched: 1,
            modified,
            upserted_id: None,
        })
    }

    // ── Delete ──────────────────────────────────────────────────

    pub fn delete_one(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        self.delete_with_limit(filter, Some(1))
    }

    pub fn delete_many(&self, filter: &Document) -> Result<DeleteResult, DbError> {
        self.delete_with_limit(filter, None)
    }

    fn delete_with_limit(
        &self,
        filter_doc: &Document,
        limit: Option<usize>,
    ) -> Result<DeleteResult, DbError> {
        let filter = parse_filter(filter_doc)?;
        let collection_name = self.name();

        let inner = &mut *self.inner.write();
        let mut ids = executor::find_matching_ids(inner, &filter)?;
        if let Some(limit) = limit {
            ids.truncate(limit);
        }

        let mut deleted = 0u64;
        for id in &ids {
            if remove_document(inner, id).is_some() {
                deleted += 1;
                self.events.publish(ChangeEvent {
                    op: ChangeOp::Delete,
                    collection: collection_name.clone(),
                    id: id.clone(),
                    doc: None,
                });
            }
        }
        if deleted > 0 {
            inner.cache.invalidate_all();
        }
        Ok(DeleteResult { deleted })
    }

    /// Delete every document whose TTL expiration has passed. Called by
    /// the database sweeper and available directly. Idempotent.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let collection_name = self.name();
        let inner = &mut *self.inner.write();

        let mut expired: Vec<String> = Vec::new();
        for slot in inner.indexes.values() {
            if let Index::Ttl(idx) = &slot.index {
                expired.extend(idx.expired(now));
            }
        }
        expired.sort_unstable();
        expired.dedup();

        let mut removed = 0usize;
        for id in &expired {
            if remove_document(inner, id).is_some() {
                removed += 1;
                self.events.publish(ChangeEvent {
                    op: ChangeOp::Delete,
                    collection: collection_name.clone(),
                    id: id.clone(),
                    doc: None,
                });
            }
        }
        if removed > 0 {
            inner.cache.invalidate_all();
            debug!(collection = %collection_name, removed, "ttl sweep removed expired documents");
        }
        removed
    }

    // ── Text and geo search ─────────────────────────────────────

    /// Full-text search through the text index; results carry
    /// `_textScore` and come back in descending relevance order.
    pub fn text_search(&self, query: &str) -> Result<Vec<Document>, DbError> {
        self.find(&doc! { "$text": { "$search": (query) } })
    }

    /// Proximity search on a geo-indexed point field. Planar indexes take
    /// the distance in coordinate units, spherical ones in meters.
    pub fn near(
        &self,
        field: &str,
        x: f64,
        y: f64,
        max_distance: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, DbError> {
        let inner = self.inner.read();
        let hits = inner
            .indexes
            .values()
            .filter(|slot| slot.state.is_ready())
            .find_map(|slot| match &slot.index {
                Index::Geo2d(idx) if idx.field() == field => {
                    Some(idx.near(x, y, max_distance, limit))
                }
                Index::Geo2dSphere(idx) if idx.field() == field => {
                    Some(idx.near(x, y, max_distance, limit))
                }
                _ => None,
            })
            .ok_or_else(|| DbError::GeoUnavailable(field.to_string()))?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| inner.docs.get(&hit.id).cloned())
            .collect())
    }

    /// Documents whose indexed point lies inside the polygon.
    pub fn geo_within(
        &self,
        field: &str,
        polygon: &[(f64, f64)],
    ) -> Result<Vec<Document>, DbError> {
        self.geo_containment(field, polygon, false)
    }

    /// Documents whose indexed point intersects the polygon (for point
    /// data: containment including the boundary).
    pub fn geo_intersects(
        &self,
        field: &str,
        polygon: &[(f64, f64)],
    ) -> Result<Vec<Document>, DbError> {
        self.geo_containment(field, polygon, true)
    }

    fn geo_containment(
        &self,
        field: &str,
        polygon: &[(f64, f64)],
        intersect: bool,
    ) -> Result<Vec<Document>, DbError> {
        let inner = self.inner.read();
        let ids = inner
            .indexes
            .values()
            .filter(|slot| slot.state.is_ready())
            .find_map(|slot| match &slot.index {
                Index::Geo2d(idx) if idx.field() == field => Some(idx.within(polygon)),
                Index::Geo2dSphere(idx) if idx.field() == field => Some(if intersect {
                    idx.intersects(polygon)
                } else {
                    idx.within(polygon)
                }),
                _ => None,
            })
            .ok_or_else(|| DbError::GeoUnavailable(field.to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| inner.docs.get(id).cloned())
            .collect())
    }

    // ── Index management ────────────────────────────────────────

    /// Create a single-field ordered index and backfill it synchronously.
    pub fn create_index(&self, field: &str, unique: bool) -> Result<String, DbError> {
        let fields = vec![field.to_string()];
        let name = ordered_index_name(&fields);
        self.register_ordered(OrderedIndex::new(name, fields, unique))
    }

    /// Create a compound ordered index over the field list, left to
    /// right.
    pub fn create_compound_index(&self, fields: &[&str], unique: bool) -> Result<String, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidArgument(
                "compound index requires at least one field".into(),
            ));
        }
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let name = ordered_index_name(&fields);
        self.register_ordered(OrderedIndex::new(name, fields, unique))
    }

    /// Create an ordered index, optionally built in the background: the
    /// index is registered immediately in the `Building` state, a
    /// snapshot is taken under the lock, and a worker fills it outside.
    pub fn create_index_with_options(
        &self,
        fields: &[&str],
        options: CreateIndexOptions,
    ) -> Result<String, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidArgument(
                "index requires at least one field".into(),
            ));
        }
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let name = ordered_index_name(&fields);
        let mut idx = OrderedIndex::new(name.clone(), fields, options.unique);
        if let Some(partial) = &options.partial_filter {
            idx = idx.with_partial(parse_filter(partial)?);
        }

        if !options.background {
            return self.register_ordered(idx);
        }

        let snapshot: Vec<(String, IndexKey)> = {
            let inner = &mut *self.inner.write();
            self.check_index_name(inner, &name)?;
            let snapshot = inner
                .docs
                .iter()
                .filter_map(|(id, doc)| idx.key_for(doc).map(|key| (id.clone(), key)))
                .collect::<Vec<_>>();
            inner.indexes.insert(
                name.clone(),
                IndexSlot {
                    index: Index::Ordered(idx),
                    state: IndexState::Building {
                        done: 0,
                        total: snapshot.len(),
                    },
                },
            );
            inner.cache.invalidate_all();
            snapshot
        };

        // The caller necessarily holds an Arc, so the upgrade succeeds;
        // were the collection dropped mid-build the worker would simply
        // find its slot gone.
        if let Some(collection) = self.self_ref.upgrade() {
            let build_name = name.clone();
            std::thread::spawn(move || collection.drain_build_snapshot(build_name, snapshot));
        }
        Ok(name)
    }

    /// Create an ordered index restricted to documents matching a filter.
    pub fn create_partial_index(
        &self,
        field: &str,
        partial_filter: &Document,
        unique: bool,
    ) -> Result<String, DbError> {
        let filter = parse_filter(partial_filter)?;
        let fields = vec![field.to_string()];
        let name = ordered_index_name(&fields);
        self.register_ordered(OrderedIndex::new(name, fields, unique).with_partial(filter))
    }

    /// Create a text index over one or more string fields.
    pub fn create_text_index(&self, fields: &[&str], stemming: bool) -> Result<String, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidArgument(
                "text index requires at least one field".into(),
            ));
        }
        let name = format!("{}_text", fields.join("_"));
        let owned: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut idx = TextIndex::new(name.clone(), owned, stemming);
        self.register_filled(&name, move |inner| {
            for (id, doc) in &inner.docs {
                idx.insert_doc(id, doc);
            }
            Index::Text(idx)
        })
    }

    /// Create a planar grid index over a point field.
    pub fn create_2d_index(&self, field: &str) -> Result<String, DbError> {
        let name = format!("{field}_2d");
        let mut idx = Geo2dIndex::new(name.clone(), field, DEFAULT_CELL_SIZE);
        self.register_filled(&name, move |inner| {
            for (id, doc) in &inner.docs {
                idx.insert_doc(id, doc);
            }
            Index::Geo2d(idx)
        })
    }

    /// Create a geohash-cell index over a point field; distances in
    /// meters.
    pub fn create_2dsphere_index(&self, field: &str) -> Result<String, DbError> {
        let name = format!("{field}_2dsphere");
        let mut idx = Geo2dSphereIndex::new(name.clone(), field, DEFAULT_PRECISION);
        self.register_filled(&name, move |inner| {
            for (id, doc) in &inner.docs {
                idx.insert_doc(id, doc);
            }
            Index::Geo2dSphere(idx)
        })
    }

    /// Create a TTL index: documents expire `offset_secs` after the
    /// timestamp stored in `field`.
    pub fn create_ttl_index(&self, field: &str, offset_secs: i64) -> Result<String, DbError> {
        let name = format!("{field}_ttl");
        let mut idx = TtlIndex::new(name.clone(), field, offset_secs);
        self.register_filled(&name, move |inner| {
            for (id, doc) in &inner.docs {
                idx.insert_doc(id, doc);
            }
            Index::Ttl(idx)
        })
    }

    /// Drop an index by name. The `_id_` index is immortal.
    pub fn drop_index(&self, name: &str) -> Result<(), DbError> {
        if name == "_id_" {
            return Err(DbError::IndexConflict("cannot drop _id_".into()));
        }
        let inner = &mut *self.inner.write();
        inner
            .indexes
            .remove(name)
            .ok_or_else(|| DbError::NotFound(format!("index {name}")))?;
        inner.cache.invalidate_all();
        Ok(())
    }

    /// Every index with its class, state, and entry count. The implicit
    /// `_id_` index always leads.
    pub fn list_indexes(&self) -> Vec<IndexInfo> {
        let inner = self.inner.read();
        let mut out = vec![IndexInfo {
            name: "_id_".to_string(),
            kind: "btree".to_string(),
            unique: true,
            entries: inner.docs.len(),
            state: "ready".to_string(),
        }];
        for slot in inner.indexes.values() {
            out.push(IndexInfo {
                name: slot.index.name().to_string(),
                kind: slot.index.kind().to_string(),
                unique: match &slot.index {
                    Index::Ordered(idx) => idx.is_unique(),
                    _ => false,
                },
                entries: slot.index.entry_count(),
                state: state_label(&slot.state),
            });
        }
        out
    }

    pub fn stats(&self) -> CollectionStats {
        let indexes = self.list_indexes();
        let inner = self.inner.read();
        CollectionStats {
            name: self.name(),
            doc_count: inner.docs.len(),
            index_count: indexes.len(),
            indexes,
            cache: inner.cache.stats(),
            index_skew: inner.index_skew,
        }
    }

    // ── Internals ───────────────────────────────────────────────

    fn check_index_name(&self, inner: &Inner, name: &str) -> Result<(), DbError> {
        if name == "_id_" || inner.indexes.contains_key(name) {
            return Err(DbError::IndexConflict(name.to_string()));
        }
        Ok(())
    }

    /// Synchronous ordered-index registration: backfill under the lock,
    /// register only if the whole backfill succeeds.
    fn register_ordered(&self, mut idx: OrderedIndex) -> Result<String, DbError> {
        let name = idx.name().to_string();
        let inner = &mut *self.inner.write();
        self.check_index_name(inner, &name)?;
        for (id, doc) in &inner.docs {
            idx.insert_doc(id, doc)?;
        }
        inner.indexes.insert(
            name.clone(),
            IndexSlot {
                index: Index::Ordered(idx),
                state: IndexState::Ready,
            },
        );
        inner.cache.invalidate_all();
        Ok(name)
    }

    /// Fill the snapshot into a background-built index in batches, taking
    /// the write lock per batch so concurrent writes interleave. Entries
    /// the normal write path already changed are skipped; a duplicate on
    /// a unique index fails the build.
    fn drain_build_snapshot(&self, name: String, snapshot: Vec<(String, IndexKey)>) {
        const BATCH: usize = 256;
        let total = snapshot.len();
        let mut done = 0usize;

        for chunk in snapshot.chunks(BATCH) {
            let inner = &mut *self.inner.write();
            let Inner { docs, indexes, .. } = inner;
            let Some(slot) = indexes.get_mut(&name) else {
                return; // dropped mid-build
            };
            if !matches!(slot.state, IndexState::Building { .. }) {
                return;
            }
            let Index::Ordered(idx) = &mut slot.index else {
                return;
            };

            for (id, key) in chunk {
                // Anything inserted, updated, or deleted after the
                // snapshot is owned by the normal maintenance path.
                match docs.get(id).and_then(|doc| idx.key_for(doc)) {
                    Some(current) if current == *key => {}
                    _ => continue,
                }
                if let Err(e) = idx.insert_key(key.clone(), id) {
                    warn!(index = %name, error = %e, "background index build failed");
                    slot.state = IndexState::Failed {
                        reason: e.to_string(),
                    };
                    return;
                }
            }
            done += chunk.len();
            slot.state = IndexState::Building {
                done: done.min(total),
                total,
            };
        }

        let inner = &mut *self.inner.write();
        let mut completed = false;
        if let Some(slot) = inner.indexes.get_mut(&name) {
            if matches!(slot.state, IndexState::Building { .. }) {
                slot.state = IndexState::Ready;
                completed = true;
            }
        }
        if completed {
            inner.cache.invalidate_all();
            info!(index = %name, total, "background index build complete");
        }
    }

    /// Register a non-ordered index class, filled synchronously under
    /// the lock. The name check runs first so a collision never fills.
    fn register_filled(
        &self,
        name: &str,
        fill: impl FnOnce(&Inner) -> Index,
    ) -> Result<String, DbError> {
        let inner = &mut *self.inner.write();
        self.check_index_name(inner, name)?;
        let index = fill(inner);
        inner.indexes.insert(
            name.to_string(),
            IndexSlot {
                index,
                state: IndexState::Ready,
            },
        );
        inner.cache.invalidate_all();
        Ok(name.to_string())
    }
}

/// Top-level equality fields of a filter document, used as the starting
/// point for an upserted document.
fn equality_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in filter.iter() {
        if key.starts_with('$') {
            continue;
        }
        if let Value::Document(sub) = value {
            if sub.keys().next().is_some_and(|k| k.starts_with('$')) {
                continue;
            }
        }
        seed.set(key, value.clone());
    }
    seed
}

/// Remove a document and its contributions to every index.
fn remove_document(inner: &mut Inner, id: &str) -> Option<Document> {
    let doc = inner.docs.remove(id)?;
    for slot in inner.indexes.values_mut() {
        slot.index.remove_doc(id, &doc);
    }
    Some(doc)
}

fn ordered_index_name(fields: &[String]) -> String {
    format!("{}_1", fields.join("_"))
}

fn state_label(state: &IndexState) -> String {
    match state {
        IndexState::Ready => "ready".to_string(),
        IndexState::Building { done, total } => format!("building({done}/{total})"),
        IndexState::Failed { reason } => format!("failed: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Arc<Collection> {
        Collection::new(
            "test",
            Arc::new(ObjectIdGenerator::new()),
            100,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn insert_assigns_object_id_when_missing() {
        let coll = collection();
        let result = coll.insert_one(doc! { "name": "x" }).unwrap();
        assert_eq!(result.id.len(), 24);
        let found = coll.find_one(&doc! { "name": "x" }).unwrap().unwrap();
        assert!(matches!(found.get("_id"), Some(Value::ObjectId(_))));
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let coll = collection();
        coll.insert_one(doc! { "_id": "a" }).unwrap();
        assert!(matches!(
            coll.insert_one(doc! { "_id": "a" }),
            Err(DbError::DuplicateKey(_))
        ));
        assert_eq!(coll.doc_count(), 1);
    }

    #[test]
    fn unique_violation_rolls_back_other_indexes() {
        let coll = collection();
        coll.create_index("email", true).unwrap();
        coll.create_index("team", false).unwrap();

        coll.insert_one(doc! { "_id": "a", "email": "a@x", "team": "core" })
            .unwrap();
        let err = coll
            .insert_one(doc! { "_id": "b", "email": "a@x", "team": "core" })
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey(_)));

        // The doc is gone and both indexes reflect exactly one document.
        assert_eq!(coll.doc_count(), 1);
        let stats = coll.stats();
        for idx in stats.indexes.iter().filter(|i| i.name != "_id_") {
            assert_eq!(idx.entries, 1, "{}", idx.name);
        }
    }

    #[test]
    fn update_duplicate_on_unique_index_is_skipped_and_counted() {
        let coll = collection();
        coll.create_index("email", true).unwrap();
        coll.insert_one(doc! { "_id": "a", "email": "a@x" }).unwrap();
        coll.insert_one(doc! { "_id": "b", "email": "b@x" }).unwrap();

        // Updating b's email to collide: the update stands, the index
        // entry is skipped, the skew counter moves.
        let result = coll
            .update_one(&doc! { "_id": "b" }, &doc! { "$set": { "email": "a@x" } })
            .unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.modified, 1);

        let found = coll.find_one(&doc! { "_id": "b" }).unwrap().unwrap();
        assert_eq!(found.get_str("email"), Some("a@x"));
        assert_eq!(coll.stats().index_skew, 1);
    }

    #[test]
    fn index_name_conflicts() {
        let coll = collection();
        coll.create_index("k", false).unwrap();
        assert!(matches!(
            coll.create_index("k", false),
            Err(DbError::IndexConflict(_))
        ));
        assert!(matches!(
            coll.drop_index("_id_"),
            Err(DbError::IndexConflict(_))
        ));
    }

    #[test]
    fn find_read_your_write() {
        let coll = collection();
        coll.insert_one(doc! { "_id": "a", "n": 1 }).unwrap();
        assert_eq!(coll.find(&doc! { "n": 1 }).unwrap().len(), 1);
        coll.update_one(&doc! { "_id": "a" }, &doc! { "$inc": { "n": 1 } })
            .unwrap();
        assert!(coll.find(&doc! { "n": 1 }).unwrap().is_empty());
        assert_eq!(coll.find(&doc! { "n": 2 }).unwrap().len(), 1);
    }
}
