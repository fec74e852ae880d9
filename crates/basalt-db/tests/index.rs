mod common;
use common::*;

use basalt_db::{DbError, doc};

// ── Unique index ────────────────────────────────────────────────

#[test]
fn unique_index_rejects_duplicates() {
    let db = memory_db();
    let coll = db.collection("u");
    coll.create_index("email", true).unwrap();

    coll.insert_one(doc! { "email": "a@x" }).unwrap();
    let err = coll.insert_one(doc! { "email": "a@x" }).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey(_)));
    assert_eq!(coll.count(&doc! {}).unwrap(), 1);
}

#[test]
fn unique_backfill_fails_on_existing_duplicates() {
    let db = memory_db();
    let coll = db.collection("u");
    coll.insert_one(doc! { "email": "a@x" }).unwrap();
    coll.insert_one(doc! { "email": "a@x" }).unwrap();

    assert!(matches!(
        coll.create_index("email", true),
        Err(DbError::DuplicateKey(_))
    ));
    // The failed index is not registered.
    assert_eq!(coll.list_indexes().len(), 1);
}

// ── Compound index ──────────────────────────────────────────────

#[test]
fn compound_index_serves_prefix_query() {
    let db = memory_db();
    let coll = db.collection("people");
    coll.create_compound_index(&["country", "age"], false).unwrap();
    coll.insert_many(vec![
        doc! { "_id": "us30", "country": "US", "age": 30 },
        doc! { "_id": "us40", "country": "US", "age": 40 },
        doc! { "_id": "de30", "country": "DE", "age": 30 },
        doc! { "_id": "de50", "country": "DE", "age": 50 },
    ])
    .unwrap();

    let explain = coll.explain(&doc! { "country": "US" }).unwrap();
    assert_eq!(explain.plan, "index_scan");
    assert_eq!(explain.index.as_deref(), Some("country_age_1"));

    let us = coll.find(&doc! { "country": "US" }).unwrap();
    assert_eq!(sorted_ids(&us), vec!["us30", "us40"]);
}

#[test]
fn compound_index_prefix_plus_range() {
    let db = memory_db();
    let coll = db.collection("people");
    coll.create_compound_index(&["country", "age"], false).unwrap();
    coll.insert_many(vec![
        doc! { "_id": "de30", "country": "DE", "age": 30 },
        doc! { "_id": "de50", "country": "DE", "age": 50 },
        doc! { "_id": "us40", "country": "US", "age": 40 },
    ])
    .unwrap();

    let hits = coll
        .find(&doc! { "country": "DE", "age": { "$gte": 40 } })
        .unwrap();
    assert_eq!(sorted_ids(&hits), vec!["de50"]);
}

// ── Partial index ───────────────────────────────────────────────

#[test]
fn partial_index_under_approximation_falls_back_to_scan() {
    let db = memory_db();
    let coll = db.collection("scores");
    coll.create_partial_index("score", &doc! { "active": true }, false)
        .unwrap();
    coll.insert_one(doc! { "_id": "a", "score": 1, "active": true })
        .unwrap();
    coll.insert_one(doc! { "_id": "b", "score": 2, "active": false })
        .unwrap();

    // Only the active document contributed an entry.
    let info = coll
        .list_indexes()
        .into_iter()
        .find(|i| i.name == "score_1")
        .unwrap();
    assert_eq!(info.kind, "partial");
    assert_eq!(info.entries, 1);

    // The filter does not imply the partial predicate: scan fallback
    // still finds the inactive document.
    let explain = coll.explain(&doc! { "score": 2 }).unwrap();
    assert_eq!(explain.plan, "collection_scan");
    let hits = coll.find(&doc! { "score": 2 }).unwrap();
    assert_eq!(sorted_ids(&hits), vec!["b"]);
}

#[test]
fn partial_index_used_when_filter_implies_it() {
    let db = memory_db();
    let coll = db.collection("scores");
    coll.create_partial_index("score", &doc! { "active": true }, false)
        .unwrap();
    coll.insert_one(doc! { "_id": "a", "score": 1, "active": true })
        .unwrap();
    coll.insert_one(doc! { "_id": "b", "score": 1, "active": false })
        .unwrap();

    let explain = coll.explain(&doc! { "score": 1, "active": true }).unwrap();
    assert_eq!(explain.plan, "index_scan");
    assert_eq!(explain.index.as_deref(), Some("score_1"));

    let hits = coll.find(&doc! { "score": 1, "active": true }).unwrap();
    assert_eq!(sorted_ids(&hits), vec!["a"]);
}

// ── Maintenance on writes ───────────────────────────────────────

#[test]
fn index_maintained_across_update_and_delete() {
    let db = memory_db();
    let coll = db.collection("users");
    coll.create_index("status", false).unwrap();
    coll.insert_many(vec![
        doc! { "_id": "a", "status": "active" },
        doc! { "_id": "b", "status": "active" },
    ])
    .unwrap();

    coll.update_one(&doc! { "_id": "a" }, &doc! { "$set": { "status": "done" } })
        .unwrap();
    let active = coll.find(&doc! { "status": "active" }).unwrap();
    assert_eq!(sorted_ids(&active), vec!["b"]);
    let done = coll.find(&doc! { "status": "done" }).unwrap();
    assert_eq!(sorted_ids(&done), vec!["a"]);

    coll.delete_one(&doc! { "_id": "b" }).unwrap();
    assert!(coll.find(&doc! { "status": "active" }).unwrap().is_empty());
}

#[test]
fn documents_missing_the_field_are_not_indexed() {
    let db = memory_db();
    let coll = db.collection("users");
    coll.create_index("email", false).unwrap();
    coll.insert_one(doc! { "_id": "no-email", "name": "x" }).unwrap();
    coll.insert_one(doc! { "_id": "null-email", "email": null }).unwrap();

    let info = coll
        .list_indexes()
        .into_iter()
        .find(|i| i.name == "email_1")
        .unwrap();
    // Explicit null is indexed, missing is not.
    assert_eq!(info.entries, 1);

    let null_hits = coll.find(&doc! { "email": null }).unwrap();
    assert_eq!(sorted_ids(&null_hits), vec!["null-email"]);
}

// ── Drop and listing ────────────────────────────────────────────

#[test]
fn list_and_drop_indexes() {
    let db = memory_db();
    let coll = db.collection("users");
    coll.create_index("status", false).unwrap();

    let names: Vec<String> = coll.list_indexes().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["_id_", "status_1"]);

    coll.drop_index("status_1").unwrap();
    assert_eq!(coll.list_indexes().len(), 1);
    assert!(matches!(
        coll.drop_index("status_1"),
        Err(DbError::NotFound(_))
    ));
    assert!(matches!(
        coll.drop_index("_id_"),
        Err(DbError::IndexConflict(_))
    ));
}

#[test]
fn duplicate_index_name_conflicts() {
    let db = memory_db();
    let coll = db.collection("users");
    coll.create_index("status", false).unwrap();
    assert!(matches!(
        coll.create_index("status", true),
        Err(DbError::IndexConflict(_))
    ));
}

#[test]
fn equality_beats_range_and_ties_break_on_name() {
    let db = memory_db();
    let coll = db.collection("events");
    coll.create_index("kind", false).unwrap();
    coll.create_index("at", false).unwrap();
    for i in 0..10i64 {
        coll.insert_one(doc! { "kind": "k", "at": (i) }).unwrap();
    }

    // Equality on `kind` outranks the range on `at`.
    let explain = coll
        .explain(&doc! { "kind": "k", "at": { "$gt": 5 } })
        .unwrap();
    assert_eq!(explain.index.as_deref(), Some("kind_1"));
    assert_eq!(explain.candidates, vec!["kind_1", "at_1"]);

    // Two equality candidates tie; the lexicographically first index
    // name wins for determinism.
    let explain = coll.explain(&doc! { "kind": "k", "at": 3 }).unwrap();
    assert_eq!(explain.index.as_deref(), Some("at_1"));
}
