mod common;
use common::*;

use basalt_db::{DateTime, Utc, doc};
use chrono::Duration;

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(offset_secs)
}

#[test]
fn sweep_deletes_only_expired_documents() {
    let db = memory_db();
    let coll = db.collection("sessions");
    coll.create_ttl_index("expireAt", 0).unwrap();

    coll.insert_one(doc! { "_id": "stale", "expireAt": (at(-10)) })
        .unwrap();
    coll.insert_one(doc! { "_id": "fresh", "expireAt": (at(60)) })
        .unwrap();

    assert_eq!(coll.cleanup_expired(), 1);
    assert_eq!(coll.count(&doc! {}).unwrap(), 1);
    let remaining = coll.find(&doc! {}).unwrap();
    assert_eq!(ids(&remaining), vec!["fresh"]);
}

#[test]
fn sweep_is_idempotent() {
    let db = memory_db();
    let coll = db.collection("sessions");
    coll.create_ttl_index("expireAt", 0).unwrap();
    coll.insert_one(doc! { "expireAt": (at(-10)) }).unwrap();

    assert_eq!(coll.cleanup_expired(), 1);
    assert_eq!(coll.cleanup_expired(), 0);
}

#[test]
fn offset_shifts_the_expiration_instant() {
    let db = memory_db();
    let coll = db.collection("sessions");
    // Expire one hour after the stored timestamp.
    coll.create_ttl_index("createdAt", 3600).unwrap();

    coll.insert_one(doc! { "_id": "old", "createdAt": (at(-7200)) })
        .unwrap();
    coll.insert_one(doc! { "_id": "recent", "createdAt": (at(-60)) })
        .unwrap();

    assert_eq!(coll.cleanup_expired(), 1);
    assert_eq!(ids(&coll.find(&doc! {}).unwrap()), vec!["recent"]);
}

#[test]
fn documents_without_the_field_never_expire() {
    let db = memory_db();
    let coll = db.collection("sessions");
    coll.create_ttl_index("expireAt", 0).unwrap();
    coll.insert_one(doc! { "_id": "permanent" }).unwrap();
    coll.insert_one(doc! { "_id": "text-stamp", "expireAt": "yesterday" })
        .unwrap();

    assert_eq!(coll.cleanup_expired(), 0);
    assert_eq!(coll.count(&doc! {}).unwrap(), 2);
}

#[test]
fn updates_move_documents_between_buckets() {
    let db = memory_db();
    let coll = db.collection("sessions");
    coll.create_ttl_index("expireAt", 0).unwrap();
    coll.insert_one(doc! { "_id": "a", "expireAt": (at(-10)) }).unwrap();

    // Push the expiration into the future before sweeping.
    coll.update_one(&doc! { "_id": "a" }, &doc! { "$set": { "expireAt": (at(120)) } })
        .unwrap();
    assert_eq!(coll.cleanup_expired(), 0);
    assert_eq!(coll.count(&doc! {}).unwrap(), 1);
}
