mod common;
use common::*;

use basalt_db::{ChangeOp, doc};

#[test]
fn mutations_publish_in_write_order() {
    let db = memory_db();
    let coll = db.collection("feed");
    let rx = coll.watch();

    coll.insert_one(doc! { "_id": "a", "n": 1 }).unwrap();
    coll.update_one(&doc! { "_id": "a" }, &doc! { "$inc": { "n": 1 } })
        .unwrap();
    coll.delete_one(&doc! { "_id": "a" }).unwrap();

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].op, ChangeOp::Insert);
    assert_eq!(events[0].id, "a");
    assert_eq!(
        events[0].doc.as_ref().unwrap().get_i64("n"),
        Some(1)
    );

    assert_eq!(events[1].op, ChangeOp::Update);
    // Update events carry the post-image.
    assert_eq!(
        events[1].doc.as_ref().unwrap().get_i64("n"),
        Some(2)
    );

    assert_eq!(events[2].op, ChangeOp::Delete);
    assert!(events[2].doc.is_none());
}

#[test]
fn update_many_publishes_per_document() {
    let db = memory_db();
    let coll = seed_accounts(&db);
    let rx = coll.watch();

    coll.update_many(&doc! { "status": "active" }, &doc! { "$set": { "seen": true } })
        .unwrap();
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.op == ChangeOp::Update));
}

#[test]
fn ttl_sweep_publishes_deletes() {
    let db = memory_db();
    let coll = db.collection("sessions");
    coll.create_ttl_index("expireAt", 0).unwrap();
    let stale = basalt_db::Utc::now() - chrono::Duration::seconds(30);
    coll.insert_one(doc! { "_id": "gone", "expireAt": (stale) })
        .unwrap();

    let rx = coll.watch();
    coll.cleanup_expired();

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].op, ChangeOp::Delete);
    assert_eq!(events[0].id, "gone");
}

#[test]
fn failed_insert_publishes_nothing() {
    let db = memory_db();
    let coll = db.collection("users");
    coll.create_index("email", true).unwrap();
    coll.insert_one(doc! { "email": "a@x" }).unwrap();

    let rx = coll.watch();
    let _ = coll.insert_one(doc! { "email": "a@x" });
    assert_eq!(rx.try_iter().count(), 0);
}

#[test]
fn multiple_subscribers_see_the_same_stream() {
    let db = memory_db();
    let coll = db.collection("feed");
    let rx1 = coll.watch();
    let rx2 = coll.watch();

    coll.insert_one(doc! { "_id": "x" }).unwrap();
    assert_eq!(rx1.try_iter().count(), 1);
    assert_eq!(rx2.try_iter().count(), 1);
}
