mod common;
use common::*;

use basalt_db::doc;

#[test]
fn delete_then_find_returns_empty() {
    let db = memory_db();
    let coll = seed_accounts(&db);

    let result = coll.delete_one(&doc! { "_id": "acct-3" }).unwrap();
    assert_eq!(result.deleted, 1);
    assert!(coll.find(&doc! { "_id": "acct-3" }).unwrap().is_empty());
    assert_eq!(coll.count(&doc! {}).unwrap(), 4);
}

#[test]
fn delete_many_removes_every_match() {
    let db = memory_db();
    let coll = seed_accounts(&db);

    let result = coll.delete_many(&doc! { "status": "active" }).unwrap();
    assert_eq!(result.deleted, 3);
    assert_eq!(coll.count(&doc! {}).unwrap(), 2);
}

#[test]
fn delete_one_removes_only_the_first_match() {
    let db = memory_db();
    let coll = seed_accounts(&db);

    let result = coll.delete_one(&doc! { "status": "active" }).unwrap();
    assert_eq!(result.deleted, 1);
    assert_eq!(coll.count(&doc! { "status": "active" }).unwrap(), 2);
}

#[test]
fn delete_without_matches_deletes_nothing() {
    let db = memory_db();
    let coll = seed_accounts(&db);
    let result = coll.delete_many(&doc! { "status": "ghost" }).unwrap();
    assert_eq!(result.deleted, 0);
    assert_eq!(coll.count(&doc! {}).unwrap(), 5);
}
