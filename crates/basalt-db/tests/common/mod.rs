#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use basalt_db::{Collection, Database, DatabaseConfig, doc};

/// A database with background sweepers disabled, so tests drive TTL and
/// cursor expiry explicitly.
pub fn memory_db() -> Database {
    Database::open(DatabaseConfig {
        ttl_sweep_interval: Duration::ZERO,
        cursor_sweep_interval: Duration::ZERO,
        ..DatabaseConfig::default()
    })
}

pub const COLLECTION: &str = "accounts";

/// Insert 5 seed records.
pub fn seed_accounts(db: &Database) -> Arc<Collection> {
    let coll = db.collection(COLLECTION);
    coll.insert_many(vec![
        doc! { "_id": "acct-1", "name": "Acme Corp", "revenue": 50000.0, "status": "active", "active": true },
        doc! { "_id": "acct-2", "name": "Globex", "revenue": 80000.0, "status": "snoozed", "active": true },
        doc! { "_id": "acct-3", "name": "Initech", "revenue": 12000.0, "status": "rejected", "active": false },
        doc! { "_id": "acct-4", "name": "Umbrella", "revenue": 95000.0, "status": "active", "active": true },
        doc! { "_id": "acct-5", "name": "Stark Industries", "revenue": 200000.0, "status": "active", "active": false },
    ])
    .unwrap();
    coll
}

/// Ids of a result set, in result order.
pub fn ids(docs: &[basalt_db::Document]) -> Vec<String> {
    docs.iter().filter_map(|d| d.id_string()).collect()
}

/// Ids of a result set, sorted for order-insensitive comparison.
pub fn sorted_ids(docs: &[basalt_db::Document]) -> Vec<String> {
    let mut out = ids(docs);
    out.sort();
    out
}
