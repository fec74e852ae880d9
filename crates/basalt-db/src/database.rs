use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use basalt_core::{Document, ObjectIdGenerator};
use basalt_query::FindOptions;
use parking_lot::{Mutex, RwLock};

use crate::collection::Collection;
use crate::config::DatabaseConfig;
use crate::cursor::CursorManager;
use crate::error::DbError;
use crate::sweep::{self, SweeperHandle};

struct Shared {
    config: DatabaseConfig,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    oid: Arc<ObjectIdGenerator>,
    cursors: Arc<CursorManager>,
}

/// The root of one database instance: a named collection registry, the
/// cursor manager, and the background sweepers.
///
/// All state is instance-level — two databases in one process share
/// nothing, including the ObjectId generator.
pub struct Database {
    shared: Arc<Shared>,
    sweepers: Mutex<Vec<SweeperHandle>>,
}

impl Database {
    /// Open a database and start the TTL and cursor sweepers per the
    /// configured intervals.
    pub fn open(config: DatabaseConfig) -> Database {
        let shared = Arc::new(Shared {
            collections: RwLock::new(HashMap::new()),
            oid: Arc::new(ObjectIdGenerator::new()),
            cursors: Arc::new(CursorManager::new()),
            config,
        });

        let mut sweepers = Vec::new();

        let ttl_shared = Arc::clone(&shared);
        if let Some(handle) = sweep::spawn("ttl", shared.config.ttl_sweep_interval, move || {
            let collections: Vec<Arc<Collection>> =
                ttl_shared.collections.read().values().cloned().collect();
            for collection in collections {
                collection.cleanup_expired();
            }
        }) {
            sweepers.push(handle);
        }

        let cursors = Arc::clone(&shared.cursors);
        if let Some(handle) = sweep::spawn("cursor", shared.config.cursor_sweep_interval, move || {
            cursors.sweep();
        }) {
            sweepers.push(handle);
        }

        Database {
            shared,
            sweepers: Mutex::new(sweepers),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.shared.config
    }

    /// Get or lazily create a collection.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(collection) = self.shared.collections.read().get(name) {
            return Arc::clone(collection);
        }
        let mut map = self.shared.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| {
            Collection::new(
                name,
                Arc::clone(&self.shared.oid),
                self.shared.config.query_cache_size,
                self.shared.config.query_cache_ttl,
            )
        }))
    }

    /// Idempotent explicit creation; same handle as [`collection`].
    ///
    /// [`collection`]: Database::collection
    pub fn create_collection(&self, name: &str) -> Arc<Collection> {
        self.collection(name)
    }

    /// Drop a collection with all its documents and indexes.
    pub fn drop_collection(&self, name: &str) -> Result<(), DbError> {
        self.shared
            .collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("collection {name}")))
    }

    /// Rename a collection. Fails when the target name is taken.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<(), DbError> {
        let mut map = self.shared.collections.write();
        if map.contains_key(new) {
            return Err(DbError::InvalidArgument(format!(
                "collection {new} already exists"
            )));
        }
        let collection = map
            .remove(old)
            .ok_or_else(|| DbError::NotFound(format!("collection {old}")))?;
        collection.set_name(new.to_string());
        map.insert(new.to_string(), collection);
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.collections.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn cursor_manager(&self) -> Arc<CursorManager> {
        Arc::clone(&self.shared.cursors)
    }

    /// Execute a find and register the result snapshot as a server-side
    /// cursor. Returns the cursor id.
    pub fn open_cursor(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<u64, DbError> {
        let docs = self
            .collection(collection)
            .find_with_options(filter, options)?;
        Ok(self
            .shared
            .cursors
            .open(collection, docs, batch_size, timeout))
    }

    /// Stop the sweepers and release the registry. Dropping the value
    /// does the same.
    pub fn close(self) {}
}

impl Drop for Database {
    fn drop(&mut self) {
        for handle in self.sweepers.lock().iter_mut() {
            handle.stop();
        }
    }
}
