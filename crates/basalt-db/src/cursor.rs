use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use basalt_core::Document;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::DbError;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Registry of server-side paged result handles.
///
/// Results are captured once at creation (a consistent snapshot); each
/// fetch advances an offset and refreshes the idle deadline. A sweeper
/// closes cursors whose deadline has passed.
#[derive(Debug, Default)]
pub struct CursorManager {
    cursors: Mutex<HashMap<u64, CursorState>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct CursorState {
    collection: String,
    docs: Vec<Document>,
    offset: usize,
    batch_size: usize,
    timeout: Duration,
    deadline: Instant,
}

impl CursorManager {
    pub fn new() -> CursorManager {
        CursorManager::default()
    }

    /// Register a snapshot and hand back the cursor id.
    pub fn open(
        &self,
        collection: impl Into<String>,
        docs: Vec<Document>,
        batch_size: usize,
        timeout: Duration,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        self.cursors.lock().insert(
            id,
            CursorState {
                collection: collection.into(),
                docs,
                offset: 0,
                batch_size,
                timeout,
                deadline: Instant::now() + timeout,
            },
        );
        id
    }

    /// The next batch plus a has-more flag. Exhausted cursors close
    /// themselves; expired ones error and close.
    pub fn next_batch(&self, id: u64) -> Result<(Vec<Document>, bool), DbError> {
        let mut cursors = self.cursors.lock();
        let cursor = cursors.get_mut(&id).ok_or(DbError::CursorUnknown(id))?;

        if Instant::now() > cursor.deadline {
            cursors.remove(&id);
            return Err(DbError::CursorExpired(id));
        }

        let start = cursor.offset;
        let end = (start + cursor.batch_size).min(cursor.docs.len());
        let batch = cursor.docs[start..end].to_vec();
        cursor.offset = end;
        cursor.deadline = Instant::now() + cursor.timeout;

        let has_more = end < cursor.docs.len();
        if !has_more {
            cursors.remove(&id);
        }
        Ok((batch, has_more))
    }

    pub fn close(&self, id: u64) -> Result<(), DbError> {
        match self.cursors.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(DbError::CursorUnknown(id)),
        }
    }

    /// Drop every cursor whose idle deadline has passed. Returns how many
    /// were closed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut cursors = self.cursors.lock();
        let before = cursors.len();
        cursors.retain(|_, c| c.deadline >= now);
        let closed = before - cursors.len();
        if closed > 0 {
            debug!(closed, "cursor sweep closed expired cursors");
        }
        closed
    }

    pub fn open_cursor_count(&self) -> usize {
        self.cursors.lock().len()
    }

    /// The collection a cursor was opened against, if it is still live.
    pub fn cursor_collection(&self, id: u64) -> Option<String> {
        self.cursors.lock().get(&id).map(|c| c.collection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::doc;

    fn docs(n: usize) -> Vec<Document> {
        (0..n).map(|i| doc! { "i": (i as i64) }).collect()
    }

    #[test]
    fn batches_advance_and_exhaust() {
        let mgr = CursorManager::new();
        let id = mgr.open("c", docs(5), 2, Duration::from_secs(60));

        let (batch, more) = mgr.next_batch(id).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(more);
        let (batch, more) = mgr.next_batch(id).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(more);
        let (batch, more) = mgr.next_batch(id).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(!more);

        // Exhaustion closes the cursor.
        assert!(matches!(
            mgr.next_batch(id),
            Err(DbError::CursorUnknown(_))
        ));
    }

    #[test]
    fn close_frees_the_handle() {
        let mgr = CursorManager::new();
        let id = mgr.open("c", docs(3), 10, Duration::from_secs(60));
        mgr.close(id).unwrap();
        assert!(matches!(mgr.close(id), Err(DbError::CursorUnknown(_))));
    }

    #[test]
    fn expired_cursor_errors() {
        let mgr = CursorManager::new();
        let id = mgr.open("c", docs(3), 10, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            mgr.next_batch(id),
            Err(DbError::CursorExpired(_))
        ));
        assert_eq!(mgr.open_cursor_count(), 0);
    }

    #[test]
    fn sweep_closes_only_expired() {
        let mgr = CursorManager::new();
        let _stale = mgr.open("c", docs(1), 10, Duration::ZERO);
        let live = mgr.open("c", docs(1), 10, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mgr.sweep(), 1);
        assert_eq!(mgr.open_cursor_count(), 1);
        assert!(mgr.cursor_collection(live).is_some());
    }

    #[test]
    fn zero_batch_size_uses_default() {
        let mgr = CursorManager::new();
        let id = mgr.open("c", docs(3), 0, Duration::from_secs(60));
        let (batch, more) = mgr.next_batch(id).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(!more);
    }
}
