use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use basalt_core::{Document, Value};
use basalt_query::{FindOptions, ProjectionMode, SortDirection};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

/// Per-collection bounded LRU of materialized result lists.
///
/// Keyed by a canonical fingerprint of the whole read request. Any write
/// to the owning collection clears the cache wholesale; the entry TTL
/// additionally bounds staleness.
#[derive(Debug)]
pub(crate) struct QueryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    stats: Mutex<CacheCounters>,
}

#[derive(Debug)]
struct CacheEntry {
    results: Vec<Document>,
    stored_at: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
struct CacheCounters {
    hits: u64,
    misses: u64,
    invalidations: u64,
}

/// Cache counters exposed through collection stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl QueryCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> QueryCache {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        QueryCache {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheCounters::default()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<Document>> {
        let mut entries = self.entries.lock();
        let hit = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.results.clone()),
            Some(_) => None, // present but past its TTL
            None => {
                self.stats.lock().misses += 1;
                return None;
            }
        };
        match hit {
            Some(results) => {
                self.stats.lock().hits += 1;
                Some(results)
            }
            None => {
                entries.pop(key);
                self.stats.lock().misses += 1;
                None
            }
        }
    }

    pub(crate) fn store(&self, key: String, results: Vec<Document>) {
        self.entries.lock().put(
            key,
            CacheEntry {
                results,
                stored_at: Instant::now(),
            },
        );
    }

    pub(crate) fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        if entries.len() > 0 {
            entries.clear();
            self.stats.lock().invalidations += 1;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let counters = *self.stats.lock();
        CacheStats {
            entries: self.len(),
            hits: counters.hits,
            misses: counters.misses,
            invalidations: counters.invalidations,
        }
    }
}

/// Canonical fingerprint of `(filter, sort, skip, limit, projection)`.
/// Mapping keys are rendered sorted, so semantically equal requests
/// written in different field orders share an entry.
pub(crate) fn fingerprint(filter: &Document, options: &FindOptions) -> String {
    let mut out = String::with_capacity(64);
    out.push_str("f=");
    out.push_str(&Value::Document(filter.clone()).canonical());

    out.push_str(";s=");
    for sort in &options.sort {
        out.push_str(&sort.field);
        out.push(match sort.direction {
            SortDirection::Asc => '+',
            SortDirection::Desc => '-',
        });
    }

    out.push_str(";k=");
    if let Some(skip) = options.skip {
        out.push_str(&skip.to_string());
    }
    out.push_str(";l=");
    if let Some(limit) = options.limit {
        out.push_str(&limit.to_string());
    }

    out.push_str(";p=");
    if let Some(projection) = &options.projection {
        out.push(match projection.mode {
            ProjectionMode::Include => 'i',
            ProjectionMode::Exclude => 'e',
        });
        out.push(if projection.include_id { '1' } else { '0' });
        let mut fields = projection.fields.clone();
        fields.sort_unstable();
        out.push_str(&fields.join(","));
    }
    out
}
