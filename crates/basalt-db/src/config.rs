use std::path::PathBuf;
use std::time::Duration;

/// Configuration recognized at database open.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Filesystem location for an optional persistence collaborator. The
    /// core itself never touches it and runs fully in memory.
    pub data_dir: Option<PathBuf>,
    /// Page-cache hint for a persistent storage collaborator; opaque to
    /// the core.
    pub buffer_pool_size: Option<usize>,
    /// Per-collection result cache capacity.
    pub query_cache_size: usize,
    /// Maximum age of a cached result list.
    pub query_cache_ttl: Duration,
    /// Cadence of the TTL sweeper. `Duration::ZERO` disables it.
    pub ttl_sweep_interval: Duration,
    /// Cadence of the cursor sweeper. `Duration::ZERO` disables it.
    pub cursor_sweep_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            data_dir: None,
            buffer_pool_size: None,
            query_cache_size: 1000,
            query_cache_ttl: Duration::from_secs(300),
            ttl_sweep_interval: Duration::from_secs(60),
            cursor_sweep_interval: Duration::from_secs(10),
        }
    }
}
