use basalt_index::IndexError;
use basalt_query::QueryError;
use thiserror::Error;

/// Errors surfaced by the database core.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    /// A unique index (including `_id_`) saw a colliding key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// Operation against a missing document or collection.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed filter, update, pipeline stage, or projection.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Index name already in use, or an attempt to drop `_id_`.
    #[error("index conflict: {0}")]
    IndexConflict(String),
    /// A background index build failed.
    #[error("index build failed: {0}")]
    IndexBuildFailed(String),
    /// The operation requires a geo index that is not present.
    #[error("no geo index available: {0}")]
    GeoUnavailable(String),
    /// The operation requires a text index that is not present.
    #[error("no text index available: {0}")]
    TextUnavailable(String),
    #[error("cursor expired: {0}")]
    CursorExpired(u64),
    #[error("unknown cursor: {0}")]
    CursorUnknown(u64),
}

impl From<QueryError> for DbError {
    fn from(e: QueryError) -> Self {
        DbError::InvalidArgument(e.to_string())
    }
}

impl From<IndexError> for DbError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DuplicateKey { .. } => DbError::DuplicateKey(e.to_string()),
            IndexError::BuildFailed(reason) => DbError::IndexBuildFailed(reason),
        }
    }
}
