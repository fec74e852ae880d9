mod aggregate;
mod cache;
mod change;
mod collection;
mod config;
mod cursor;
mod database;
mod error;
mod executor;
mod plan;
mod planner;
mod result;
mod sweep;

pub use cache::CacheStats;
pub use change::{ChangeEvent, ChangeOp};
pub use collection::{Collection, CollectionStats, CreateIndexOptions, IndexInfo};
pub use config::DatabaseConfig;
pub use cursor::{CursorManager, DEFAULT_BATCH_SIZE};
pub use database::Database;
pub use error::DbError;
pub use executor::TEXT_SCORE_FIELD;
pub use plan::Explain;
pub use result::{DeleteResult, InsertResult, UpdateResult};

pub use basalt_core::{DateTime, Document, ObjectId, ObjectIdGenerator, Utc, Value, ValueType};
pub use basalt_core::{arr, doc, val};
pub use basalt_index::IndexState;
pub use basalt_query::{
    FindOptions, Projection, ProjectionMode, SortDirection, SortSpec, parse_projection,
};
