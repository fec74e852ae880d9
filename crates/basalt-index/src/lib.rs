mod geo2d;
mod geohash;
mod geosphere;
mod key;
mod ordered;
mod text;
mod ttl;

pub use geo2d::{DEFAULT_CELL_SIZE, Geo2dIndex, GeoHit};
pub use geosphere::{DEFAULT_PRECISION, Geo2dSphereIndex};
pub use key::{IndexKey, KeyValue};
pub use ordered::{FieldRange, OrderedIndex};
pub use text::{TextHit, TextIndex, tokenize};
pub use ttl::TtlIndex;

use basalt_core::Document;
use thiserror::Error;

/// Documents are referenced by the string form of their `_id`.
pub type DocId = String;

/// Lifecycle of an index.
///
/// Background-created indexes start in `Building` and move to `Ready` or
/// `Failed`; everything else is born `Ready`. Queries consult only
/// `Ready` indexes, writes maintain `Building` and `Ready` alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Ready,
    Building { done: usize, total: usize },
    Failed { reason: String },
}

impl IndexState {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexState::Ready)
    }
}

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("duplicate key in index '{index}': {key}")]
    DuplicateKey { index: String, key: String },
    #[error("index build failed: {0}")]
    BuildFailed(String),
}

/// The index family. Dispatch is a closed match — every variant handles
/// the same maintenance protocol.
#[derive(Debug)]
pub enum Index {
    Ordered(OrderedIndex),
    Text(TextIndex),
    Geo2d(Geo2dIndex),
    Geo2dSphere(Geo2dSphereIndex),
    Ttl(TtlIndex),
}

impl Index {
    pub fn name(&self) -> &str {
        match self {
            Index::Ordered(idx) => idx.name(),
            Index::Text(idx) => idx.name(),
            Index::Geo2d(idx) => idx.name(),
            Index::Geo2dSphere(idx) => idx.name(),
            Index::Ttl(idx) => idx.name(),
        }
    }

    /// Human-readable class tag, for `list_indexes` and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Index::Ordered(idx) if idx.partial_filter().is_some() => "partial",
            Index::Ordered(_) => "btree",
            Index::Text(_) => "text",
            Index::Geo2d(_) => "2d",
            Index::Geo2dSphere(_) => "2dsphere",
            Index::Ttl(_) => "ttl",
        }
    }

    /// Add one document's contribution.
    ///
    /// Only a unique ordered index can fail, with `DuplicateKey`; the
    /// index is left unchanged in that case.
    pub fn insert_doc(&mut self, id: &str, doc: &Document) -> Result<(), IndexError> {
        match self {
            Index::Ordered(idx) => idx.insert_doc(id, doc),
            Index::Text(idx) => {
                idx.insert_doc(id, doc);
                Ok(())
            }
            Index::Geo2d(idx) => {
                idx.insert_doc(id, doc);
                Ok(())
            }
            Index::Geo2dSphere(idx) => {
                idx.insert_doc(id, doc);
                Ok(())
            }
            Index::Ttl(idx) => {
                idx.insert_doc(id, doc);
                Ok(())
            }
        }
    }

    /// Remove one document's contribution. Total — removing a document
    /// that never contributed is a no-op.
    pub fn remove_doc(&mut self, id: &str, doc: &Document) {
        match self {
            Index::Ordered(idx) => idx.remove_doc(id, doc),
            Index::Text(idx) => idx.remove_doc(id),
            Index::Geo2d(idx) => idx.remove_doc(id),
            Index::Geo2dSphere(idx) => idx.remove_doc(id),
            Index::Ttl(idx) => idx.remove_doc(id, doc),
        }
    }

    /// Number of indexed entries (documents for most classes, distinct
    /// postings for text).
    pub fn entry_count(&self) -> usize {
        match self {
            Index::Ordered(idx) => idx.entry_count(),
            Index::Text(idx) => idx.doc_count(),
            Index::Geo2d(idx) => idx.len(),
            Index::Geo2dSphere(idx) => idx.len(),
            Index::Ttl(idx) => idx.len(),
        }
    }
}
