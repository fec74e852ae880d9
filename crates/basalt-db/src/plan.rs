use basalt_core::Value;
use basalt_index::FieldRange;
use basalt_query::GeoQuery;
use serde::Serialize;

/// The planner's chosen access path.
#[derive(Debug, Clone)]
pub(crate) enum AccessPath {
    /// Walk the whole id map.
    FullScan,
    /// Direct hit on the implicit `_id_` index.
    IdLookup { id: String },
    /// Ordered-index scan: equality prefix plus an optional range on the
    /// next key component. `reverse` walks the index backwards to serve a
    /// descending sort.
    IndexScan {
        index: String,
        prefix: Vec<Value>,
        range: Option<FieldRange>,
        reverse: bool,
    },
    /// Score-ordered candidates from a text index.
    TextSearch { index: String, query: String },
    /// Candidates from a geo index.
    Geo { index: String, query: GeoQuery },
}

#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub access: AccessPath,
    /// All projected fields are available from the index keys. Reported
    /// through explain; the executor still fetches documents.
    pub covered: bool,
    /// The access path already yields documents in the requested order.
    pub serves_sort: bool,
}

impl Plan {
    pub(crate) fn scan() -> Plan {
        Plan {
            access: AccessPath::FullScan,
            covered: false,
            serves_sort: false,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self.access {
            AccessPath::FullScan => "collection_scan",
            AccessPath::IdLookup { .. } => "id_lookup",
            AccessPath::IndexScan { .. } => "index_scan",
            AccessPath::TextSearch { .. } => "text_search",
            AccessPath::Geo { .. } => "geo",
        }
    }

    pub(crate) fn index_name(&self) -> Option<&str> {
        match &self.access {
            AccessPath::FullScan => None,
            AccessPath::IdLookup { .. } => Some("_id_"),
            AccessPath::IndexScan { index, .. }
            | AccessPath::TextSearch { index, .. }
            | AccessPath::Geo { index, .. } => Some(index),
        }
    }
}

/// Query plan report, as returned by `Collection::explain`.
#[derive(Debug, Clone, Serialize)]
pub struct Explain {
    /// `collection_scan`, `id_lookup`, `index_scan`, `text_search`, `geo`.
    pub plan: String,
    /// The selected index, if any.
    pub index: Option<String>,
    pub covered: bool,
    pub serves_sort: bool,
    /// Every index that was considered, in ranked order.
    pub candidates: Vec<String>,
}
