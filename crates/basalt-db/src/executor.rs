use basalt_core::{Document, Value};
use basalt_index::Index;
use basalt_query::{Filter, FindOptions, GeoQuery, matches, sort_documents};

use crate::collection::Inner;
use crate::error::DbError;
use crate::plan::{AccessPath, Plan};
use crate::planner;

/// Field attached to text-search results with their relevance score.
pub const TEXT_SCORE_FIELD: &str = "_textScore";

/// Run a plan: candidates from the access path, a full re-application of
/// the filter (indexes may over-approximate), then sort, skip/limit, and
/// projection.
pub(crate) fn execute(
    inner: &Inner,
    plan: &Plan,
    filter: &Filter,
    options: &FindOptions,
) -> Result<Vec<Document>, DbError> {
    let mut docs: Vec<Document> = match &plan.access {
        AccessPath::FullScan => inner.docs.values().cloned().collect(),
        AccessPath::IdLookup { id } => inner.docs.get(id).cloned().into_iter().collect(),
        AccessPath::IndexScan {
            index,
            prefix,
            range,
            reverse,
        } => {
            let mut ids = match inner.indexes.get(index).map(|slot| &slot.index) {
                Some(Index::Ordered(idx)) => {
                    if prefix.is_empty() && range.is_none() {
                        idx.scan_all()
                    } else {
                        idx.scan(prefix, range.as_ref())
                    }
                }
                _ => Vec::new(),
            };
            if *reverse {
                ids.reverse();
            }
            fetch(inner, ids.iter().map(String::as_str))
        }
        AccessPath::TextSearch { index, query } => {
            let hits = match inner.indexes.get(index).map(|slot| &slot.index) {
                Some(Index::Text(idx)) => idx.search(query),
                _ => Vec::new(),
            };
            let mut docs = Vec::with_capacity(hits.len());
            for hit in hits {
                if let Some(doc) = inner.docs.get(&hit.id) {
                    let mut doc = doc.clone();
                    doc.set(TEXT_SCORE_FIELD, Value::Double(hit.score));
                    docs.push(doc);
                }
            }
            docs
        }
        AccessPath::Geo { index, query } => {
            let ids = geo_candidates(inner, index, query);
            fetch(inner, ids.iter().map(String::as_str))
        }
    };

    docs.retain(|doc| matches(doc, filter));

    if !options.sort.is_empty() && !plan.serves_sort {
        sort_documents(&mut docs, &options.sort);
    }

    let skip = options.skip.unwrap_or(0);
    let docs: Vec<Document> = match options.limit {
        Some(limit) => docs.into_iter().skip(skip).take(limit).collect(),
        None => docs.into_iter().skip(skip).collect(),
    };

    Ok(match &options.projection {
        Some(projection) => docs.iter().map(|d| projection.apply(d)).collect(),
        None => docs,
    })
}

fn fetch<'a>(inner: &Inner, ids: impl Iterator<Item = &'a str>) -> Vec<Document> {
    ids.filter_map(|id| inner.docs.get(id).cloned()).collect()
}

fn geo_candidates(inner: &Inner, index: &str, query: &GeoQuery) -> Vec<String> {
    let Some(slot) = inner.indexes.get(index) else {
        return Vec::new();
    };
    match (&slot.index, query) {
        (
            Index::Geo2d(idx),
            GeoQuery::Near {
                x, y, max_distance, ..
            },
        ) => idx
            .near(*x, *y, *max_distance, None)
            .into_iter()
            .map(|h| h.id)
            .collect(),
        (Index::Geo2d(idx), GeoQuery::Within(ring) | GeoQuery::Intersects(ring)) => {
            idx.within(ring)
        }
        (
            Index::Geo2dSphere(idx),
            GeoQuery::Near {
                x, y, max_distance, ..
            },
        ) => idx
            .near(*x, *y, *max_distance, None)
            .into_iter()
            .map(|h| h.id)
            .collect(),
        (Index::Geo2dSphere(idx), GeoQuery::Within(ring)) => idx.within(ring),
        (Index::Geo2dSphere(idx), GeoQuery::Intersects(ring)) => idx.intersects(ring),
        _ => Vec::new(),
    }
}

/// Ids of documents matching a filter, in plan order. Shared by the
/// update and delete paths, which locate first and mutate after.
pub(crate) fn find_matching_ids(inner: &Inner, filter: &Filter) -> Result<Vec<String>, DbError> {
    let options = FindOptions::default();
    let (plan, _) = planner::plan(inner, filter, &options)?;
    let docs = execute(inner, &plan, filter, &options)?;
    Ok(docs.iter().filter_map(Document::id_string).collect())
}
