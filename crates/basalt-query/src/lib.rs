mod aggregate;
mod apply;
mod error;
mod filter;
mod matches;
mod options;
mod parse_filter;
mod projection;
mod sort;
mod update;

pub use aggregate::{AccInput, Accumulator, GroupKey, GroupSpec, Stage, parse_pipeline};
pub use error::QueryError;
pub use filter::{Condition, ElemFilter, Filter, GeoQuery};
pub use matches::{condition_matches, matches};
pub use options::FindOptions;
pub use parse_filter::parse_filter;
pub use projection::{Projection, ProjectionMode, parse_projection};
pub use sort::{SortDirection, SortSpec, compare_sort_values, sort_documents};
pub use update::{
    BitKind, DateKind, FieldUpdate, PopFrom, UpdateOp, UpdateSpec, parse_update,
};
