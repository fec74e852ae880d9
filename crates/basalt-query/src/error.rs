use thiserror::Error;

/// Parse-time errors for the query language: filters, updates,
/// projections, and aggregation pipelines.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid update: {0}")]
    InvalidUpdate(String),
    #[error("invalid projection: {0}")]
    InvalidProjection(String),
    #[error("invalid pipeline stage: {0}")]
    InvalidStage(String),
}
