use basalt_core::{Value, ValueType};
use regex::Regex;

/// A parsed query filter.
///
/// The operator set is closed — unknown operators are rejected at parse
/// time rather than dispatched at execution.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every child matches. An empty `And` matches every document, which
    /// is also how the empty filter parses.
    And(Vec<Filter>),
    /// At least one child matches.
    Or(Vec<Filter>),
    /// No child matches.
    Nor(Vec<Filter>),
    /// A condition against a single field.
    Field { field: String, cond: Condition },
    /// Full-text search hint. Never evaluated against a document; the
    /// planner resolves it through a text index.
    Text(String),
    /// Geospatial predicate against a point field, resolved through a
    /// geo index.
    Geo { field: String, query: GeoQuery },
}

#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Type(ValueType),
    Regex(Regex),
    Size(usize),
    All(Vec<Value>),
    ElemMatch(ElemFilter),
}

/// The body of an `$elemMatch`.
#[derive(Debug, Clone)]
pub enum ElemFilter {
    /// Elements are documents matched by a nested filter.
    Document(Box<Filter>),
    /// Operator-only spec applied to each element value directly,
    /// e.g. `{ "$gt": 5, "$lt": 9 }`.
    Conditions(Vec<Condition>),
}

#[derive(Debug, Clone)]
pub enum GeoQuery {
    /// Proximity search. `spherical` selects the 2dsphere index class and
    /// meter distances; planar otherwise.
    Near {
        x: f64,
        y: f64,
        max_distance: Option<f64>,
        spherical: bool,
    },
    /// Points inside a polygon (vertices in order, implicitly closed).
    Within(Vec<(f64, f64)>),
    /// Points intersecting a polygon; for point data this is containment
    /// including the boundary.
    Intersects(Vec<(f64, f64)>),
}

impl Filter {
    /// A filter that matches every document.
    pub fn match_all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::And(children) if children.is_empty())
    }

    /// AND-conjuncts, with nested `And` nodes flattened. A non-And
    /// filter is its own single conjunct. Only these are eligible for
    /// index restriction.
    pub fn conjuncts(&self) -> Vec<&Filter> {
        match self {
            Filter::And(children) => children.iter().flat_map(Filter::conjuncts).collect(),
            other => vec![other],
        }
    }

    /// The `$text` query string, if this filter carries one in its
    /// top-level conjuncts.
    pub fn text_query(&self) -> Option<&str> {
        self.conjuncts().into_iter().find_map(|c| match c {
            Filter::Text(q) => Some(q.as_str()),
            _ => None,
        })
    }

    /// The geo predicate, if this filter carries one in its top-level
    /// conjuncts.
    pub fn geo_query(&self) -> Option<(&str, &GeoQuery)> {
        self.conjuncts().into_iter().find_map(|c| match c {
            Filter::Geo { field, query } => Some((field.as_str(), query)),
            _ => None,
        })
    }

    /// Whether any node in the tree needs an index class to evaluate
    /// (`$text` or a geo operator). Such nodes are only legal as
    /// top-level conjuncts.
    pub fn has_index_dependent_node(&self) -> bool {
        match self {
            Filter::And(children) | Filter::Or(children) | Filter::Nor(children) => {
                children.iter().any(Filter::has_index_dependent_node)
            }
            Filter::Text(_) | Filter::Geo { .. } => true,
            Filter::Field { .. } => false,
        }
    }
}
