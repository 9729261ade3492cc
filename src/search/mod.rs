//! Search Planner (C8, §4.6) and SQL-like Parser (C9, §4.7).

pub mod planner;
pub mod sql;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::Id;
use crate::port::Ordering;

/// The closed set of per-value-row predicates a [`Filter`] may apply
/// (§4.6). Matched OR-across-rows for the same document, so a document
/// with several values at one key satisfies the filter if any of them
/// does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    Equals(String),
    NotEquals(String),
    GreaterThan(String),
    GreaterThanOrEqualTo(String),
    LessThan(String),
    LessThanOrEqualTo(String),
    IsNull,
    IsNotNull,
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    /// SQL `LIKE` semantics (`%`, `_`), for patterns that don't reduce to
    /// one of `Contains`/`StartsWith`/`EndsWith` (§4.7).
    Like(String),
}

/// One predicate of a [`SearchQuery`]: a flattened field key and the
/// condition its value(s) must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub condition: FilterCondition,
}

/// A search request (§4.6). `max_results` is clamped to `1..=1000` by
/// [`SearchQuery::new`]; `skip` is clamped to `>= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub collection_id: Option<Id>,
    pub filters: Vec<Filter>,
    pub labels: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
    pub max_results: u32,
    pub skip: u32,
    pub ordering: Ordering,
    pub include_content: bool,
    pub include_labels: bool,
    pub include_tags: bool,
}

impl SearchQuery {
    pub fn new(collection_id: Option<Id>) -> Self {
        Self {
            collection_id,
            filters: Vec::new(),
            labels: BTreeSet::new(),
            tags: BTreeMap::new(),
            max_results: 100,
            skip: 0,
            ordering: Ordering::CreatedAscending,
            include_content: false,
            include_labels: false,
            include_tags: false,
        }
    }

    /// Clamp `max_results` into `1..=ceiling` (§4.6: "1..1000 clamped";
    /// the ceiling itself is [`crate::config::EngineConfig::max_results_ceiling`]).
    pub fn with_max_results(mut self, max_results: u32, ceiling: u32) -> Self {
        self.max_results = max_results.clamp(1, ceiling);
        self
    }
}

/// One hydrated hit: the stored [`crate::model::Document`] plus whatever
/// the query asked to include.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub document: crate::model::Document,
    pub content: Option<String>,
}

/// The planner's output (§4.6 step 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub records: Vec<SearchHit>,
    pub total_records: u64,
    pub records_remaining: u64,
    pub end_of_results: bool,
    pub timestamp: crate::timestamp::Timestamp,
}
