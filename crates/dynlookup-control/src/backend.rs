#![forbid(unsafe_code)]

//! Backend query contract.
//!
//! The control never talks to a network itself. Hosts implement [`Backend`]
//! for their transport; the control calls it from a background task with a
//! fully described [`BackendQuery`] and reports the result back as a
//! message.
//!
//! [`MemoryBackend`] implements the contract over a fixed row set. It is
//! useful for fixtures, demos, and tests: it records every query it
//! receives and can be told to fail.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use dynlookup_core::{LookupConfig, MatchType, QueryError, Row, SortDirection};
use dynlookup_core::record::field_text;

/// One backend query.
///
/// Serializes with the attribute names hosts use on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendQuery {
    pub object_type: String,
    pub display_field: String,
    pub value_field: String,
    pub search_field: String,
    /// Only sent in live mode with non-empty text.
    pub search_text: Option<String>,
    pub match_type: MatchType,
    pub parent_filter_field: Option<String>,
    pub parent_filter_value: Option<String>,
    pub parent_filter_operator: Option<String>,
    pub where_clause: Option<String>,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    /// `None` means unbounded.
    pub max_results: Option<usize>,
}

impl BackendQuery {
    /// A query carrying the configuration's fields, sort, and predicates.
    ///
    /// The parent filter is attached only when both a field is configured
    /// and a value is known.
    #[must_use]
    pub fn for_config(config: &LookupConfig, parent_value: Option<&str>) -> Self {
        let parent = config
            .parent_filter_field
            .as_ref()
            .zip(parent_value.filter(|v| !v.is_empty()));
        Self {
            object_type: config.object_type.clone(),
            display_field: config.display_field.clone(),
            value_field: config.value_field.clone(),
            search_field: config.search_field.clone(),
            search_text: None,
            match_type: config.match_type,
            parent_filter_field: parent.map(|(field, _)| field.clone()),
            parent_filter_value: parent.map(|(_, value)| value.to_owned()),
            parent_filter_operator: parent.map(|_| config.parent_filter_operator.clone()),
            where_clause: config.where_clause.clone(),
            sort_field: config.sort_field.clone(),
            sort_direction: config.sort_direction,
            max_results: None,
        }
    }

    #[must_use]
    pub fn with_search_text(mut self, text: Option<String>) -> Self {
        self.search_text = text.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, cap: Option<usize>) -> Self {
        self.max_results = cap;
        self
    }

    /// Whether the result set is capped.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.max_results.is_some()
    }
}

/// Source of candidate rows.
///
/// Called from a background task. Implementations block until the rows are
/// available and must not panic on transport failures; report them as
/// [`QueryError`] instead.
pub trait Backend: Send + Sync {
    fn query(&self, query: &BackendQuery) -> Result<Vec<Row>, QueryError>;
}

/// Case-insensitive text match used by backends and local filtering.
#[must_use]
pub fn text_matches(candidate: &str, needle: &str, match_type: MatchType) -> bool {
    let candidate = candidate.to_lowercase();
    let needle = needle.to_lowercase();
    match match_type {
        MatchType::Partial => candidate.contains(&needle),
        MatchType::Exact => candidate == needle,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`Backend`] over a fixed row set.
///
/// Supports search text (`exact`/`partial`), parent filter operators `=`
/// and `!=`, sorting, and the result cap. The where clause is recorded but
/// not interpreted.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Vec<Row>,
    calls: Mutex<Vec<BackendQuery>>,
    failure: Mutex<Option<QueryError>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Fail every query with `error` until [`recover`](Self::recover).
    pub fn fail_with(&self, error: QueryError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    /// Queries received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendQuery> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    #[must_use]
    pub fn last_call(&self) -> Option<BackendQuery> {
        lock(&self.calls).last().cloned()
    }

    fn parent_allows(row: &Row, query: &BackendQuery) -> Result<bool, QueryError> {
        let (Some(field), Some(value)) = (&query.parent_filter_field, &query.parent_filter_value)
        else {
            return Ok(true);
        };
        let actual = field_text(row, field).unwrap_or_default();
        match query.parent_filter_operator.as_deref().unwrap_or("=") {
            "=" => Ok(actual == *value),
            "!=" => Ok(actual != *value),
            other => Err(QueryError::Rejected(format!(
                "unsupported parent filter operator {other:?}"
            ))),
        }
    }
}

impl Backend for MemoryBackend {
    fn query(&self, query: &BackendQuery) -> Result<Vec<Row>, QueryError> {
        lock(&self.calls).push(query.clone());
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }

        let mut rows = Vec::new();
        for row in &self.rows {
            if !Self::parent_allows(row, query)? {
                continue;
            }
            if let Some(text) = &query.search_text {
                let field = field_text(row, &query.search_field).unwrap_or_default();
                if !text_matches(&field, text, query.match_type) {
                    continue;
                }
            }
            rows.push(row.clone());
        }

        rows.sort_by(|a, b| {
            let a = field_text(a, &query.sort_field).unwrap_or_default().to_lowercase();
            let b = field_text(b, &query.sort_field).unwrap_or_default().to_lowercase();
            let order = a.cmp(&b);
            match query.sort_direction {
                SortDirection::Asc => order,
                SortDirection::Desc => order.reverse(),
            }
        });

        if let Some(cap) = query.max_results {
            rows.truncate(cap);
        }
        Ok(rows)
    }
}
