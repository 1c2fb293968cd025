#![forbid(unsafe_code)]

//! Candidate fetching and normalization.
//!
//! The fetcher decides what a fetch should ask the backend for, keeps the
//! most recently applied row set, and turns rows into the candidate list the
//! dropdown shows. It does not run queries itself: [`CandidateFetcher::task`]
//! returns the blocking closure the owner hands to the runtime.
//!
//! In local mode one unbounded, unfiltered fetch populates the row set and
//! every later search filters it in memory. The cached set belongs to a
//! single parent scope and configuration; the owner calls
//! [`CandidateFetcher::invalidate`] when either changes.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use dynlookup_core::record::field_text;
use dynlookup_core::{CandidateRecord, LookupConfig, QueryError, Row, SearchMode};

use crate::backend::{Backend, BackendQuery, text_matches};

/// Which resolve flow a fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveKind {
    /// First load without a parent scope.
    Initial,
    /// Parent scope became ready or changed.
    Parent,
    /// Programmatic value assignment.
    Assign,
    /// Tab with populate-on-tab.
    Tab,
    /// Barcode scan result.
    Scan,
}

impl ResolveKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Parent => "parent",
            Self::Assign => "assign",
            Self::Tab => "tab",
            Self::Scan => "scan",
        }
    }
}

/// Why a fetch was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Fill the dropdown for the current search text.
    Browse,
    /// Resolve `target` to a candidate and commit it.
    Resolve {
        kind: ResolveKind,
        target: Option<String>,
    },
}

impl FetchPurpose {
    #[must_use]
    pub fn resolve(kind: ResolveKind, target: Option<String>) -> Self {
        Self::Resolve { kind, target }
    }

    #[must_use]
    pub const fn is_browse(&self) -> bool {
        matches!(self, Self::Browse)
    }
}

impl fmt::Display for FetchPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browse => f.write_str("browse"),
            Self::Resolve { kind, .. } => write!(f, "resolve:{}", kind.as_str()),
        }
    }
}

/// How a browse should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowsePlan {
    /// Filter the cached row set; no backend call.
    Local,
    /// Ask the backend.
    Remote(BackendQuery),
}

/// Keeps the applied row set and plans queries.
#[derive(Debug, Clone, Default)]
pub struct CandidateFetcher {
    rows: Vec<Row>,
    /// Whether `rows` is the complete, unfiltered set for `scope`.
    complete: bool,
    /// Uncapped, text-free form of the query that produced `rows`.
    scope: Option<BackendQuery>,
}

impl CandidateFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan a dropdown fetch for `text`.
    ///
    /// Until the control is ready the cap is lifted so the first load sees
    /// every row; afterwards live fetches are capped at `max_results`.
    #[must_use]
    pub fn plan_browse(
        &self,
        config: &LookupConfig,
        text: &str,
        parent_value: Option<&str>,
        ready: bool,
    ) -> BrowsePlan {
        let base = BackendQuery::for_config(config, parent_value);
        match config.search_mode {
            SearchMode::Local if self.serves(&base) => BrowsePlan::Local,
            SearchMode::Local => BrowsePlan::Remote(base),
            SearchMode::Live => {
                let cap = ready.then_some(config.max_results);
                BrowsePlan::Remote(
                    base.with_search_text(Some(text.to_owned()))
                        .with_max_results(cap),
                )
            }
        }
    }

    /// Plan an unbounded resolve fetch.
    ///
    /// `text` narrows live-mode queries only; local mode always loads the
    /// full set so it can serve later searches.
    #[must_use]
    pub fn plan_resolve(
        config: &LookupConfig,
        text: Option<&str>,
        parent_value: Option<&str>,
    ) -> BackendQuery {
        let base = BackendQuery::for_config(config, parent_value);
        match config.search_mode {
            SearchMode::Live => base.with_search_text(text.map(str::to_owned)),
            SearchMode::Local => base,
        }
    }

    /// The blocking closure that runs `query` against `backend`.
    pub fn task(
        backend: Arc<dyn Backend>,
        query: BackendQuery,
    ) -> impl FnOnce() -> Result<Vec<Row>, QueryError> + Send + 'static {
        move || backend.query(&query)
    }

    /// Keep the rows of an applied fetch.
    pub fn store(&mut self, query: &BackendQuery, rows: Vec<Row>) {
        self.complete = query.search_text.is_none() && !query.is_bounded();
        self.scope = Some(query.clone().with_search_text(None).with_max_results(None));
        trace!(rows = rows.len(), complete = self.complete, "row set stored");
        self.rows = rows;
    }

    /// Forget the cached row set.
    pub fn invalidate(&mut self) {
        self.rows.clear();
        self.complete = false;
        self.scope = None;
    }

    /// Whether the stored rows are the full set for `base`.
    fn serves(&self, base: &BackendQuery) -> bool {
        self.complete && self.scope.as_ref() == Some(base)
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Whether local searches can be served from memory.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Candidates for `text` from the stored rows.
    ///
    /// Local mode filters in memory first; live rows were already filtered
    /// by the backend.
    #[must_use]
    pub fn candidates(&self, config: &LookupConfig, text: &str) -> Vec<CandidateRecord> {
        match config.search_mode {
            SearchMode::Local => normalize(filter_rows(&self.rows, config, text), config),
            SearchMode::Live => normalize(self.rows.iter(), config),
        }
    }
}

/// Rows whose search field matches `text`, in source order.
///
/// Matching is case-insensitive. Empty text matches every row.
pub fn filter_rows<'a>(
    rows: &'a [Row],
    config: &LookupConfig,
    text: &str,
) -> impl Iterator<Item = &'a Row> + 'a {
    let needle = text.to_lowercase();
    let field = config.search_field.clone();
    let match_type = config.match_type;
    rows.iter().filter(move |row| {
        needle.is_empty()
            || field_text(row, &field).is_some_and(|value| text_matches(&value, &needle, match_type))
    })
}

/// Turn rows into dropdown candidates.
///
/// At most `max_results` candidates are produced. An empty input yields the
/// single "no records" placeholder.
pub fn normalize<'a>(
    rows: impl IntoIterator<Item = &'a Row>,
    config: &LookupConfig,
) -> Vec<CandidateRecord> {
    let candidates: Vec<_> = rows
        .into_iter()
        .take(config.max_results)
        .map(|row| CandidateRecord::from_row(row.clone(), &config.display_field, &config.value_field))
        .collect();
    if candidates.is_empty() {
        vec![CandidateRecord::no_records(&config.no_records_label)]
    } else {
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynlookup_core::MatchType;
    use serde_json::{Value, json};

    fn row(v: Value) -> Row {
        match v {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn sample() -> Vec<Row> {
        vec![
            row(json!({"Id": "1", "Name": "Acme"})),
            row(json!({"Id": "2", "Name": "Acme2"})),
            row(json!({"Id": "3", "Name": "Globex"})),
        ]
    }

    fn displays(c: &[CandidateRecord]) -> Vec<&str> {
        c.iter().map(|c| c.display_value.as_str()).collect()
    }

    #[test]
    fn partial_filter_keeps_source_order() {
        let rows = sample();
        let config = LookupConfig::default();
        let hits: Vec<_> = filter_rows(&rows, &config, "acme").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(displays(&normalize(hits, &config)), ["Acme", "Acme2"]);
    }

    #[test]
    fn exact_filter_is_case_insensitive_equality() {
        let rows = sample();
        let config = LookupConfig::default().with_match_type(MatchType::Exact);
        let hits: Vec<_> = filter_rows(&rows, &config, "ACME").collect();
        assert_eq!(displays(&normalize(hits, &config)), ["Acme"]);
    }

    #[test]
    fn empty_text_matches_everything() {
        let rows = sample();
        assert_eq!(filter_rows(&rows, &LookupConfig::default(), "").count(), 3);
    }

    #[test]
    fn normalize_caps_and_uses_placeholder() {
        let rows = sample();
        let config = LookupConfig::default().with_max_results(2);
        assert_eq!(normalize(&rows, &config).len(), 2);

        let empty = normalize(std::iter::empty(), &config);
        assert_eq!(empty.len(), 1);
        assert!(!empty[0].is_selectable());
        assert_eq!(empty[0].display_value, "No Records Found");
    }

    #[test]
    fn live_browse_is_capped_only_when_ready() {
        let fetcher = CandidateFetcher::new();
        let config = LookupConfig::default().with_max_results(25);
        let BrowsePlan::Remote(q) = fetcher.plan_browse(&config, "ac", None, false) else {
            panic!("live mode always goes remote");
        };
        assert_eq!(q.max_results, None);
        assert_eq!(q.search_text.as_deref(), Some("ac"));

        let BrowsePlan::Remote(q) = fetcher.plan_browse(&config, "ac", None, true) else {
            panic!("live mode always goes remote");
        };
        assert_eq!(q.max_results, Some(25));
    }

    #[test]
    fn local_browse_loads_once_then_filters_in_memory() {
        let mut fetcher = CandidateFetcher::new();
        let config = LookupConfig::default().with_search_mode(SearchMode::Local);
        let BrowsePlan::Remote(q) = fetcher.plan_browse(&config, "ac", None, true) else {
            panic!("first local browse must load the set");
        };
        assert_eq!(q.search_text, None);
        assert_eq!(q.max_results, None);

        fetcher.store(&q, sample());
        assert!(fetcher.is_complete());
        assert_eq!(fetcher.plan_browse(&config, "ac", None, true), BrowsePlan::Local);
        assert_eq!(displays(&fetcher.candidates(&config, "glob")), ["Globex"]);

        fetcher.invalidate();
        assert!(matches!(
            fetcher.plan_browse(&config, "ac", None, true),
            BrowsePlan::Remote(_)
        ));
    }

    #[test]
    fn rows_from_another_scope_are_not_served_locally() {
        let mut fetcher = CandidateFetcher::new();
        let config = LookupConfig::default().with_search_mode(SearchMode::Local);
        let q = CandidateFetcher::plan_resolve(&config, None, None);
        fetcher.store(&q, sample());
        assert!(fetcher.is_complete());

        let narrowed = config.clone().with_where_clause("IsActive = true");
        let BrowsePlan::Remote(q) = fetcher.plan_browse(&narrowed, "ac", None, true) else {
            panic!("rows loaded without the where clause must be refetched");
        };
        assert_eq!(q.where_clause.as_deref(), Some("IsActive = true"));
        assert!(matches!(
            fetcher.plan_browse(&config, "ac", Some("123"), true),
            BrowsePlan::Local
        ));
    }

    #[test]
    fn filtered_rows_never_count_as_complete() {
        let mut fetcher = CandidateFetcher::new();
        let config = LookupConfig::default();
        let q = CandidateFetcher::plan_resolve(&config, Some("acme"), None);
        fetcher.store(&q, sample());
        assert!(!fetcher.is_complete());
    }

    #[test]
    fn resolve_drops_text_in_local_mode() {
        let local = LookupConfig::default().with_search_mode(SearchMode::Local);
        let q = CandidateFetcher::plan_resolve(&local, Some("acme"), None);
        assert_eq!(q.search_text, None);
        let q = CandidateFetcher::plan_resolve(&LookupConfig::default(), Some("acme"), None);
        assert_eq!(q.search_text.as_deref(), Some("acme"));
        assert!(!q.is_bounded());
    }

    #[test]
    fn purpose_display() {
        assert_eq!(FetchPurpose::Browse.to_string(), "browse");
        assert_eq!(
            FetchPurpose::resolve(ResolveKind::Scan, None).to_string(),
            "resolve:scan"
        );
    }
}
