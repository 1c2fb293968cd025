#![forbid(unsafe_code)]

//! Committed selection and value matching.
//!
//! [`SelectionModel`] holds at most one candidate. Every change produces the
//! same ordered set of [`SelectionNotice`]s so hosts can bind each derived
//! output separately, including the explicit "has no selection" negation.

use serde_json::Value;
use tracing::debug;

use dynlookup_core::record::field_text;
use dynlookup_core::{AmbiguityPolicy, CandidateRecord, LookupConfig, Row};

/// One derived output of a selection change, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionNotice {
    SelectedValue(Option<String>),
    SelectedRecord(Option<Row>),
    RecordId(Option<String>),
    HasSelection(bool),
    HasNoSelection(bool),
}

impl SelectionNotice {
    /// Host-facing output name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectedValue(_) => "selectedValue",
            Self::SelectedRecord(_) => "selectedRecord",
            Self::RecordId(_) => "recordId",
            Self::HasSelection(_) => "hasSelection",
            Self::HasNoSelection(_) => "hasNoSelection",
        }
    }

    /// The notice payload as JSON.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::SelectedValue(v) | Self::RecordId(v) => {
                v.clone().map_or(Value::Null, Value::String)
            }
            Self::SelectedRecord(r) => r.clone().map_or(Value::Null, Value::Object),
            Self::HasSelection(b) | Self::HasNoSelection(b) => Value::Bool(*b),
        }
    }
}

/// At most one committed candidate.
#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    selected: Option<CandidateRecord>,
}

impl SelectionModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `candidate` (or clear with `None`).
    ///
    /// Returns the notices for the new state. The "no records" placeholder
    /// is refused: the selection is left untouched and nothing is returned.
    pub fn select(&mut self, candidate: Option<CandidateRecord>) -> Vec<SelectionNotice> {
        if candidate.as_ref().is_some_and(|c| !c.is_selectable()) {
            debug!("placeholder candidate refused");
            return Vec::new();
        }
        debug!(
            record_id = candidate.as_ref().map(|c| c.record_id.as_str()),
            "selection committed"
        );
        self.selected = candidate;
        self.notices()
    }

    /// Clear the selection, returning notices only if something was
    /// selected.
    pub fn clear(&mut self) -> Vec<SelectionNotice> {
        if self.selected.is_some() {
            self.select(None)
        } else {
            Vec::new()
        }
    }

    /// Notices describing the current state.
    #[must_use]
    pub fn notices(&self) -> Vec<SelectionNotice> {
        let selected = self.selected.as_ref();
        let has = selected.is_some();
        vec![
            SelectionNotice::SelectedValue(selected.map(|c| c.match_value.clone())),
            SelectionNotice::SelectedRecord(selected.map(|c| c.raw.clone())),
            SelectionNotice::RecordId(selected.map(|c| c.record_id.clone())),
            SelectionNotice::HasSelection(has),
            SelectionNotice::HasNoSelection(!has),
        ]
    }

    #[must_use]
    pub fn selected(&self) -> Option<&CandidateRecord> {
        self.selected.as_ref()
    }

    #[must_use]
    pub const fn has_selection(&self) -> bool {
        self.selected.is_some()
    }

    /// The committed value (value field), if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.match_value.as_str())
    }

    #[must_use]
    pub fn display_value(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.display_value.as_str())
    }
}

/// Resolve `value` to a candidate among `rows`.
///
/// Tries an exact match on the value field first. If nothing matches and
/// `display_fallback` is set, rows whose display field contains `value`
/// (case-insensitive) are considered; a row whose display text equals
/// `value` wins over mere substring hits. Several remaining matches are
/// settled by the configured [`AmbiguityPolicy`].
#[must_use]
pub fn find_by_value(
    rows: &[Row],
    value: &str,
    config: &LookupConfig,
    display_fallback: bool,
) -> Option<CandidateRecord> {
    if value.is_empty() {
        return None;
    }
    let to_candidate =
        |row: &Row| CandidateRecord::from_row(row.clone(), &config.display_field, &config.value_field);

    let exact: Vec<&Row> = rows
        .iter()
        .filter(|row| field_text(row, &config.value_field).as_deref() == Some(value))
        .collect();
    if let Some(found) = pick(&exact, config.ambiguous_match, "value") {
        return Some(to_candidate(found));
    }
    if !display_fallback {
        return None;
    }

    let needle = value.to_lowercase();
    let contains: Vec<(&Row, bool)> = rows
        .iter()
        .filter_map(|row| {
            let display = field_text(row, &config.display_field)?.to_lowercase();
            display.contains(&needle).then_some((row, display == needle))
        })
        .collect();
    let equal: Vec<&Row> = contains.iter().filter(|(_, eq)| *eq).map(|(r, _)| *r).collect();
    let matches: Vec<&Row> = if equal.is_empty() {
        contains.iter().map(|(r, _)| *r).collect()
    } else {
        equal
    };
    pick(&matches, config.ambiguous_match, "display").map(to_candidate)
}

fn pick<'a>(matches: &[&'a Row], policy: AmbiguityPolicy, field: &'static str) -> Option<&'a Row> {
    match (matches, policy) {
        ([], _) => None,
        ([only], _) => Some(*only),
        ([first, ..], AmbiguityPolicy::First) => {
            debug!(field, matches = matches.len(), "ambiguous match, taking first");
            Some(*first)
        }
        (_, AmbiguityPolicy::Reject) => {
            debug!(field, matches = matches.len(), "ambiguous match rejected");
            None
        }
    }
}
