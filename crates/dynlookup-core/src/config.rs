#![forbid(unsafe_code)]

//! Lookup configuration: loose host input and its validated form.
//!
//! Hosts hand the control a bag of attributes whose types they do not
//! always respect: booleans arrive as `"true"`, counts as `"25"`, and unset
//! attributes as blank strings. [`ConfigInput`] accepts all of that.
//! [`LookupConfig::from_input`] turns it into a fully typed configuration,
//! replacing every absent or unusable value with its documented default and
//! reporting each invalid value as a [`ConfigDefaulted`] diagnostic.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `displayField`, `searchField` | `Name` |
//! | `valueField` | `Id` |
//! | `matchType` | `partial` |
//! | `maxResults` | 200 |
//! | `sortField` | the display field |
//! | `sortDirection` | `asc` |
//! | `searchMode` | `live` |
//! | `parentFilterOperator` | `=` |
//! | `ambiguousMatch` | `first` |
//! | `debounceMs` | 350 |
//! | `openSettleMs` | 200 |
//! | `closeGraceMs` | 10 |
//! | `pointerCommitTimeoutMs` | 1500 |
//! | `noRecordsLabel` | `No Records Found` |
//!
//! All boolean flags default to `false`.
//!
//! # Updates
//!
//! A partial update is merged into the retained input with
//! [`ConfigInput::merge`] (or [`ConfigInput::set`] for one field) and the
//! merged input is validated again from scratch. A configuration is never
//! mutated field-by-field after validation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_DISPLAY_FIELD: &str = "Name";
pub const DEFAULT_VALUE_FIELD: &str = "Id";
pub const DEFAULT_MAX_RESULTS: usize = 200;
pub const DEFAULT_OPERATOR: &str = "=";
pub const DEFAULT_DEBOUNCE_MS: u64 = 350;
pub const DEFAULT_OPEN_SETTLE_MS: u64 = 200;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 10;
pub const DEFAULT_POINTER_COMMIT_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_NO_RECORDS_LABEL: &str = "No Records Found";

/// How search text is compared against candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Whole-value, case-insensitive equality.
    Exact,
    /// Case-insensitive substring.
    #[default]
    Partial,
}

/// Sort direction sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Where filtering happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// One backend query per search.
    #[default]
    Live,
    /// One full fetch, then in-memory filtering.
    Local,
}

/// What to do when fallback display matching finds several candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// Take the first match in candidate order.
    #[default]
    First,
    /// Treat ambiguity as no match.
    #[serde(rename = "none")]
    Reject,
}

/// A configuration value that was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDefaulted {
    /// Host-facing attribute name.
    pub field: &'static str,
    /// Why the supplied value was not usable.
    pub reason: String,
}

impl fmt::Display for ConfigDefaulted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} defaulted: {}", self.field, self.reason)
    }
}

/// Host-supplied configuration attributes, loosely typed.
///
/// Every field is optional; unknown attributes are ignored on
/// deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_direction: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_filter_field: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_filter_operator: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_on_no_parent_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub populate_on_tab: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_display_field_match: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_barcode_scanning: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguous_match: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_settle_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_grace_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer_commit_timeout_ms: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_records_label: Option<Value>,
}

/// Error from [`ConfigInput::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown configuration field: {}", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl ConfigInput {
    /// Parse host attributes from a JSON object.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn slot_mut(&mut self, field: &str) -> Option<&mut Option<Value>> {
        let slot = match field {
            "objectType" => &mut self.object_type,
            "displayField" => &mut self.display_field,
            "searchField" => &mut self.search_field,
            "valueField" => &mut self.value_field,
            "matchType" => &mut self.match_type,
            "maxResults" => &mut self.max_results,
            "sortField" => &mut self.sort_field,
            "sortDirection" => &mut self.sort_direction,
            "searchMode" => &mut self.search_mode,
            "parentFilterField" => &mut self.parent_filter_field,
            "parentFilterOperator" => &mut self.parent_filter_operator,
            "whereClause" => &mut self.where_clause,
            "disableOnNoParentValue" => &mut self.disable_on_no_parent_value,
            "required" => &mut self.required,
            "disabled" => &mut self.disabled,
            "readOnly" => &mut self.read_only,
            "populateOnTab" => &mut self.populate_on_tab,
            "allowDisplayFieldMatch" => &mut self.allow_display_field_match,
            "allowBarcodeScanning" => &mut self.allow_barcode_scanning,
            "ambiguousMatch" => &mut self.ambiguous_match,
            "debounceMs" => &mut self.debounce_ms,
            "openSettleMs" => &mut self.open_settle_ms,
            "closeGraceMs" => &mut self.close_grace_ms,
            "pointerCommitTimeoutMs" => &mut self.pointer_commit_timeout_ms,
            "noRecordsLabel" => &mut self.no_records_label,
            _ => return None,
        };
        Some(slot)
    }

    /// Set one attribute by its host-facing (camelCase) name.
    ///
    /// `Value::Null` clears the attribute back to its default.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), UnknownField> {
        let slot = self
            .slot_mut(field)
            .ok_or_else(|| UnknownField(field.to_owned()))?;
        *slot = if value.is_null() { None } else { Some(value) };
        Ok(())
    }

    /// Overlay every attribute present in `update` onto `self`.
    pub fn merge(&mut self, update: &ConfigInput) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(v) = &update.$field {
                        self.$field = Some(v.clone());
                    }
                )*
            };
        }
        overlay!(
            object_type,
            display_field,
            search_field,
            value_field,
            match_type,
            max_results,
            sort_field,
            sort_direction,
            search_mode,
            parent_filter_field,
            parent_filter_operator,
            where_clause,
            disable_on_no_parent_value,
            required,
            disabled,
            read_only,
            populate_on_tab,
            allow_display_field_match,
            allow_barcode_scanning,
            ambiguous_match,
            debounce_ms,
            open_settle_ms,
            close_grace_ms,
            pointer_commit_timeout_ms,
            no_records_label,
        );
    }
}

impl From<&LookupConfig> for ConfigInput {
    /// The attributes that reproduce `config` when validated.
    fn from(config: &LookupConfig) -> Self {
        fn text(s: &str) -> Option<Value> {
            Some(Value::String(s.to_owned()))
        }
        fn flag(b: bool) -> Option<Value> {
            Some(Value::Bool(b))
        }
        fn millis(d: Duration) -> Option<Value> {
            u64::try_from(d.as_millis()).ok().map(Value::from)
        }
        fn choice<T: Serialize>(v: T) -> Option<Value> {
            serde_json::to_value(v).ok()
        }
        Self {
            object_type: text(&config.object_type),
            display_field: text(&config.display_field),
            search_field: text(&config.search_field),
            value_field: text(&config.value_field),
            match_type: choice(config.match_type),
            max_results: Some(Value::from(config.max_results)),
            sort_field: text(&config.sort_field),
            sort_direction: choice(config.sort_direction),
            search_mode: choice(config.search_mode),
            parent_filter_field: config.parent_filter_field.as_deref().and_then(text),
            parent_filter_operator: text(&config.parent_filter_operator),
            where_clause: config.where_clause.as_deref().and_then(text),
            disable_on_no_parent_value: flag(config.disable_on_no_parent_value),
            required: flag(config.required),
            disabled: flag(config.disabled),
            read_only: flag(config.read_only),
            populate_on_tab: flag(config.populate_on_tab),
            allow_display_field_match: flag(config.allow_display_field_match),
            allow_barcode_scanning: flag(config.allow_barcode_scanning),
            ambiguous_match: choice(config.ambiguous_match),
            debounce_ms: millis(config.debounce),
            open_settle_ms: millis(config.open_settle),
            close_grace_ms: millis(config.close_grace),
            pointer_commit_timeout_ms: millis(config.pointer_commit_timeout),
            no_records_label: text(&config.no_records_label),
        }
    }
}

/// Validated lookup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub object_type: String,
    pub display_field: String,
    pub search_field: String,
    pub value_field: String,
    pub match_type: MatchType,
    pub max_results: usize,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    pub search_mode: SearchMode,
    pub parent_filter_field: Option<String>,
    pub parent_filter_operator: String,
    pub where_clause: Option<String>,
    pub disable_on_no_parent_value: bool,
    pub required: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub populate_on_tab: bool,
    pub allow_display_field_match: bool,
    pub allow_barcode_scanning: bool,
    pub ambiguous_match: AmbiguityPolicy,
    pub debounce: Duration,
    pub open_settle: Duration,
    pub close_grace: Duration,
    pub pointer_commit_timeout: Duration,
    pub no_records_label: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            object_type: String::new(),
            display_field: DEFAULT_DISPLAY_FIELD.to_owned(),
            search_field: DEFAULT_DISPLAY_FIELD.to_owned(),
            value_field: DEFAULT_VALUE_FIELD.to_owned(),
            match_type: MatchType::Partial,
            max_results: DEFAULT_MAX_RESULTS,
            sort_field: DEFAULT_DISPLAY_FIELD.to_owned(),
            sort_direction: SortDirection::Asc,
            search_mode: SearchMode::Live,
            parent_filter_field: None,
            parent_filter_operator: DEFAULT_OPERATOR.to_owned(),
            where_clause: None,
            disable_on_no_parent_value: false,
            required: false,
            disabled: false,
            read_only: false,
            populate_on_tab: false,
            allow_display_field_match: false,
            allow_barcode_scanning: false,
            ambiguous_match: AmbiguityPolicy::First,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            open_settle: Duration::from_millis(DEFAULT_OPEN_SETTLE_MS),
            close_grace: Duration::from_millis(DEFAULT_CLOSE_GRACE_MS),
            pointer_commit_timeout: Duration::from_millis(DEFAULT_POINTER_COMMIT_TIMEOUT_MS),
            no_records_label: DEFAULT_NO_RECORDS_LABEL.to_owned(),
        }
    }
}

/// Collects defaulting diagnostics while validating.
struct Validator {
    defaulted: Vec<ConfigDefaulted>,
}

impl Validator {
    fn reject(&mut self, field: &'static str, value: &Value, expected: &str) {
        let reason = format!("expected {expected}, got {value}");
        debug!(field, %reason, "configuration value defaulted");
        self.defaulted.push(ConfigDefaulted { field, reason });
    }

    fn text(&mut self, field: &'static str, value: Option<&Value>) -> Option<String> {
        match value? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Value::Null => None,
            other => {
                self.reject(field, other, "a string");
                None
            }
        }
    }

    fn flag(&mut self, field: &'static str, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" | "" => false,
                _ => {
                    self.reject(field, &Value::String(s.clone()), "true or false");
                    false
                }
            },
            Some(other) => {
                self.reject(field, other, "true or false");
                false
            }
        }
    }

    fn count(&mut self, field: &'static str, value: Option<&Value>, min: u64) -> Option<u64> {
        let raw = value?;
        let parsed = match raw {
            Value::Null => return None,
            Value::Number(n) => n.as_u64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n >= min => Some(n),
            _ => {
                let expected = if min == 0 {
                    "a non-negative integer"
                } else {
                    "a positive integer"
                };
                self.reject(field, raw, expected);
                None
            }
        }
    }

    fn choice<T: Copy>(
        &mut self,
        field: &'static str,
        value: Option<&Value>,
        options: &[(&str, T)],
    ) -> Option<T> {
        let raw = value?;
        let text = match raw {
            Value::Null => return None,
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => s.trim().to_ascii_lowercase(),
            _ => String::new(),
        };
        if let Some((_, v)) = options.iter().find(|(name, _)| *name == text) {
            return Some(*v);
        }
        let names: Vec<&str> = options.iter().map(|(n, _)| *n).collect();
        self.reject(field, raw, &names.join(" or "));
        None
    }
}

impl LookupConfig {
    /// Validate host input, defaulting every absent or invalid value.
    ///
    /// Returns the configuration plus one diagnostic per invalid value.
    /// Absent and blank values default silently.
    #[must_use]
    pub fn from_input(input: &ConfigInput) -> (Self, Vec<ConfigDefaulted>) {
        let mut v = Validator {
            defaulted: Vec::new(),
        };
        let d = Self::default();

        let display_field = v
            .text("displayField", input.display_field.as_ref())
            .unwrap_or(d.display_field);
        let ms = |n: Option<u64>, fallback: Duration| n.map_or(fallback, Duration::from_millis);

        let config = Self {
            object_type: v
                .text("objectType", input.object_type.as_ref())
                .unwrap_or(d.object_type),
            search_field: v
                .text("searchField", input.search_field.as_ref())
                .unwrap_or(d.search_field),
            value_field: v
                .text("valueField", input.value_field.as_ref())
                .unwrap_or(d.value_field),
            match_type: v
                .choice(
                    "matchType",
                    input.match_type.as_ref(),
                    &[("exact", MatchType::Exact), ("partial", MatchType::Partial)],
                )
                .unwrap_or(d.match_type),
            max_results: v
                .count("maxResults", input.max_results.as_ref(), 1)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(d.max_results),
            sort_field: v
                .text("sortField", input.sort_field.as_ref())
                .unwrap_or_else(|| display_field.clone()),
            sort_direction: v
                .choice(
                    "sortDirection",
                    input.sort_direction.as_ref(),
                    &[("asc", SortDirection::Asc), ("desc", SortDirection::Desc)],
                )
                .unwrap_or(d.sort_direction),
            search_mode: v
                .choice(
                    "searchMode",
                    input.search_mode.as_ref(),
                    &[("live", SearchMode::Live), ("local", SearchMode::Local)],
                )
                .unwrap_or(d.search_mode),
            parent_filter_field: v.text("parentFilterField", input.parent_filter_field.as_ref()),
            parent_filter_operator: v
                .text("parentFilterOperator", input.parent_filter_operator.as_ref())
                .unwrap_or(d.parent_filter_operator),
            where_clause: v.text("whereClause", input.where_clause.as_ref()),
            disable_on_no_parent_value: v.flag(
                "disableOnNoParentValue",
                input.disable_on_no_parent_value.as_ref(),
            ),
            required: v.flag("required", input.required.as_ref()),
            disabled: v.flag("disabled", input.disabled.as_ref()),
            read_only: v.flag("readOnly", input.read_only.as_ref()),
            populate_on_tab: v.flag("populateOnTab", input.populate_on_tab.as_ref()),
            allow_display_field_match: v.flag(
                "allowDisplayFieldMatch",
                input.allow_display_field_match.as_ref(),
            ),
            allow_barcode_scanning: v.flag(
                "allowBarcodeScanning",
                input.allow_barcode_scanning.as_ref(),
            ),
            ambiguous_match: v
                .choice(
                    "ambiguousMatch",
                    input.ambiguous_match.as_ref(),
                    &[("first", AmbiguityPolicy::First), ("none", AmbiguityPolicy::Reject)],
                )
                .unwrap_or(d.ambiguous_match),
            debounce: ms(v.count("debounceMs", input.debounce_ms.as_ref(), 0), d.debounce),
            open_settle: ms(
                v.count("openSettleMs", input.open_settle_ms.as_ref(), 0),
                d.open_settle,
            ),
            close_grace: ms(
                v.count("closeGraceMs", input.close_grace_ms.as_ref(), 0),
                d.close_grace,
            ),
            pointer_commit_timeout: ms(
                v.count(
                    "pointerCommitTimeoutMs",
                    input.pointer_commit_timeout_ms.as_ref(),
                    1,
                ),
                d.pointer_commit_timeout,
            ),
            no_records_label: v
                .text("noRecordsLabel", input.no_records_label.as_ref())
                .unwrap_or(d.no_records_label),
            display_field,
        };
        (config, v.defaulted)
    }

    /// Whether moving from `old` to `new` changes what a fetch would return.
    #[must_use]
    pub fn refetch_required(old: &Self, new: &Self) -> bool {
        old.object_type != new.object_type
            || old.display_field != new.display_field
            || old.search_field != new.search_field
            || old.value_field != new.value_field
            || old.match_type != new.match_type
            || old.max_results != new.max_results
            || old.sort_field != new.sort_field
            || old.sort_direction != new.sort_direction
            || old.search_mode != new.search_mode
            || old.parent_filter_field != new.parent_filter_field
            || old.parent_filter_operator != new.parent_filter_operator
            || old.where_clause != new.where_clause
    }

    /// Whether the user may change the selection.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        !self.disabled && !self.read_only
    }

    #[must_use]
    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    /// Set the display field. The sort field follows it.
    #[must_use]
    pub fn with_display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = field.into();
        self.sort_field.clone_from(&self.display_field);
        self
    }

    #[must_use]
    pub fn with_search_field(mut self, field: impl Into<String>) -> Self {
        self.search_field = field.into();
        self
    }

    #[must_use]
    pub fn with_value_field(mut self, field: impl Into<String>) -> Self {
        self.value_field = field.into();
        self
    }

    #[must_use]
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_field = field.into();
        self.sort_direction = direction;
        self
    }

    #[must_use]
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    #[must_use]
    pub fn with_parent_filter(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        self.parent_filter_field = Some(field.into());
        self.parent_filter_operator = operator.into();
        self
    }

    #[must_use]
    pub fn with_where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    #[must_use]
    pub fn with_disable_on_no_parent_value(mut self, on: bool) -> Self {
        self.disable_on_no_parent_value = on;
        self
    }

    #[must_use]
    pub fn with_required(mut self, on: bool) -> Self {
        self.required = on;
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, on: bool) -> Self {
        self.disabled = on;
        self
    }

    #[must_use]
    pub fn with_read_only(mut self, on: bool) -> Self {
        self.read_only = on;
        self
    }

    #[must_use]
    pub fn with_populate_on_tab(mut self, on: bool) -> Self {
        self.populate_on_tab = on;
        self
    }

    #[must_use]
    pub fn with_display_field_match(mut self, on: bool) -> Self {
        self.allow_display_field_match = on;
        self
    }

    #[must_use]
    pub fn with_barcode_scanning(mut self, on: bool) -> Self {
        self.allow_barcode_scanning = on;
        self
    }

    #[must_use]
    pub fn with_ambiguous_match(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguous_match = policy;
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: Value) -> ConfigInput {
        ConfigInput::from_json(v).expect("valid input object")
    }

    #[test]
    fn empty_input_yields_documented_defaults() {
        let (config, defaulted) = LookupConfig::from_input(&ConfigInput::default());
        assert!(defaulted.is_empty());
        assert_eq!(config, LookupConfig::default());
        assert_eq!(config.display_field, "Name");
        assert_eq!(config.value_field, "Id");
        assert_eq!(config.max_results, 200);
        assert_eq!(config.debounce, Duration::from_millis(350));
        assert_eq!(config.open_settle, Duration::from_millis(200));
        assert_eq!(config.close_grace, Duration::from_millis(10));
        assert_eq!(config.pointer_commit_timeout, Duration::from_millis(1500));
        assert_eq!(config.no_records_label, "No Records Found");
    }

    #[test]
    fn string_booleans_and_counts_are_accepted() {
        let (config, defaulted) = LookupConfig::from_input(&input(json!({
            "required": "true",
            "readOnly": "FALSE",
            "disabled": true,
            "maxResults": "25",
            "debounceMs": 0,
        })));
        assert!(defaulted.is_empty());
        assert!(config.required);
        assert!(!config.read_only);
        assert!(config.disabled);
        assert_eq!(config.max_results, 25);
        assert_eq!(config.debounce, Duration::ZERO);
    }

    #[test]
    fn invalid_values_default_with_diagnostics() {
        let (config, defaulted) = LookupConfig::from_input(&input(json!({
            "maxResults": 0,
            "matchType": "fuzzy",
            "sortDirection": 3,
            "required": "yes",
        })));
        assert_eq!(config.max_results, 200);
        assert_eq!(config.match_type, MatchType::Partial);
        assert_eq!(config.sort_direction, SortDirection::Asc);
        assert!(!config.required);
        let fields: Vec<_> = defaulted.iter().map(|d| d.field).collect();
        assert_eq!(
            fields,
            vec!["matchType", "maxResults", "sortDirection", "required"]
        );
    }

    #[test]
    fn blank_strings_are_absent() {
        let (config, defaulted) = LookupConfig::from_input(&input(json!({
            "displayField": "  ",
            "maxResults": "",
            "parentFilterField": "",
        })));
        assert!(defaulted.is_empty());
        assert_eq!(config.display_field, "Name");
        assert_eq!(config.parent_filter_field, None);
    }

    #[test]
    fn sort_field_follows_display_field() {
        let (config, _) = LookupConfig::from_input(&input(json!({"displayField": "Title"})));
        assert_eq!(config.sort_field, "Title");
        let (config, _) = LookupConfig::from_input(&input(json!({
            "displayField": "Title",
            "sortField": "CreatedDate",
        })));
        assert_eq!(config.sort_field, "CreatedDate");
    }

    #[test]
    fn merge_overlays_present_fields_only() {
        let mut base = input(json!({"objectType": "Account", "maxResults": 10}));
        base.merge(&input(json!({"maxResults": 50})));
        let (config, _) = LookupConfig::from_input(&base);
        assert_eq!(config.object_type, "Account");
        assert_eq!(config.max_results, 50);
    }

    #[test]
    fn set_by_host_name() {
        let mut base = ConfigInput::default();
        base.set("whereClause", json!("IsActive = true")).unwrap();
        assert_eq!(base.where_clause, Some(json!("IsActive = true")));
        base.set("whereClause", Value::Null).unwrap();
        assert_eq!(base.where_clause, None);
        assert_eq!(
            base.set("colour", json!("red")),
            Err(UnknownField("colour".into()))
        );
    }

    #[test]
    fn refetch_required_tracks_query_shape_only() {
        let old = LookupConfig::default();
        assert!(!LookupConfig::refetch_required(&old, &old.clone().with_required(true)));
        assert!(LookupConfig::refetch_required(
            &old,
            &old.clone().with_where_clause("Type = 'Customer'")
        ));
        assert!(LookupConfig::refetch_required(
            &old,
            &old.clone().with_search_mode(SearchMode::Local)
        ));
    }

    #[test]
    fn ambiguity_policy_parses_none_as_reject() {
        let (config, _) = LookupConfig::from_input(&input(json!({"ambiguousMatch": "none"})));
        assert_eq!(config.ambiguous_match, AmbiguityPolicy::Reject);
    }

    #[test]
    fn built_config_survives_partial_update() {
        let built = LookupConfig::default()
            .with_object_type("Contact")
            .with_parent_filter("AccountId", "!=")
            .with_ambiguous_match(AmbiguityPolicy::Reject)
            .with_debounce(Duration::from_millis(120));
        let mut retained = ConfigInput::from(&built);
        retained.merge(&input(json!({"required": true})));
        let (updated, defaulted) = LookupConfig::from_input(&retained);
        assert!(defaulted.is_empty());
        assert_eq!(updated, built.with_required(true));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn numeric_max_results_round_trip(n in 1u64..100_000) {
                let (config, defaulted) =
                    LookupConfig::from_input(&input(json!({"maxResults": n.to_string()})));
                prop_assert!(defaulted.is_empty());
                prop_assert_eq!(config.max_results as u64, n);
            }

            #[test]
            fn arbitrary_debounce_text_never_panics(text in ".{0,12}") {
                let (config, defaulted) =
                    LookupConfig::from_input(&input(json!({"debounceMs": text.clone()})));
                match text.trim().parse::<u64>() {
                    Ok(ms) => prop_assert_eq!(config.debounce, Duration::from_millis(ms)),
                    Err(_) => {
                        prop_assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
                        prop_assert!(defaulted.len() <= 1);
                    }
                }
            }
        }
    }
}
