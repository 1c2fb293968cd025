#![forbid(unsafe_code)]

//! Parent scope consumption.
//!
//! A lookup can be scoped by a value owned elsewhere on the screen (the
//! "parent"). The bridge compares each incoming [`ParentScope`] with the
//! previous one and tells the owner what the change means: wait, resolve a
//! target under the new scope, or clear. It also tracks whether the missing
//! parent value disables the control.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dynlookup_core::LookupConfig;

/// Scope published by the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParentScope {
    /// Whether the parent has finished its own initialization.
    pub initialized: bool,
    /// The parent's value, `None` when blank.
    pub filter_value: Option<String>,
}

impl ParentScope {
    /// Parent not ready yet.
    #[must_use]
    pub const fn waiting() -> Self {
        Self {
            initialized: false,
            filter_value: None,
        }
    }

    /// Parent ready with `filter_value`. Blank values count as absent.
    #[must_use]
    pub fn ready(filter_value: impl Into<String>) -> Self {
        Self {
            initialized: true,
            filter_value: Some(filter_value.into()).filter(|v| !v.trim().is_empty()),
        }
    }

    /// Parent ready without a value.
    #[must_use]
    pub const fn ready_empty() -> Self {
        Self {
            initialized: true,
            filter_value: None,
        }
    }

    fn normalized(mut self) -> Self {
        self.filter_value = self.filter_value.filter(|v| !v.trim().is_empty());
        self
    }
}

/// What a scope change requires of the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTransition {
    /// Nothing to do.
    Unchanged,
    /// Parent went back to not initialized; the control waits.
    Suspended,
    /// Clear the selection and fetch under the new scope, resolving
    /// `target` if one was supplied.
    Resolve { target: Option<String> },
    /// Parent ready without a value: clear the selection and settle.
    ClearSelection,
    /// The value went away after initialization: clear the selection and
    /// the search text.
    FilterEmptied,
}

/// Result of [`ParentFilterBridge::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChange {
    pub transition: ScopeTransition,
    /// The filter value differs from the previous scope.
    pub filter_value_changed: bool,
}

/// Tracks the parent scope and the pre-supplied target value.
#[derive(Debug, Clone, Default)]
pub struct ParentFilterBridge {
    scope: ParentScope,
    pending_target: Option<String>,
    disabled: bool,
}

impl ParentFilterBridge {
    /// Bridge for `config`, before any scope has been received.
    ///
    /// Without a parent value the control starts disabled when configured
    /// to.
    #[must_use]
    pub fn new(config: &LookupConfig) -> Self {
        let scope = ParentScope::waiting();
        Self {
            disabled: Self::disables(config, &scope),
            scope,
            pending_target: None,
        }
    }

    fn disables(config: &LookupConfig, scope: &ParentScope) -> bool {
        config.parent_filter_field.is_some()
            && config.disable_on_no_parent_value
            && !config.read_only
            && scope.filter_value.is_none()
    }

    /// Consume a new scope.
    pub fn apply(&mut self, next: ParentScope, config: &LookupConfig) -> ScopeChange {
        let next = next.normalized();
        let prev = std::mem::replace(&mut self.scope, next.clone());
        let filter_value_changed = prev.filter_value != next.filter_value;

        let disabled = if next.filter_value.is_some() {
            false
        } else if filter_value_changed || !prev.initialized {
            Self::disables(config, &next)
        } else {
            self.disabled
        };
        if disabled != self.disabled {
            debug!(disabled, "parent value changed interactivity");
            self.disabled = disabled;
        }

        let transition = if prev == next {
            ScopeTransition::Unchanged
        } else if !next.initialized {
            ScopeTransition::Suspended
        } else if !prev.initialized {
            match next.filter_value {
                Some(_) => ScopeTransition::Resolve {
                    target: self.pending_target.take(),
                },
                None => {
                    self.pending_target = None;
                    ScopeTransition::ClearSelection
                }
            }
        } else if !filter_value_changed {
            ScopeTransition::Unchanged
        } else if next.filter_value.is_none() {
            ScopeTransition::FilterEmptied
        } else {
            ScopeTransition::Resolve { target: None }
        };

        debug!(
            initialized = next.initialized,
            filter_value = next.filter_value.as_deref(),
            ?transition,
            "parent scope applied"
        );
        ScopeChange {
            transition,
            filter_value_changed,
        }
    }

    /// Remember a value to resolve once the scope is ready.
    pub fn stash_target(&mut self, value: Option<String>) {
        self.pending_target = value.filter(|v| !v.is_empty());
    }

    /// Take the stashed value, leaving none behind.
    pub fn take_target(&mut self) -> Option<String> {
        self.pending_target.take()
    }

    #[must_use]
    pub fn pending_target(&self) -> Option<&str> {
        self.pending_target.as_deref()
    }

    #[must_use]
    pub fn scope(&self) -> &ParentScope {
        &self.scope
    }

    #[must_use]
    pub fn filter_value(&self) -> Option<&str> {
        self.scope.filter_value.as_deref()
    }

    /// Whether the missing parent value currently disables the control.
    #[must_use]
    pub const fn disables_input(&self) -> bool {
        self.disabled
    }

    /// Re-derive the disabled flag after a configuration change.
    pub fn reconfigure(&mut self, config: &LookupConfig) {
        self.disabled = Self::disables(config, &self.scope);
    }
}
