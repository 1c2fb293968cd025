#![forbid(unsafe_code)]

//! dynlookup public facade crate.
//!
//! Re-exports the control, its configuration and event vocabulary, and the
//! runtime drivers, plus a prelude for day-to-day usage.

use std::sync::Arc;

// --- Core re-exports -------------------------------------------------------

pub use dynlookup_core::{
    AmbiguityPolicy, CandidateRecord, ConfigDefaulted, ConfigInput, FocusTarget, KeyCode,
    KeyEvent, KeyEventKind, LookupConfig, MatchType, Modifiers, PointerButton, PointerEvent,
    PointerKind, PointerTarget, QueryError, Row, SearchMode, SortDirection,
};

// --- Runtime re-exports ----------------------------------------------------

pub use dynlookup_runtime::{
    Cmd, EventFeed, Model, Program, ProgramHandle, ProgramSimulator, SubId, Subscription, TaskMode,
};

// --- Control re-exports ----------------------------------------------------

pub use dynlookup_control::{
    Backend, BackendQuery, KeyDisposition, LoadingPhase, Lookup, MemoryBackend, Msg,
    NoticeLevel, Notification, OutputEvent, ParentScope, ScanError, ValidationFailure,
    ValidationReport,
};

/// Build a lookup from host attributes given as a JSON object.
///
/// Fails only if `attributes` is not an object of attribute values; invalid
/// individual values fall back to defaults and are reported through
/// [`Lookup::config_diagnostics`].
pub fn lookup_from_json(
    attributes: serde_json::Value,
    backend: Arc<dyn Backend>,
) -> Result<Lookup, serde_json::Error> {
    let input = ConfigInput::from_json(attributes)?;
    let lookup = Lookup::from_input(input, backend);
    for d in lookup.config_diagnostics() {
        tracing::debug!(field = d.field, reason = %d.reason, "attribute defaulted");
    }
    Ok(lookup)
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Backend, BackendQuery, Cmd, ConfigInput, FocusTarget, KeyCode, KeyEvent, Lookup,
        LookupConfig, MemoryBackend, Model, Msg, OutputEvent, ParentScope, PointerEvent,
        PointerTarget, Program, ProgramSimulator, QueryError, Row, lookup_from_json,
    };

    pub use crate::{control, core, runtime};
}

pub use dynlookup_control as control;
pub use dynlookup_core as core;
pub use dynlookup_runtime as runtime;
