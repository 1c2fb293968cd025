#![forbid(unsafe_code)]

//! Core: input events, configuration, and the row/candidate record model.

pub mod config;
pub mod error;
pub mod event;
pub mod record;

pub use config::{
    AmbiguityPolicy, ConfigDefaulted, ConfigInput, LookupConfig, MatchType, SearchMode,
    SortDirection, UnknownField,
};
pub use error::QueryError;
pub use event::{
    FocusTarget, KeyCode, KeyEvent, KeyEventKind, Modifiers, PointerButton, PointerEvent,
    PointerKind, PointerTarget,
};
pub use record::{CandidateRecord, Row};
