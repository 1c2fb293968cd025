#![forbid(unsafe_code)]

//! The lookup control and its components.
//!
//! [`Lookup`] composes the pieces below into one [`Model`](dynlookup_runtime::Model):
//!
//! - [`CandidateFetcher`] plans live/local fetches and normalizes rows
//! - [`SelectionModel`] holds the committed record and derives its outputs
//! - [`DropdownController`] owns visibility and the circular highlight
//! - [`ParentFilterBridge`] turns parent scope updates into transitions
//! - [`PointerFocusCoordinator`] debounces focus and pointer intent
//!
//! Fetches go through a [`Backend`]; [`MemoryBackend`] serves tests and demos.

pub mod backend;
pub mod barcode;
pub mod dropdown;
pub mod fetcher;
pub mod lookup;
pub mod notify;
pub mod parent_filter;
pub mod pointer_focus;
pub mod selection;
pub mod validation;

pub use backend::{Backend, BackendQuery, MemoryBackend};
pub use barcode::ScanError;
pub use dropdown::DropdownController;
pub use fetcher::{BrowsePlan, CandidateFetcher, FetchPurpose, ResolveKind};
pub use lookup::{KeyDisposition, LoadingPhase, Lookup, Msg, OutputEvent, POINTER_UP_SUB};
pub use notify::{NoticeLevel, Notification};
pub use parent_filter::{ParentFilterBridge, ParentScope, ScopeChange, ScopeTransition};
pub use pointer_focus::{FocusTimer, PointerFocusCoordinator};
pub use selection::{SelectionModel, SelectionNotice, find_by_value};
pub use validation::{ValidationFailure, ValidationReport};
