#![forbid(unsafe_code)]

//! dynlookup runtime
//!
//! The pieces a control needs to stay consistent while keystrokes, timers,
//! responses, and host events interleave.
//!
//! # Key Components
//!
//! - [`Model`] - Trait for control state and its transition function
//! - [`Cmd`] - Side effects returned from `update()`
//! - [`Program`] - Threaded driver: worker-thread tasks, wall-clock timers
//! - [`ProgramSimulator`] - Deterministic driver with a virtual clock
//! - [`DebounceScheduler`] - Single-slot timer gate
//! - [`RequestArbiter`] - Monotonic request ids and stale-response discard
//! - [`Subscription`] / [`EventFeed`] - Scoped listeners to host event sources

pub mod arbiter;
pub mod debounce;
pub mod program;
pub mod simulator;
pub mod subscription;

pub use arbiter::{
    Arbitration, ArbiterEvent, ArbiterTrace, DEFAULT_TRACE_CAPACITY, RequestArbiter, RequestId,
};
pub use debounce::{DebounceScheduler, TimerTicket};
pub use program::{Cmd, Model, Program, ProgramHandle, TaskSpec};
pub use simulator::{CmdRecord, PendingTask, ProgramSimulator, TaskMode};
pub use subscription::{EventFeed, Listen, MockSubscription, StopSignal, SubId, Subscription};
