#![forbid(unsafe_code)]

//! Single-slot timer gate.
//!
//! A [`DebounceScheduler`] owns at most one pending trigger. Scheduling a
//! new trigger supersedes the previous one; cancelling clears it. Because
//! runtime timers cannot be withdrawn, every trigger carries a
//! [`TimerTicket`] and the owner asks [`DebounceScheduler::fire`] whether the
//! ticket is still the pending one when the delayed message arrives.
//!
//! One scheduler exists per concern (search debounce, open settle, close
//! grace, pointer-commit timeout), so triggers for different concerns never
//! supersede each other.

use std::fmt;
use std::time::Duration;

use tracing::trace;

use crate::program::Cmd;

/// Identifies one scheduled trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerTicket(u64);

impl TimerTicket {
    /// Create a ticket from a raw value (for tests).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ticket({})", self.0)
    }
}

/// Coalesces triggers so that only the most recent one fires.
///
/// # Invariants
///
/// - At most one ticket is pending.
/// - Tickets are strictly increasing per scheduler.
/// - [`fire`](Self::fire) returns `true` at most once per ticket.
#[derive(Debug, Clone)]
pub struct DebounceScheduler {
    name: &'static str,
    generation: u64,
    pending: Option<TimerTicket>,
}

impl DebounceScheduler {
    /// Create an idle scheduler. `name` is used in trace output.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            pending: None,
        }
    }

    /// Arm a trigger `interval` from now, superseding any pending one.
    ///
    /// `make_msg` builds the message delivered when the interval elapses.
    pub fn schedule<M, O>(
        &mut self,
        interval: Duration,
        make_msg: impl FnOnce(TimerTicket) -> M,
    ) -> Cmd<M, O> {
        self.generation += 1;
        let ticket = TimerTicket(self.generation);
        if let Some(previous) = self.pending.replace(ticket) {
            trace!(scheduler = self.name, %previous, %ticket, "trigger superseded");
        } else {
            trace!(scheduler = self.name, %ticket, ?interval, "trigger armed");
        }
        Cmd::after(interval, make_msg(ticket))
    }

    /// Clear the pending trigger. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.pending.take();
        if let Some(ticket) = cancelled {
            trace!(scheduler = self.name, %ticket, "trigger cancelled");
        }
        cancelled.is_some()
    }

    /// Consume `ticket` if it is the pending trigger.
    ///
    /// Returns `false` for superseded or cancelled tickets; the caller must
    /// then ignore the delayed message.
    pub fn fire(&mut self, ticket: TimerTicket) -> bool {
        if self.pending == Some(ticket) {
            self.pending = None;
            true
        } else {
            trace!(scheduler = self.name, %ticket, "stale trigger ignored");
            false
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}
