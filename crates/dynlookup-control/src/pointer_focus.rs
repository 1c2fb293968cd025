#![forbid(unsafe_code)]

//! Focus and pointer timing.
//!
//! Committing a candidate with the pointer replaces the part of the control
//! the pointer is over, so the host may report a focus loss in the middle of
//! a click. The coordinator keeps three independent timers to tell transient
//! focus changes from real intent:
//!
//! - open settle: focus landing on the input opens the dropdown only if it
//!   is still there after a short delay;
//! - close grace: focus leaving the control closes the dropdown only if it
//!   has not come back after a short delay;
//! - pointer commit: after a pointer-down commit, the next global pointer-up
//!   (wherever it lands) moves focus to the selection chip, unless the
//!   bounded wait has expired.
//!
//! Everything here is best effort. Focus requests are emitted as outputs and
//! the host may ignore them.

use std::time::Duration;

use tracing::trace;

use dynlookup_core::FocusTarget;
use dynlookup_runtime::{Cmd, DebounceScheduler, TimerTicket};

/// Timers owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusTimer {
    OpenSettle,
    CloseGrace,
    PointerCommit,
}

/// Tracks where focus is and arms the focus/pointer timers.
#[derive(Debug, Clone)]
pub struct PointerFocusCoordinator {
    focus: Option<FocusTarget>,
    awaiting_commit: bool,
    close_deferred: bool,
    open_settle: DebounceScheduler,
    close_grace: DebounceScheduler,
    commit_timeout: DebounceScheduler,
}

impl Default for PointerFocusCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerFocusCoordinator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            focus: None,
            awaiting_commit: false,
            close_deferred: false,
            open_settle: DebounceScheduler::new("open-settle"),
            close_grace: DebounceScheduler::new("close-grace"),
            commit_timeout: DebounceScheduler::new("pointer-commit"),
        }
    }

    /// Focus arrived on `target` inside the control.
    ///
    /// Cancels a pending close: the focus loss was an internal shift.
    pub fn focus_in(&mut self, target: FocusTarget) {
        trace!(?target, "focus in");
        self.focus = Some(target);
        self.close_grace.cancel();
        self.close_deferred = false;
    }

    /// Focus moved away from its current target. `to` is the new target if
    /// it is inside the control.
    ///
    /// Returns `true` when focus left the control entirely and a close grace
    /// should be scheduled.
    pub fn focus_out(&mut self, to: Option<FocusTarget>) -> bool {
        trace!(?to, "focus out");
        self.focus = to;
        self.open_settle.cancel();
        to.is_none()
    }

    /// Arm the open-settle timer.
    pub fn schedule_open<M, O>(
        &mut self,
        delay: Duration,
        make_msg: impl FnOnce(FocusTimer, TimerTicket) -> M,
    ) -> Cmd<M, O> {
        self.open_settle
            .schedule(delay, |ticket| make_msg(FocusTimer::OpenSettle, ticket))
    }

    /// Arm the close-grace timer.
    pub fn schedule_close<M, O>(
        &mut self,
        delay: Duration,
        make_msg: impl FnOnce(FocusTimer, TimerTicket) -> M,
    ) -> Cmd<M, O> {
        self.close_grace
            .schedule(delay, |ticket| make_msg(FocusTimer::CloseGrace, ticket))
    }

    /// A pointer-down committed a candidate: wait for the pointer-up.
    pub fn arm_commit<M, O>(
        &mut self,
        timeout: Duration,
        make_msg: impl FnOnce(FocusTimer, TimerTicket) -> M,
    ) -> Cmd<M, O> {
        self.awaiting_commit = true;
        self.commit_timeout
            .schedule(timeout, |ticket| make_msg(FocusTimer::PointerCommit, ticket))
    }

    /// A global pointer-up arrived.
    ///
    /// Returns `true` if a pointer commit was waiting for it; the owner then
    /// moves focus to the selection.
    pub fn pointer_up(&mut self) -> bool {
        if !self.awaiting_commit {
            return false;
        }
        self.awaiting_commit = false;
        self.commit_timeout.cancel();
        true
    }

    /// Whether an open-settle timer is still pending.
    #[must_use]
    pub fn open_pending(&self) -> bool {
        self.open_settle.is_pending()
    }

    /// Handle an expired timer.
    ///
    /// Returns `true` if the owner should act on it: open for
    /// [`FocusTimer::OpenSettle`] (focus is still on the input), close for
    /// [`FocusTimer::CloseGrace`] (focus is still outside). Pointer-commit
    /// expiry only clears the waiting flag.
    pub fn fire(&mut self, timer: FocusTimer, ticket: TimerTicket) -> bool {
        match timer {
            FocusTimer::OpenSettle => {
                self.open_settle.fire(ticket) && self.focus == Some(FocusTarget::Input)
            }
            FocusTimer::CloseGrace => self.close_grace.fire(ticket) && self.focus.is_none(),
            FocusTimer::PointerCommit => {
                if self.commit_timeout.fire(ticket) {
                    trace!("pointer commit wait expired");
                    self.awaiting_commit = false;
                }
                false
            }
        }
    }

    /// Postpone a close until the awaited fetch settles.
    pub fn defer_close(&mut self) {
        self.close_deferred = true;
    }

    /// Take a postponed close if focus is still outside.
    pub fn take_deferred_close(&mut self) -> bool {
        std::mem::replace(&mut self.close_deferred, false) && self.focus.is_none()
    }

    #[must_use]
    pub const fn focus(&self) -> Option<FocusTarget> {
        self.focus
    }

    #[must_use]
    pub const fn has_focus(&self) -> bool {
        self.focus.is_some()
    }

    #[must_use]
    pub const fn is_awaiting_commit(&self) -> bool {
        self.awaiting_commit
    }

    /// Drop every pending timer and flag (detach).
    pub fn reset(&mut self) {
        self.open_settle.cancel();
        self.close_grace.cancel();
        self.commit_timeout.cancel();
        self.awaiting_commit = false;
        self.close_deferred = false;
        self.focus = None;
    }
}
