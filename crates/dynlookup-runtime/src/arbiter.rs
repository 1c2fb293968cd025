#![forbid(unsafe_code)]

//! Request arbitration with monotonic ids and staleness discard.
//!
//! Every outbound fetch is tagged with a [`RequestId`] from
//! [`RequestArbiter::begin`]. When the response arrives the owner calls
//! [`RequestArbiter::settle`]; only the most recently issued request is ever
//! applied. A slow early response that lands after a newer request was
//! issued is discarded, whatever order the responses arrive in.
//!
//! Cancellation is logical: superseded requests keep running and are
//! ignored on arrival.
//!
//! # Tracing
//!
//! Each arbitration step is appended to an [`ArbiterTrace`]. Traces can be
//! checksummed for golden comparison and checked post-hoc with
//! [`ArbiterTrace::verify_invariants`]. The trace keeps only the most recent
//! [`DEFAULT_TRACE_CAPACITY`] events.

use std::collections::VecDeque;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use tracing::debug;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A monotonically increasing request identifier.
///
/// # Invariants
///
/// - Ids are strictly monotonic per arbiter.
/// - Id 0 is reserved for "no request".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// The null id, never issued.
    pub const NONE: Self = Self(0);

    /// Create an id from a raw value (for tests).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArbiterEvent / ArbiterTrace
// ---------------------------------------------------------------------------

/// One arbitration step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArbiterEvent {
    /// A request was issued.
    Issued { id: RequestId },
    /// An unsettled request was overtaken by a newer one.
    Superseded { id: RequestId, by: RequestId },
    /// The current request settled successfully and its result applies.
    Applied { id: RequestId },
    /// The current request settled with an error.
    Failed { id: RequestId },
    /// A response arrived for a request that is no longer current.
    StaleDiscarded { id: RequestId, current: RequestId },
}

impl ArbiterEvent {
    /// The request this event is about.
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Issued { id }
            | Self::Superseded { id, .. }
            | Self::Applied { id }
            | Self::Failed { id }
            | Self::StaleDiscarded { id, .. } => *id,
        }
    }

    /// Event type name for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Issued { .. } => "issued",
            Self::Superseded { .. } => "superseded",
            Self::Applied { .. } => "applied",
            Self::Failed { .. } => "failed",
            Self::StaleDiscarded { .. } => "stale_discarded",
        }
    }
}

/// Events retained by a trace before the oldest are evicted.
pub const DEFAULT_TRACE_CAPACITY: usize = 512;

/// Ordered log of the most recent arbitration steps.
#[derive(Debug, Clone)]
pub struct ArbiterTrace {
    events: VecDeque<ArbiterEvent>,
    capacity: usize,
    evicted: u64,
}

impl Default for ArbiterTrace {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }
}

impl ArbiterTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A trace that keeps at most `capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_TRACE_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: ArbiterEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    pub fn events(&self) -> impl Iterator<Item = &ArbiterEvent> {
        self.events.iter()
    }

    /// Number of events dropped to stay within capacity.
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Check if the trace contains an event of `event_type` for `id`.
    #[must_use]
    pub fn contains_event_type(&self, id: RequestId, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.id() == id && e.event_type() == event_type)
    }

    #[must_use]
    pub fn events_for(&self, id: RequestId) -> Vec<&ArbiterEvent> {
        self.events.iter().filter(|e| e.id() == id).collect()
    }

    /// Count events of one type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Checksum over event data and order, for golden comparison.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for event in &self.events {
            event.hash(&mut hasher);
        }
        hasher.finish()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.evicted = 0;
    }

    /// Verify trace invariants.
    ///
    /// Returns a list of violations if any invariants are broken. When older
    /// events were evicted, settlements seen before the first retained issue
    /// are not checked against it.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut last_issued = RequestId::NONE;
        let mut settled: Vec<RequestId> = Vec::new();

        for event in &self.events {
            match event {
                ArbiterEvent::Issued { id } => {
                    if *id <= last_issued {
                        violations.push(format!("Non-monotonic issue: {id} after {last_issued}"));
                    }
                    last_issued = *id;
                }
                ArbiterEvent::Superseded { id, by } if id >= by => {
                    violations.push(format!("Superseded by older request: {id} by {by}"));
                }
                ArbiterEvent::Applied { id } | ArbiterEvent::Failed { id } => {
                    let issue_known = self.evicted == 0 || !last_issued.is_none();
                    if issue_known && *id != last_issued {
                        violations.push(format!(
                            "Settled non-current request: {id} while {last_issued} is current"
                        ));
                    }
                    if settled.contains(id) {
                        violations.push(format!("Request settled twice: {id}"));
                    }
                    settled.push(*id);
                }
                ArbiterEvent::StaleDiscarded { id, current } if id >= current => {
                    violations.push(format!(
                        "StaleDiscarded with non-stale id: {id} >= {current}"
                    ));
                }
                _ => {}
            }
        }

        violations
    }
}

// ---------------------------------------------------------------------------
// RequestArbiter
// ---------------------------------------------------------------------------

/// Decision for an arriving response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// The response belongs to the current request; apply it.
    Apply,
    /// The response is stale or duplicate; ignore it entirely.
    Discard,
}

impl Arbitration {
    #[must_use]
    pub const fn is_apply(self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Issues request ids and decides which responses may be applied.
///
/// # Invariants
///
/// - `begin()` returns ids strictly greater than every earlier id.
/// - At most one response per id is ever applied.
/// - A response is applied only if its id is the last one issued.
#[derive(Debug, Clone, Default)]
pub struct RequestArbiter {
    current: RequestId,
    outstanding: bool,
    trace: ArbiterTrace,
}

impl RequestArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request id, superseding any outstanding request.
    pub fn begin(&mut self) -> RequestId {
        let id = RequestId(self.current.0 + 1);
        if self.outstanding {
            self.trace.push(ArbiterEvent::Superseded {
                id: self.current,
                by: id,
            });
        }
        self.current = id;
        self.outstanding = true;
        self.trace.push(ArbiterEvent::Issued { id });
        id
    }

    /// Whether `id` is the most recently issued request.
    #[must_use]
    pub fn is_current(&self, id: RequestId) -> bool {
        !id.is_none() && id == self.current
    }

    /// The most recently issued id (`NONE` before the first request).
    #[must_use]
    pub const fn current(&self) -> RequestId {
        self.current
    }

    /// Whether the current request has not settled yet.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Decide whether the response for `id` applies.
    ///
    /// `succeeded` only affects the trace: a failed current request still
    /// applies (the owner shows the failure), a failed stale one is still
    /// discarded.
    pub fn settle(&mut self, id: RequestId, succeeded: bool) -> Arbitration {
        if self.is_current(id) && self.outstanding {
            self.outstanding = false;
            self.trace.push(if succeeded {
                ArbiterEvent::Applied { id }
            } else {
                ArbiterEvent::Failed { id }
            });
            return Arbitration::Apply;
        }

        if id < self.current {
            debug!(%id, current = %self.current, "ignored outdated response");
            self.trace.push(ArbiterEvent::StaleDiscarded {
                id,
                current: self.current,
            });
        } else {
            debug!(%id, "ignored duplicate response");
        }
        Arbitration::Discard
    }

    /// Forget the outstanding request without issuing a new one.
    ///
    /// Its response will be discarded on arrival.
    pub fn invalidate(&mut self) {
        if self.outstanding {
            let next = self.begin();
            self.outstanding = false;
            debug!(invalidated_through = %next, "outstanding request invalidated");
        }
    }

    #[must_use]
    pub fn trace(&self) -> &ArbiterTrace {
        &self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut a = RequestArbiter::new();
        assert!(a.current().is_none());
        let first = a.begin();
        let second = a.begin();
        assert_eq!(first.raw(), 1);
        assert!(second > first);
        assert!(a.is_current(second));
        assert!(!a.is_current(first));
        assert!(!a.is_current(RequestId::NONE));
    }

    #[test]
    fn late_response_from_older_request_is_discarded() {
        let mut a = RequestArbiter::new();
        let slow = a.begin();
        let fast = a.begin();
        assert_eq!(a.settle(fast, true), Arbitration::Apply);
        assert_eq!(a.settle(slow, true), Arbitration::Discard);
        assert!(a.trace().contains_event_type(slow, "superseded"));
        assert!(a.trace().contains_event_type(slow, "stale_discarded"));
        assert!(a.trace().verify_invariants().is_empty());
    }

    #[test]
    fn duplicate_settle_is_discarded_without_trace_violation() {
        let mut a = RequestArbiter::new();
        let id = a.begin();
        assert!(a.settle(id, false).is_apply());
        assert!(!a.settle(id, true).is_apply());
        assert!(a.trace().contains_event_type(id, "failed"));
        assert!(a.trace().verify_invariants().is_empty());
    }

    #[test]
    fn invalidate_discards_outstanding_response() {
        let mut a = RequestArbiter::new();
        let id = a.begin();
        a.invalidate();
        assert!(!a.is_outstanding());
        assert_eq!(a.settle(id, true), Arbitration::Discard);
        assert!(a.trace().verify_invariants().is_empty());
    }

    #[test]
    fn verify_invariants_flags_hand_built_violations() {
        let mut trace = ArbiterTrace::new();
        trace.push(ArbiterEvent::Issued { id: RequestId::from_raw(2) });
        trace.push(ArbiterEvent::Issued { id: RequestId::from_raw(1) });
        trace.push(ArbiterEvent::StaleDiscarded {
            id: RequestId::from_raw(3),
            current: RequestId::from_raw(1),
        });
        assert_eq!(trace.verify_invariants().len(), 2);
    }

    #[test]
    fn trace_keeps_only_recent_events() {
        let mut a = RequestArbiter::new();
        for _ in 0..DEFAULT_TRACE_CAPACITY {
            let id = a.begin();
            a.settle(id, true);
        }
        assert_eq!(a.trace().len(), DEFAULT_TRACE_CAPACITY);
        assert_eq!(a.trace().evicted(), DEFAULT_TRACE_CAPACITY as u64);
        assert!(a.trace().verify_invariants().is_empty());

        let last = a.begin();
        assert!(a.settle(last, true).is_apply());
        assert!(a.trace().contains_event_type(last, "applied"));
        assert!(!a.trace().contains_event_type(RequestId::from_raw(1), "issued"));
    }

    #[test]
    fn evicted_issue_does_not_flag_its_settlement() {
        let mut trace = ArbiterTrace::with_capacity(2);
        let id = RequestId::from_raw(1);
        trace.push(ArbiterEvent::Issued { id });
        trace.push(ArbiterEvent::StaleDiscarded {
            id: RequestId::NONE,
            current: id,
        });
        trace.push(ArbiterEvent::Applied { id });
        assert_eq!(trace.len(), 2);
        assert!(trace.verify_invariants().is_empty());
    }

    #[test]
    fn checksum_is_order_sensitive() {
        let mut a = RequestArbiter::new();
        let x = a.begin();
        a.settle(x, true);
        let mut b = RequestArbiter::new();
        let y = b.begin();
        b.settle(y, false);
        assert_ne!(a.trace().checksum(), b.trace().checksum());
        assert_eq!(a.trace().checksum(), a.clone().trace().checksum());
    }

    proptest! {
        /// Issue a batch of requests, then settle them in an arbitrary
        /// order: only the last-issued one applies.
        #[test]
        fn only_newest_applies_in_any_arrival_order(
            n in 1usize..12,
            order in proptest::collection::vec(any::<prop::sample::Index>(), 12),
        ) {
            let mut a = RequestArbiter::new();
            let ids: Vec<_> = (0..n).map(|_| a.begin()).collect();
            let mut pending = ids.clone();
            let mut applied = Vec::new();
            for pick in order.iter().take(n) {
                let idx = pick.index(pending.len());
                let id = pending.remove(idx);
                if a.settle(id, true).is_apply() {
                    applied.push(id);
                }
            }
            prop_assert_eq!(applied, vec![*ids.last().unwrap()]);
            prop_assert!(a.trace().verify_invariants().is_empty());
        }
    }
}
