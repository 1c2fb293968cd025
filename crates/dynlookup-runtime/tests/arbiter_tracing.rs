#![forbid(unsafe_code)]

//! Tracing integration tests for request arbitration.
//!
//! Stale responses are an expected outcome of racing requests. They must be
//! visible at debug level and never reported as warnings or errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dynlookup_runtime::{Arbitration, RequestArbiter};
use tracing_subscriber::layer::SubscriberExt;

/// A captured event with its level and fields.
#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    fields: HashMap<String, String>,
}

/// A tracing Layer that captures every event.
struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

/// Visitor that extracts event fields.
struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0.into_iter().collect(),
        });
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = EventCapture {
        events: events.clone(),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    (result, captured)
}

#[test]
fn stale_discard_logs_at_debug_only() {
    let (outcomes, events) = capture(|| {
        let mut arbiter = RequestArbiter::new();
        let slow = arbiter.begin();
        let fast = arbiter.begin();
        (arbiter.settle(fast, true), arbiter.settle(slow, true))
    });

    assert_eq!(outcomes, (Arbitration::Apply, Arbitration::Discard));

    let stale: Vec<_> = events
        .iter()
        .filter(|e| {
            e.fields
                .get("message")
                .is_some_and(|m| m.contains("ignored outdated response"))
        })
        .collect();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].level, tracing::Level::DEBUG);
    assert_eq!(
        stale[0].fields.get("id").map(String::as_str),
        Some("Request(1)")
    );
    assert!(
        events
            .iter()
            .all(|e| e.level != tracing::Level::WARN && e.level != tracing::Level::ERROR)
    );
}

#[test]
fn applied_response_emits_no_discard_event() {
    let (_, events) = capture(|| {
        let mut arbiter = RequestArbiter::new();
        let id = arbiter.begin();
        arbiter.settle(id, true)
    });
    assert!(!events.iter().any(|e| {
        e.fields
            .get("message")
            .is_some_and(|m| m.contains("ignored"))
    }));
}
