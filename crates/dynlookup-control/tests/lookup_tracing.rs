#![forbid(unsafe_code)]

//! Log levels of the lookup control's fetch outcomes.
//!
//! Outdated responses are routine and stay at debug level; failed fetches
//! surface as errors with their kind attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;

use dynlookup_control::{Lookup, MemoryBackend, Msg};
use dynlookup_core::{LookupConfig, QueryError, Row};
use dynlookup_runtime::{ProgramSimulator, TaskMode};

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn message(&self) -> &str {
        self.fields.get("message").map_or("", String::as_str)
    }
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
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

fn rows() -> Vec<Row> {
    json!([{"Id": "1", "Name": "Acme"}, {"Id": "2", "Name": "Globex"}])
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

fn ready_sim(backend: Arc<MemoryBackend>) -> ProgramSimulator<Lookup> {
    let lookup = Lookup::new(LookupConfig::default().with_object_type("Account"), backend);
    let mut sim = ProgramSimulator::new(lookup).with_task_mode(TaskMode::Deferred);
    sim.init();
    sim.complete_all_tasks();
    sim
}

#[test]
fn outdated_response_is_debug_only() {
    let backend = Arc::new(MemoryBackend::new(rows()));
    let (candidates, events) = capture(|| {
        let mut sim = ready_sim(backend);
        sim.send(Msg::InputChanged("a".into()));
        sim.advance(Duration::from_millis(350));
        sim.send(Msg::InputChanged("glo".into()));
        sim.advance(Duration::from_millis(350));
        sim.complete_last_task();
        sim.complete_next_task();
        sim.model().candidates().len()
    });
    assert_eq!(candidates, 1);

    let stale: Vec<_> = events
        .iter()
        .filter(|e| e.message().contains("ignored outdated response"))
        .collect();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].level, tracing::Level::DEBUG);
    assert!(
        events
            .iter()
            .all(|e| e.level != tracing::Level::WARN && e.level != tracing::Level::ERROR)
    );
}

#[test]
fn failed_fetch_logs_error_with_kind() {
    let backend = Arc::new(MemoryBackend::new(rows()));
    let (_, events) = capture(|| {
        let mut sim = ready_sim(backend.clone());
        backend.fail_with(QueryError::Rejected("bad field".into()));
        sim.send(Msg::Show);
        sim.complete_all_tasks();
    });

    let failures: Vec<_> = events
        .iter()
        .filter(|e| e.message() == "fetch failed")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, tracing::Level::ERROR);
    assert_eq!(
        failures[0].fields.get("kind").map(String::as_str),
        Some("rejected")
    );
}

#[test]
fn readiness_changes_log_at_info() {
    let backend = Arc::new(MemoryBackend::new(rows()));
    let (_, events) = capture(|| ready_sim(backend).model().is_ready());
    let ready: Vec<_> = events
        .iter()
        .filter(|e| e.message() == "component initialized changed")
        .collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].level, tracing::Level::INFO);
    assert_eq!(ready[0].fields.get("ready").map(String::as_str), Some("true"));
}
