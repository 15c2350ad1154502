//! Integration tests for faultline-tracing, run against a subscriber that
//! records every event it sees.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use faultline::{Error, Handler, fault};
use faultline_tracing::{FaultlineLayer, SPAN_CONTEXT_KEY, SpanExt, TracingHandler};
use tracing::{
    Level,
    field::{Field, Visit},
};
use tracing_subscriber::{Registry, layer::SubscriberExt};

#[derive(Debug)]
struct CapturedEvent {
    level: Level,
    target: String,
    fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldMap<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldMap<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldMap(&mut fields));
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            fields,
        });
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedEvent>) {
    let layer = CaptureLayer::default();
    let events = layer.events.clone();
    let subscriber = Registry::default().with(FaultlineLayer).with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    let events = std::mem::take(&mut *events.lock().unwrap());
    (result, events)
}

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
struct ConnectionRefused;

#[test]
fn test_handler_emits_one_event_per_error() {
    let handler = TracingHandler::new();
    let error = Error::new(ConnectionRefused)
        .wrap("fetching invoices")
        .with_context([("tenant", "acme"), ("attempt", "3")]);

    let ((), events) = capture(|| handler.handle(&error));

    let [event] = events.as_slice() else {
        panic!("expected exactly one event, got {events:?}");
    };
    assert_eq!(event.level, Level::ERROR);
    assert_eq!(event.target, "faultline");
    assert_eq!(event.fields["error"], "fetching invoices: connection refused");
    assert_eq!(event.fields["context"], "tenant=acme attempt=3");
    assert_eq!(event.fields["has_stack_trace"], "false");
    assert!(!event.fields.contains_key("stack_trace"));
}

#[test]
fn test_handler_level_is_configurable() {
    let handler = TracingHandler::new().level(Level::WARN);
    let ((), events) = capture(|| handler.handle(&fault!("slow query")));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::WARN);
}

#[test]
fn test_handler_includes_stack_trace_when_enabled() {
    let handler = TracingHandler::new().include_stack_trace(true);
    let error = fault!("error").with_stack_trace();

    let ((), events) = capture(|| handler.handle(&error));

    assert_eq!(
        events[0].fields.contains_key("stack_trace"),
        error.has_stack_trace()
    );
}

#[test]
fn test_span_context_records_nested_spans() {
    let (error, _) = capture(|| {
        let _outer = tracing::info_span!("request", id = 7).entered();
        let _inner = tracing::info_span!("db_query", table = "users").entered();
        fault!("row missing").with_span_context()
    });

    let span = error
        .context()
        .get(SPAN_CONTEXT_KEY)
        .map(ToString::to_string);
    assert_eq!(
        span.as_deref(),
        Some("request{id=7} > db_query{table=\"users\"}")
    );
}

#[test]
fn test_span_context_includes_recorded_fields() {
    let (result, _) = capture(|| {
        let span = tracing::info_span!("job", status = tracing::field::Empty);
        let _guard = span.enter();
        span.record("status", "failed");
        Err::<(), _>(fault!("job failed")).with_span_context()
    });

    let error = result.unwrap_err();
    assert_eq!(
        error.context().get(SPAN_CONTEXT_KEY).map(ToString::to_string).as_deref(),
        Some("job{status=\"failed\"}")
    );
}

#[test]
fn test_instrumented_function_span() {
    #[tracing::instrument(fields(user_id = 42))]
    fn load_profile() -> Result<(), Error> {
        Err(fault!("profile not found")).with_span_context()
    }

    let (result, _) = capture(load_profile);

    let error = result.unwrap_err();
    assert_eq!(
        error.context().get(SPAN_CONTEXT_KEY).map(ToString::to_string).as_deref(),
        Some("load_profile{user_id=42}")
    );
}
