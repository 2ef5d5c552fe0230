//! Record resolver events in tests.
//!
//! Events are kept as structured records so tests can assert on the level,
//! message and fields of what was emitted rather than on formatted text.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// One event as it was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub level: Level,
    pub message: String,
    /// Every field except `message`, rendered with `Debug` (or verbatim for
    /// strings).
    pub fields: BTreeMap<String, String>,
}

impl RecordedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// The events recorded by a [`recording_subscriber`], in emission order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }

    /// Events whose message starts with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message.starts_with(prefix))
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordingVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(RecordedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct RecordingVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl RecordingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordingVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

/// A subscriber that records every event at `max_level` or more severe.
///
/// Use with [`tracing::subscriber::with_default`].
pub fn recording_subscriber(max_level: Level) -> (impl Subscriber, EventLog) {
    let log = EventLog::default();
    let subscriber = tracing_subscriber::registry()
        .with(log.clone().with_filter(LevelFilter::from_level(max_level)));
    (subscriber, log)
}
