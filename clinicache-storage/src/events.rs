//! Structured event sink.
//!
//! The metrics/alerting pipeline is an external consumer. The cache layer
//! only emits `(category, name, attributes)` triples into an `EventSink`.

use serde_json::Value;

/// Receiver of structured cache and repository events.
///
/// `emit` must not block; sinks that forward over the network should queue.
pub trait EventSink: Send + Sync {
    fn emit(&self, category: &str, name: &str, attributes: Value);
}

/// Forwards events to `tracing` at INFO under the `clinicache::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, category: &str, name: &str, attributes: Value) {
        tracing::info!(
            target: "clinicache::events",
            category = category,
            event = name,
            attributes = %attributes,
            "cache event"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _category: &str, _name: &str, _attributes: Value) {}
}
