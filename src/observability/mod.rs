//! Observability subsystem for strata
//!
//! This module provides:
//! - Typed lifecycle events
//! - Structured logging through `tracing`
//! - Subscriber installation for binaries and tests
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Deterministic field ordering
//!
//! # Usage
//!
//! ```ignore
//! use strata::observability::{init_logging, log_event, Event, LogFormat};
//!
//! init_logging(LogFormat::Json);
//! log_event(Event::QueryCompleted, &[("rows", "42")]);
//! ```

mod events;
mod logger;

pub use events::{Event, EventLevel};
pub use logger::{init_logging, LogFormat, LOG_ENV};

/// Renders fields sorted by key as `k=v` pairs
fn render_fields(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a lifecycle event with fields at the event's level
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let rendered = render_fields(fields);
    match event.level() {
        EventLevel::Debug => tracing::debug!(event = event.as_str(), fields = %rendered),
        EventLevel::Info => tracing::info!(event = event.as_str(), fields = %rendered),
        EventLevel::Warn => tracing::warn!(event = event.as_str(), fields = %rendered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_render_in_key_order() {
        assert_eq!(
            render_fields(&[("rows", "3"), ("path", "/d/p.scol")]),
            "path=/d/p.scol rows=3"
        );
    }

    #[test]
    fn test_log_event() {
        // This just verifies no panic without a subscriber
        log_event(Event::QueryStarted, &[]);
        log_event(Event::PartitionSkipped, &[("path", "p.scol")]);
    }
}
