//! Sink adapters.

use synthlog_core::{Event, Severity, SharedSink, Sink, SinkError};
use tracing::{debug, error, info, warn};

/// Routes generated events into the process's `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&self, event: Event) -> Result<(), SinkError> {
        let payload = serde_json::Value::Object(event.payload().clone());
        let correlation_id = event.correlation_id().unwrap_or("-");
        match event.severity() {
            Severity::Debug => debug!(target: "synthlog::events", correlation_id, %payload, "{}", event.message()),
            Severity::Info => info!(target: "synthlog::events", correlation_id, %payload, "{}", event.message()),
            Severity::Warn => warn!(target: "synthlog::events", correlation_id, %payload, "{}", event.message()),
            Severity::Error => error!(target: "synthlog::events", correlation_id, %payload, "{}", event.message()),
        }
        Ok(())
    }
}

/// Drops events below a minimum severity before they reach `inner`
pub struct LevelFilter {
    min: Severity,
    inner: SharedSink,
}

impl LevelFilter {
    pub fn new(min: Severity, inner: SharedSink) -> Self {
        Self { min, inner }
    }
}

impl Sink for LevelFilter {
    fn emit(&self, event: Event) -> Result<(), SinkError> {
        if event.severity() < self.min {
            return Ok(());
        }
        self.inner.emit(event)
    }
}
