//! Event Types and the Sink Contract
//!
//! An [`Event`] is the only thing the engine produces. Ownership moves into the
//! [`Sink`] on emission; the engine keeps no history.

use crate::error::SinkError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Structured event payload (field name -> JSON value)
pub type Payload = Map<String, Value>;

// ============================================================================
// Severity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event
// ============================================================================

/// Payload field names shared by several event kinds.
pub mod fields {
    pub const CORRELATION_ID: &str = "correlationId";
    pub const METHOD: &str = "method";
    pub const PATH: &str = "path";
    pub const STATUS_CODE: &str = "statusCode";
    pub const ELAPSED_TIME: &str = "elapsedTime";
    pub const ERROR: &str = "error";
}

/// One structured telemetry record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    severity: Severity,
    message: String,
    payload: Payload,
}

impl Event {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            payload: Payload::new(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(Severity::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Add a payload field. Consumes the builder so an emitted event can't change.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.field(fields::CORRELATION_ID).and_then(Value::as_str)
    }

    pub fn into_parts(self) -> (Severity, String, Payload) {
        (self.severity, self.message, self.payload)
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Destination for generated events.
///
/// `emit` must not block. Delivery problems for individual records are the
/// sink's own business; an `Err` means the sink is unusable and the
/// simulation has to stop.
pub trait Sink: Send + Sync {
    fn emit(&self, event: Event) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, event: Event) -> Result<(), SinkError> {
        (**self).emit(event)
    }
}

/// Thread-safe handle to a sink
pub type SharedSink = Arc<dyn Sink>;

/// Sink that records every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reject every later emission with [`SinkError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Sink for MemorySink {
    fn emit(&self, event: Event) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
