//! Synthetic API telemetry.
//!
//! Generates a believable stream of structured log events for a fictitious
//! HTTP service: request lifecycles with nested database calls, status codes
//! drawn from weighted distributions, periodic traffic spikes and unrelated
//! background noise. Events go to a caller-supplied [`Sink`].

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod event;
pub mod ids;
pub mod noise;
pub mod request;
pub mod rng;
pub mod spike;
pub mod traffic;
pub mod weighted;

pub use config::SimulatorConfig;
pub use error::{Result, SimError, SinkError};
pub use event::{Event, MemorySink, Payload, Severity, SharedSink, Sink};
pub use ids::{CorrelationId, IdFormat};
pub use rng::{RandomSource, ScriptedSource};
pub use spike::SpikeState;
pub use traffic::{RunSummary, TrafficGenerator};
pub use weighted::WeightedChoice;
