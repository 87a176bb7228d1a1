//! # synthlog-sim - Output Side of the Telemetry Generator
//!
//! Takes the events produced by `synthlog-core` and gets them somewhere
//! useful: stdout, the tracing subscriber, or a Loki push endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   emit()   ┌─────────────┐  try_send  ┌──────────────┐
//! │  TrafficGenerator  │──────────▶│ LevelFilter │──────────▶│  Forwarder   │
//! │  (synthlog-core)   │            └─────────────┘            │ mpsc + batch │
//! └────────────────────┘                                       └──────┬───────┘
//!                                                                     │ deliver()
//!                                              ┌──────────────────────┼──────────────┐
//!                                              ▼                      ▼              ▼
//!                                        JSON lines            pretty text     Loki push
//! ```
//!
//! The generator never waits on delivery. A full channel drops the record and
//! a failed batch is counted, both without stopping the simulation.

pub mod cli;
pub mod forwarder;
pub mod output;
pub mod sinks;
pub mod transport;

pub use forwarder::{Forwarder, ForwarderConfig, ForwarderStats, StatsSnapshot};
pub use output::Output;
pub use sinks::{LevelFilter, TracingSink};
pub use transport::{
    LineFormat, LineTransport, LokiConfig, LokiPush, LokiStream, LokiTransport, Record, Transport,
    TransportError,
};
