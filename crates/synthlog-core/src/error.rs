//! Genuine faults of the simulator.
//!
//! Fabricated failures (database errors, 5xx responses, exceptions) are event
//! payloads, never values of these types.

use thiserror::Error;

/// Failure reported by a [`Sink`](crate::event::Sink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink no longer accepts events.
    #[error("sink is closed")]
    Closed,
    /// The sink refused the event and cannot recover.
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("random source unavailable: {0}")]
    RandomSource(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SimError {
    fn from(err: tokio::task::JoinError) -> Self {
        SimError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
