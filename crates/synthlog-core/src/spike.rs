//! Traffic Spike State Machine
//!
//! ```text
//!            roll(p) succeeds
//!   normal ───────────────────▶ spiking
//!      ▲    end = now + d             │
//!      └──────────────────────────────┘
//!               now >= end
//! ```
//!
//! [`SpikeState`] is shared by `Arc` with every reader. Only
//! [`SpikeController`] moves it between states, one transition per tick at most.

use crate::error::Result;
use crate::event::{Event, SharedSink, fields};
use crate::ids::{IdFormat, long_id};
use crate::rng::RandomSource;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SPIKE_STARTED: &str = "Traffic spike detected";
pub const SPIKE_ENDED: &str = "Traffic spike ended";

/// Process-wide spike flag and window end
#[derive(Debug, Default)]
pub struct SpikeState {
    active: AtomicBool,
    ends_at: Mutex<Option<Instant>>,
}

impl SpikeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// End of the current spike window, `None` while normal
    pub fn ends_at(&self) -> Option<Instant> {
        *self.ends_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left in the current spike window
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.ends_at().map(|end| end.saturating_duration_since(now))
    }

    pub(crate) fn begin(&self, ends_at: Instant) {
        *self.ends_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(ends_at);
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn finish(&self) {
        self.active.store(false, Ordering::Release);
        *self.ends_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpikeTransition {
    Started { ends_at: Instant },
    Ended,
}

pub struct SpikeController {
    state: Arc<SpikeState>,
    sink: SharedSink,
    probability: f64,
    duration_secs: RangeInclusive<u64>,
    id_format: IdFormat,
    started_at: Option<Instant>,
}

impl SpikeController {
    pub fn new(
        state: Arc<SpikeState>,
        sink: SharedSink,
        probability: f64,
        duration_secs: RangeInclusive<u64>,
    ) -> Self {
        Self {
            state,
            sink,
            probability,
            duration_secs,
            id_format: IdFormat::default(),
            started_at: None,
        }
    }

    pub fn with_id_format(mut self, format: IdFormat) -> Self {
        self.id_format = format;
        self
    }

    pub fn state(&self) -> &SpikeState {
        &self.state
    }

    /// One scheduler tick at time `now`
    pub fn tick<R: RandomSource>(
        &mut self,
        now: Instant,
        rng: &mut R,
    ) -> Result<Option<SpikeTransition>> {
        if self.state.is_active() {
            let due = self.state.ends_at().is_none_or(|end| now >= end);
            if !due {
                return Ok(None);
            }

            let lasted = self
                .started_at
                .take()
                .map(|start| now.saturating_duration_since(start))
                .unwrap_or_default();
            self.state.finish();
            debug!(lasted_ms = lasted.as_millis() as u64, "Spike window closed");

            self.sink.emit(
                Event::info(SPIKE_ENDED)
                    .with(fields::CORRELATION_ID, long_id(rng, self.id_format).as_str())
                    .with("durationMs", lasted.as_millis() as u64),
            )?;
            return Ok(Some(SpikeTransition::Ended));
        }

        if !rng.chance(self.probability) {
            return Ok(None);
        }

        let duration = Duration::from_secs(rng.draw(&self.duration_secs));
        let ends_at = now + duration;
        self.state.begin(ends_at);
        self.started_at = Some(now);
        debug!(duration_ms = duration.as_millis() as u64, "Spike window opened");

        self.sink.emit(
            Event::error(SPIKE_STARTED)
                .with(fields::CORRELATION_ID, long_id(rng, self.id_format).as_str())
                .with("durationMs", duration.as_millis() as u64),
        )?;
        Ok(Some(SpikeTransition::Started { ends_at }))
    }

    /// Tick every `period` until cancelled
    pub async fn run<R: RandomSource>(
        mut self,
        period: Duration,
        mut rng: R,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                instant = ticker.tick() => {
                    self.tick(instant, &mut rng)?;
                }
            }
        }
        Ok(())
    }
}
