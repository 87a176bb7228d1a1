//! Traffic Generator
//!
//! The driving loop. One request at a time, paced by a drifting base
//! interval, with the spike ticker and noise bursts running beside it:
//!
//! ```text
//!  started ─▶ warm-up ─▶ ┌─ pause ─▶ request ─▶ maybe noise ─┐
//!                        └──────────────◀─────────────────────┘
//!                                 │ cancel        │ fault
//!                                 ▼               ▼
//!                           shutting down   application error
//! ```

use crate::catalog::ENDPOINTS;
use crate::config::SimulatorConfig;
use crate::error::{Result, SimError};
use crate::event::{Event, SharedSink, fields};
use crate::ids::{CorrelationId, long_id};
use crate::noise::NoiseScheduler;
use crate::request::{RequestOutcome, RequestSimulator};
use crate::rng::RandomSource;
use crate::spike::{SpikeController, SpikeState};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const APPLICATION_STARTED: &str = "Application started";
pub const TRAFFIC_STARTED: &str = "Starting API traffic simulation";
pub const SHUTTING_DOWN: &str = "Application shutting down";
pub const APPLICATION_ERROR: &str = "Application error";

// ============================================================================
// Pacing
// ============================================================================

/// Pause between requests.
///
/// The base interval is re-drawn once per drift period; every pause adds
/// jitter on top and is divided by the pace divisor during a spike.
#[derive(Debug, Clone)]
pub struct Pacer {
    base_range: RangeInclusive<u64>,
    jitter: RangeInclusive<u64>,
    drift_period: RangeInclusive<u64>,
    divisor: u32,
    base: Duration,
    next_drift: Option<Instant>,
}

impl Pacer {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            base_range: config.base_interval_ms.clone(),
            jitter: config.pause_jitter_ms.clone(),
            drift_period: config.drift_period_secs.clone(),
            divisor: u32::try_from(config.spike_pace_divisor.max(1)).unwrap_or(u32::MAX),
            base: Duration::ZERO,
            next_drift: None,
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.base
    }

    pub fn next_pause<R: RandomSource>(&mut self, now: Instant, spiking: bool, rng: &mut R) -> Duration {
        if self.next_drift.is_none_or(|at| now >= at) {
            self.base = Duration::from_millis(rng.draw(&self.base_range));
            let period = Duration::from_secs(rng.draw(&self.drift_period));
            self.next_drift = Some(now + period);
            debug!(
                base_ms = self.base.as_millis() as u64,
                period_s = period.as_secs(),
                "Request pace drifted"
            );
        }

        let pause = self.base + Duration::from_millis(rng.draw(&self.jitter));
        if spiking { pause / self.divisor } else { pause }
    }
}

// ============================================================================
// Run summary
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub requests: u64,
    pub server_errors: u64,
    pub spike_forced: u64,
    pub db_calls: u64,
    pub db_failures: u64,
    pub noise_bursts: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &RequestOutcome) {
        self.requests += 1;
        if outcome.status >= 500 {
            self.server_errors += 1;
        }
        if outcome.spike_forced {
            self.spike_forced += 1;
        }
        self.db_calls += outcome.queries.len() as u64;
        self.db_failures += outcome.queries.iter().filter(|q| q.failed).count() as u64;
    }
}

// ============================================================================
// Generator
// ============================================================================

pub struct TrafficGenerator {
    config: SimulatorConfig,
    sink: SharedSink,
    spike: Arc<SpikeState>,
    requests: RequestSimulator,
    noise: NoiseScheduler,
    pacer: Pacer,
    rng: StdRng,
}

impl TrafficGenerator {
    /// Generator seeded from the operating system
    pub fn new(config: SimulatorConfig, sink: SharedSink) -> Result<Self> {
        let rng = StdRng::try_from_os_rng().map_err(|e| SimError::RandomSource(e.to_string()))?;
        Self::with_rng(config, sink, rng)
    }

    /// Reproducible generator: the same seed yields the same event stream
    pub fn with_seed(config: SimulatorConfig, sink: SharedSink, seed: u64) -> Result<Self> {
        Self::with_rng(config, sink, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulatorConfig, sink: SharedSink, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let spike = Arc::new(SpikeState::new());
        Ok(Self {
            requests: RequestSimulator::new(&config, spike.clone(), sink.clone())?,
            noise: NoiseScheduler::new(&config, sink.clone()),
            pacer: Pacer::new(&config),
            spike,
            sink,
            config,
            rng,
        })
    }

    pub fn spike_state(&self) -> Arc<SpikeState> {
        self.spike.clone()
    }

    /// Generate traffic until `cancel` fires or a fault stops the loop.
    ///
    /// A fault is reported through the sink as a last event when the sink
    /// still accepts one.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let result = self.drive(&cancel, &mut summary).await;
        self.noise.shutdown();

        match &result {
            Ok(()) => {
                info!(
                    requests = summary.requests,
                    server_errors = summary.server_errors,
                    noise_bursts = summary.noise_bursts,
                    "Traffic generation stopped"
                );
                let id = self.new_id();
                self.sink.emit(
                    Event::warn(SHUTTING_DOWN)
                        .with(fields::CORRELATION_ID, id.as_str())
                        .with("requests", summary.requests),
                )?;
            }
            Err(e) => {
                warn!(error = %e, requests = summary.requests, "Traffic generation failed");
                let report = Event::error(APPLICATION_ERROR)
                    .with(fields::CORRELATION_ID, self.new_id().as_str())
                    .with(fields::ERROR, e.to_string());
                if let Err(sink_err) = self.sink.emit(report) {
                    debug!(error = %sink_err, "Fault report not delivered");
                }
            }
        }
        result.map(|()| summary)
    }

    async fn drive(&mut self, cancel: &CancellationToken, summary: &mut RunSummary) -> Result<()> {
        let id = self.new_id();
        self.sink.emit(
            Event::info(APPLICATION_STARTED)
                .with(fields::CORRELATION_ID, id.as_str())
                .with("version", env!("CARGO_PKG_VERSION")),
        )?;
        let id = self.new_id();
        self.sink.emit(
            Event::info(TRAFFIC_STARTED)
                .with(fields::CORRELATION_ID, id.as_str())
                .with("endpoints", ENDPOINTS.len()),
        )?;
        info!(
            endpoints = ENDPOINTS.len(),
            spike_probability = self.config.spike_probability,
            noise_probability = self.config.noise_probability,
            "Traffic generation started"
        );

        let spike_cancel = cancel.child_token();
        let _stop_spikes = spike_cancel.clone().drop_guard();
        let controller = SpikeController::new(
            self.spike.clone(),
            self.sink.clone(),
            self.config.spike_probability,
            self.config.spike_duration_secs.clone(),
        )
        .with_id_format(self.config.correlation_id_format);
        let mut spike_task = tokio::spawn(controller.run(
            self.config.spike_check_interval(),
            StdRng::from_rng(&mut self.rng),
            spike_cancel.clone(),
        ));

        let warmup = Duration::from_millis(self.rng.draw(&self.config.warmup_ms));
        let mut next_pause = warmup;

        while wait(next_pause, cancel, &mut spike_task).await? {
            let endpoint = *self
                .rng
                .pick(ENDPOINTS.as_slice())
                .ok_or_else(|| SimError::InvalidConfig("endpoint catalog is empty".to_string()))?;

            let outcome = self.requests.simulate(endpoint, &mut self.rng).await?;
            summary.record(&outcome);

            if self.rng.chance(self.config.noise_probability) {
                self.noise.emit_burst(&mut self.rng);
                summary.noise_bursts += 1;
            }
            self.noise.reap()?;

            next_pause = self
                .pacer
                .next_pause(Instant::now(), self.spike.is_active(), &mut self.rng);
        }

        spike_cancel.cancel();
        spike_task.await??;
        Ok(())
    }

    fn new_id(&mut self) -> CorrelationId {
        long_id(&mut self.rng, self.config.correlation_id_format)
    }
}

/// Sleep for `duration` unless cancelled first. A spike controller that
/// exits on its own is a fault.
async fn wait(
    duration: Duration,
    cancel: &CancellationToken,
    spike_task: &mut JoinHandle<Result<()>>,
) -> Result<bool> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(false),
        joined = spike_task => {
            joined??;
            Err(SimError::Task("spike controller stopped unexpectedly".to_string()))
        }
        _ = tokio::time::sleep(duration) => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MemorySink, Severity};
    use crate::request::{REQUEST_FAILED, REQUEST_RECEIVED, RESPONSE_SENT};
    use crate::rng::ScriptedSource;
    use crate::spike::SPIKE_STARTED;

    fn fixed_pace() -> SimulatorConfig {
        SimulatorConfig {
            base_interval_ms: 1_000..=1_000,
            pause_jitter_ms: 100..=100,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_drifts_per_period() {
        let mut pacer = Pacer::new(&SimulatorConfig::default());
        let t0 = Instant::now();
        // base 100 + 400, drift 20s + 0, jitter 50 + 0
        let mut rng = ScriptedSource::new().with_draws([400, 0, 0, 0, 0]);

        assert_eq!(pacer.next_pause(t0, false, &mut rng), Duration::from_millis(550));
        assert_eq!(pacer.base_interval(), Duration::from_millis(500));

        // Same base until the period is over
        let mut rng = ScriptedSource::new().with_draws([100]);
        let later = t0 + Duration::from_secs(19);
        assert_eq!(pacer.next_pause(later, false, &mut rng), Duration::from_millis(650));

        let mut rng = ScriptedSource::new();
        let after = t0 + Duration::from_secs(20);
        assert_eq!(pacer.next_pause(after, false, &mut rng), Duration::from_millis(150));
        assert_eq!(pacer.base_interval(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_speeds_up_during_spike() {
        let mut pacer = Pacer::new(&fixed_pace());
        let now = Instant::now();
        let mut rng = ScriptedSource::new();

        assert_eq!(pacer.next_pause(now, false, &mut rng), Duration::from_millis(1_100));
        assert_eq!(pacer.next_pause(now, true, &mut rng), Duration::from_millis(275));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let sink = MemorySink::shared();
        let generator = TrafficGenerator::with_seed(SimulatorConfig::default(), sink.clone(), 7).unwrap();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(generator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        let summary = handle.await.unwrap().unwrap();

        let events = sink.events();
        assert_eq!(events[0].message(), APPLICATION_STARTED);
        assert_eq!(events[1].message(), TRAFFIC_STARTED);
        let last = events.last().unwrap();
        assert_eq!(last.message(), SHUTTING_DOWN);
        assert_eq!(last.severity(), Severity::Warn);

        let lifecycle: std::collections::HashSet<_> = [&events[0], &events[1], last]
            .iter()
            .map(|e| e.correlation_id().unwrap().to_string())
            .collect();
        assert_eq!(lifecycle.len(), 3);

        assert!(summary.requests > 10);
        let received = events.iter().filter(|e| e.message() == REQUEST_RECEIVED).count() as u64;
        let completed = events
            .iter()
            .filter(|e| e.message() == RESPONSE_SENT || e.message() == REQUEST_FAILED)
            .count() as u64;
        assert_eq!(received, summary.requests);
        assert_eq!(completed, summary.requests);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_stream() {
        async fn messages(seed: u64) -> Vec<String> {
            let sink = MemorySink::shared();
            let generator = TrafficGenerator::with_seed(fixed_pace(), sink.clone(), seed).unwrap();
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(generator.run(cancel.clone()));
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
            handle.await.unwrap().unwrap();
            sink.events()
                .into_iter()
                .filter(|e| e.message() == REQUEST_RECEIVED)
                .map(|e| e.correlation_id().unwrap_or_default().to_string())
                .collect()
        }

        let first = messages(99).await;
        assert!(!first.is_empty());
        assert_eq!(first, messages(99).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_raises_rate_and_errors() {
        async fn run(config: SimulatorConfig) -> RunSummary {
            let sink = MemorySink::shared();
            let generator = TrafficGenerator::with_seed(config, sink.clone(), 3).unwrap();
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(generator.run(cancel.clone()));
            tokio::time::sleep(Duration::from_secs(120)).await;
            cancel.cancel();
            handle.await.unwrap().unwrap()
        }

        let calm = run(SimulatorConfig {
            spike_probability: 0.0,
            ..fixed_pace()
        })
        .await;
        let spiking = run(SimulatorConfig {
            spike_probability: 1.0,
            spike_duration_secs: 1_000..=1_000,
            ..fixed_pace()
        })
        .await;

        assert_eq!(calm.spike_forced, 0);
        assert!(spiking.spike_forced > 0);
        assert!(spiking.requests > calm.requests);
        assert!(spiking.server_errors > calm.server_errors);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_events_reach_sink() {
        let sink = MemorySink::shared();
        let config = SimulatorConfig {
            spike_probability: 1.0,
            ..Default::default()
        };
        let generator = TrafficGenerator::with_seed(config, sink.clone(), 1).unwrap();
        let spike = generator.spike_state();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(generator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(spike.is_active());
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let started = sink.events().iter().filter(|e| e.message() == SPIKE_STARTED).count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_stops_the_loop() {
        let sink = MemorySink::shared();
        let generator = TrafficGenerator::with_seed(SimulatorConfig::default(), sink.clone(), 5).unwrap();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(generator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(10)).await;
        sink.close();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SimError::Sink(_))));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SimulatorConfig {
            spike_probability: 2.0,
            ..Default::default()
        };
        let result = TrafficGenerator::with_seed(config, MemorySink::shared(), 0);
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }
}
