//! Background Noise
//!
//! Fire-and-forget records unrelated to any request: cache hits, pool status,
//! logins and the like. A burst renders its events up front, then hands each
//! one to its own task that waits out a random delay before emitting.

use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::event::{Event, SharedSink, fields};
use crate::ids::{CorrelationId, IdFormat, long_id, short_id};
use crate::rng::RandomSource;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseKind {
    CacheHit,
    MemoryCheck,
    HealthCheck,
    ConnectionPool,
    ScheduledTask,
    RateLimitCheck,
    SessionCreated,
    FileUploaded,
    BackgroundJob,
    ConfigReload,
    UserLogin,
    MetricsSnapshot,
}

impl NoiseKind {
    pub const ALL: [NoiseKind; 12] = [
        Self::CacheHit,
        Self::MemoryCheck,
        Self::HealthCheck,
        Self::ConnectionPool,
        Self::ScheduledTask,
        Self::RateLimitCheck,
        Self::SessionCreated,
        Self::FileUploaded,
        Self::BackgroundJob,
        Self::ConfigReload,
        Self::UserLogin,
        Self::MetricsSnapshot,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            Self::CacheHit => "Cache hit",
            Self::MemoryCheck => "Memory usage check",
            Self::HealthCheck => "Health check passed",
            Self::ConnectionPool => "Connection pool status",
            Self::ScheduledTask => "Scheduled task executed",
            Self::RateLimitCheck => "Rate limit check",
            Self::SessionCreated => "Session created",
            Self::FileUploaded => "File uploaded",
            Self::BackgroundJob => "Background job started",
            Self::ConfigReload => "Configuration reloaded",
            Self::UserLogin => "User logged in",
            Self::MetricsSnapshot => "Metrics collected",
        }
    }

    /// Build the event for this kind, drawing its payload values from `rng`
    pub fn render<R: RandomSource>(&self, burst: &BurstContext, rng: &mut R) -> Event {
        let id = burst.correlation_id.as_str();
        match self {
            Self::CacheHit => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("cacheKey", format!("user_session_{}", burst.session_id))
                .with("hitRate", 0.85),
            Self::MemoryCheck => {
                let total_mb = 512;
                let used_mb = rng.between(32, 480);
                let percentage = (used_mb as f64 * 1000.0 / total_mb as f64).round() / 10.0;
                Event::debug(self.message())
                    .with(fields::CORRELATION_ID, id)
                    .with("used", format!("{}MB", used_mb))
                    .with("total", format!("{}MB", total_mb))
                    .with("percentage", percentage)
            }
            Self::HealthCheck => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("service", "database")
                .with("responseTime", rng.between(1, 10)),
            Self::ConnectionPool => Event::debug(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("active", rng.between(1, 20))
                .with("idle", rng.between(0, 20))
                .with("waiting", rng.between(0, 5)),
            Self::ScheduledTask => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("task", "cleanup_temp_files")
                .with("duration", rng.between(100, 500)),
            Self::RateLimitCheck => Event::debug(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("ip", format!("192.168.1.{}", rng.below(255)))
                .with("allowed", true),
            Self::SessionCreated => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("sessionId", short_id(rng, 12))
                .with("userId", burst.user_id),
            Self::FileUploaded => Event::debug(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("filename", format!("document_{}.pdf", rng.below(100)))
                .with("size", rng.between(1_024, 1_048_576)),
            Self::BackgroundJob => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("jobType", "email_sender")
                .with("queueSize", rng.below(50)),
            Self::ConfigReload => Event::debug(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("configFile", "app.config")
                .with("version", "1.2.3"),
            Self::UserLogin => Event::info(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("userId", burst.user_id)
                .with("ip", format!("10.0.{}.{}", rng.below(255), rng.below(255))),
            Self::MetricsSnapshot => Event::debug(self.message())
                .with(fields::CORRELATION_ID, id)
                .with("cpu", percent(rng))
                .with("memory", percent(rng))
                .with("disk", percent(rng)),
        }
    }
}

fn percent<R: RandomSource>(rng: &mut R) -> f64 {
    (rng.unit() * 10_000.0).round() / 100.0
}

/// Values shared by every event of one burst
#[derive(Debug, Clone)]
pub struct BurstContext {
    pub correlation_id: CorrelationId,
    pub session_id: String,
    pub user_id: u64,
}

impl BurstContext {
    pub fn generate<R: RandomSource>(rng: &mut R, format: IdFormat) -> Self {
        Self {
            correlation_id: long_id(rng, format),
            session_id: short_id(rng, 12),
            user_id: rng.between(1, 1_000),
        }
    }
}

pub struct NoiseScheduler {
    sink: SharedSink,
    burst_size: RangeInclusive<u64>,
    delay_ms: RangeInclusive<u64>,
    id_format: IdFormat,
    tasks: JoinSet<Result<()>>,
}

impl NoiseScheduler {
    pub fn new(config: &SimulatorConfig, sink: SharedSink) -> Self {
        Self {
            sink,
            burst_size: config.noise_burst_size.clone(),
            delay_ms: config.noise_delay_ms.clone(),
            id_format: config.correlation_id_format,
            tasks: JoinSet::new(),
        }
    }

    /// Schedule one burst and return immediately. Returns the burst size.
    ///
    /// Must be called from within a tokio runtime.
    pub fn emit_burst<R: RandomSource>(&mut self, rng: &mut R) -> usize {
        let burst = BurstContext::generate(rng, self.id_format);
        let count = rng.draw(&self.burst_size) as usize;

        for _ in 0..count {
            let kind = *rng.pick(&NoiseKind::ALL).unwrap_or(&NoiseKind::CacheHit);
            let event = kind.render(&burst, rng);
            let delay = Duration::from_millis(rng.draw(&self.delay_ms));
            let sink = self.sink.clone();

            self.tasks.spawn(async move {
                tokio::time::sleep(delay).await;
                sink.emit(event)?;
                Ok(())
            });
        }

        trace!(
            correlation_id = %burst.correlation_id,
            count,
            pending = self.tasks.len(),
            "Noise burst scheduled"
        );
        count
    }

    /// Scheduled events not yet emitted or collected
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Collect finished tasks without waiting. Surfaces the first failure.
    pub fn reap(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.try_join_next() {
            settle(joined)?;
        }
        Ok(())
    }

    /// Wait for every scheduled event
    pub async fn drain(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            settle(joined)?;
        }
        Ok(())
    }

    /// Abort everything still waiting
    pub fn shutdown(&mut self) {
        if !self.tasks.is_empty() {
            trace!(pending = self.tasks.len(), "Aborting pending noise");
        }
        self.tasks.abort_all();
    }
}

impl Drop for NoiseScheduler {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

fn settle(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
