//! Request Lifecycle Simulation
//!
//! Walks one imagined API call from arrival to response:
//!
//! ```text
//! received ─▶ db × (1..=4) ─▶ processing ─▶ classify ─┬─▶ response sent   (< 500)
//!                                                     └─▶ exception ─▶ request failed (>= 500)
//! ```
//!
//! Every event of one call carries the same correlation id. A call emits
//! `2 + db_ops + spike_forced + server_error` events, no more and no less.

use crate::catalog::{
    DB_OPERATION_WEIGHTS, DbOperation, EXCEPTIONS, EndpointDescriptor, NORMAL_STATUS_WEIGHTS,
    SERVER_ERROR_REASON, SOURCE_FILES, SPIKE_STATUS_WEIGHTS, USER_AGENTS,
};
use crate::config::SimulatorConfig;
use crate::database::{DatabaseSimulator, QueryOutcome};
use crate::error::Result;
use crate::event::{Event, SharedSink, fields};
use crate::ids::{CorrelationId, IdFormat, long_id};
use crate::rng::RandomSource;
use crate::spike::SpikeState;
use crate::weighted::WeightedChoice;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const REQUEST_RECEIVED: &str = "HTTP request received";
pub const RESPONSE_SENT: &str = "HTTP response sent";
pub const REQUEST_FAILED: &str = "HTTP request failed";
pub const EXCEPTION_CAUGHT: &str = "Exception handler caught error";
pub const SPIKE_DETECTED: &str = "Spike detected during request";

const SERVER_ERROR: u16 = 500;

/// Outcome of the status-code roll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: u16,
    /// The 500 was forced by an active spike
    pub spike_forced: bool,
}

impl Classification {
    pub fn is_server_error(&self) -> bool {
        self.status >= SERVER_ERROR
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub correlation_id: CorrelationId,
    pub endpoint: EndpointDescriptor,
    pub status: u16,
    pub spike_forced: bool,
    pub queries: Vec<QueryOutcome>,
    pub elapsed_ms: u64,
}

impl RequestOutcome {
    /// Number of events this request put into the sink
    pub fn event_count(&self) -> usize {
        2 + self.queries.len() + self.spike_forced as usize + (self.status >= SERVER_ERROR) as usize
    }
}

pub struct RequestSimulator {
    db: DatabaseSimulator,
    operations: WeightedChoice<DbOperation>,
    normal_statuses: WeightedChoice<u16>,
    spike_statuses: WeightedChoice<u16>,
    spike: Arc<SpikeState>,
    sink: SharedSink,
    db_ops: RangeInclusive<u64>,
    spike_server_error_probability: f64,
    id_format: IdFormat,
}

async fn pause<R: RandomSource>(rng: &mut R, low_ms: u64, high_ms: u64) {
    tokio::time::sleep(Duration::from_millis(rng.between(low_ms, high_ms))).await;
}

impl RequestSimulator {
    pub fn new(config: &SimulatorConfig, spike: Arc<SpikeState>, sink: SharedSink) -> Result<Self> {
        Ok(Self {
            db: DatabaseSimulator::new(sink.clone(), config.db_failure_probability)?,
            operations: WeightedChoice::new(DB_OPERATION_WEIGHTS)?,
            normal_statuses: WeightedChoice::new(NORMAL_STATUS_WEIGHTS)?,
            spike_statuses: WeightedChoice::new(SPIKE_STATUS_WEIGHTS)?,
            spike,
            sink,
            db_ops: config.db_ops_per_request.clone(),
            spike_server_error_probability: config.spike_server_error_probability,
            id_format: config.correlation_id_format,
        })
    }

    /// Roll the response status
    pub fn classify<R: RandomSource>(&self, spike_active: bool, rng: &mut R) -> Classification {
        if !spike_active {
            return Classification {
                status: *self.normal_statuses.pick(rng),
                spike_forced: false,
            };
        }
        if rng.chance(self.spike_server_error_probability) {
            return Classification {
                status: SERVER_ERROR,
                spike_forced: true,
            };
        }
        Classification {
            status: *self.spike_statuses.pick(rng),
            spike_forced: false,
        }
    }

    pub async fn simulate<R: RandomSource>(
        &self,
        endpoint: EndpointDescriptor,
        rng: &mut R,
    ) -> Result<RequestOutcome> {
        let started = Instant::now();
        let id = long_id(rng, self.id_format);
        let method = endpoint.method.as_str();

        pause(rng, 1, 15).await;
        self.sink.emit(
            Event::info(REQUEST_RECEIVED)
                .with(fields::CORRELATION_ID, id.as_str())
                .with(fields::METHOD, method)
                .with(fields::PATH, endpoint.path)
                .with("clientAddress", format!("192.168.1.{}", rng.below(255)))
                .with(
                    "userAgent",
                    rng.pick(&USER_AGENTS).copied().unwrap_or(USER_AGENTS[0]),
                ),
        )?;

        pause(rng, 5, 20).await;
        let count = rng.draw(&self.db_ops);
        let mut queries = Vec::with_capacity(count as usize);
        for i in 0..count {
            let operation = *self.operations.pick(rng);
            queries.push(self.db.execute(operation, &id, rng).await?);
            if i + 1 < count {
                pause(rng, 2, 8).await;
            }
        }

        pause(rng, 50, 300).await;

        let classification = self.classify(self.spike.is_active(), rng);
        if classification.spike_forced {
            let remaining = self
                .spike
                .remaining(Instant::now())
                .unwrap_or_default()
                .as_millis() as u64;
            self.sink.emit(
                Event::error(SPIKE_DETECTED)
                    .with(fields::CORRELATION_ID, id.as_str())
                    .with(fields::METHOD, method)
                    .with(fields::PATH, endpoint.path)
                    .with("spikeRemainingMs", remaining),
            )?;
        }

        if classification.is_server_error() {
            self.sink.emit(exception_event(&id, endpoint, rng))?;
        }

        pause(rng, 1, 5).await;
        if classification.is_server_error() {
            pause(rng, 2, 10).await;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let completion = if classification.is_server_error() {
            Event::error(REQUEST_FAILED).with(fields::ERROR, SERVER_ERROR_REASON)
        } else {
            // 4xx outcomes are ordinary responses, not failures
            Event::info(RESPONSE_SENT)
        };
        let completion = completion
            .with(fields::CORRELATION_ID, id.as_str())
            .with(fields::METHOD, method)
            .with(fields::PATH, endpoint.path)
            .with(fields::STATUS_CODE, classification.status)
            .with(fields::ELAPSED_TIME, elapsed_ms);
        self.sink.emit(completion)?;

        Ok(RequestOutcome {
            correlation_id: id,
            endpoint,
            status: classification.status,
            spike_forced: classification.spike_forced,
            queries,
            elapsed_ms,
        })
    }
}

/// Fabricated exception with a three-frame stack trace
fn exception_event<R: RandomSource>(
    id: &CorrelationId,
    endpoint: EndpointDescriptor,
    rng: &mut R,
) -> Event {
    let (name, message) = rng.pick(&EXCEPTIONS).copied().unwrap_or(EXCEPTIONS[0]);
    let file = rng.pick(&SOURCE_FILES).copied().unwrap_or(SOURCE_FILES[0]);
    let line = rng.between(1, 200);
    let column = rng.between(1, 50);
    let exception = format!("{}: {}", name, message);
    let stack_trace = format!(
        "{}\n    at {} {} ({}:{}:{})\n    at handle_request (src/app.rs:45:12)\n    at process_request (src/server.rs:123:8)",
        exception, endpoint.method, endpoint.path, file, line, column
    );

    Event::error(EXCEPTION_CAUGHT)
        .with(fields::CORRELATION_ID, id.as_str())
        .with(fields::METHOD, endpoint.method.as_str())
        .with(fields::PATH, endpoint.path)
        .with("exception", exception)
        .with("errorType", "internal_server_error")
        .with("stackTrace", stack_trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ENDPOINTS, HttpMethod};
    use crate::database::QUERY_EXECUTED;
    use crate::event::{MemorySink, Severity};
    use crate::rng::ScriptedSource;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const HEALTH: EndpointDescriptor = EndpointDescriptor::new(HttpMethod::Get, "/api/health");

    fn simulator(sink: Arc<MemorySink>) -> (RequestSimulator, Arc<SpikeState>) {
        let spike = Arc::new(SpikeState::new());
        let sim = RequestSimulator::new(&SimulatorConfig::default(), spike.clone(), sink).unwrap();
        (sim, spike)
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_health_check() {
        let sink = MemorySink::shared();
        let (sim, _) = simulator(sink.clone());
        // All-zero draws: one SELECT against users, no failure, status 200
        let mut rng = ScriptedSource::new();

        let outcome = sim.simulate(HEALTH, &mut rng).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.queries.len(), 1);
        assert_eq!(outcome.queries[0].operation, DbOperation::Select);

        let events = sink.events();
        let messages: Vec<_> = events.iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec![REQUEST_RECEIVED, QUERY_EXECUTED, RESPONSE_SENT]);
        assert_eq!(events[1].severity(), Severity::Debug);
        assert_eq!(events[1].field("table").and_then(|v| v.as_str()), Some("users"));
        assert_eq!(events[2].field(fields::STATUS_CODE), Some(&200.into()));
        assert_eq!(events[2].field(fields::PATH).and_then(|v| v.as_str()), Some("/api/health"));
        assert!(events.iter().all(|e| e.correlation_id() == Some(outcome.correlation_id.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_forced_server_error() {
        let sink = MemorySink::shared();
        let (sim, spike) = simulator(sink.clone());
        spike.begin(Instant::now() + Duration::from_secs(60));
        // Rolls at 0.8 pass, the 5% DB failure roll does not
        let mut rng = ScriptedSource::new().accept_chances_from(0.5);

        let outcome = sim.simulate(HEALTH, &mut rng).await.unwrap();
        assert_eq!(outcome.status, 500);
        assert!(outcome.spike_forced);

        let events = sink.events();
        let messages: Vec<_> = events.iter().map(|e| e.message()).collect();
        assert_eq!(
            messages,
            vec![REQUEST_RECEIVED, QUERY_EXECUTED, SPIKE_DETECTED, EXCEPTION_CAUGHT, REQUEST_FAILED]
        );
        let id = outcome.correlation_id.as_str();
        assert!(events.iter().all(|e| e.correlation_id() == Some(id)));

        let failed = &events[4];
        assert_eq!(failed.severity(), Severity::Error);
        assert_eq!(failed.field(fields::STATUS_CODE), Some(&500.into()));
        assert_eq!(
            failed.field(fields::ERROR).and_then(|v| v.as_str()),
            Some(SERVER_ERROR_REASON)
        );

        let trace = events[3].field("stackTrace").and_then(|v| v.as_str()).unwrap();
        assert!(trace.lines().count() >= 3);
        assert!(trace.contains("GET /api/health"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_without_forcing_uses_shifted_weights() {
        let sink = MemorySink::shared();
        let (sim, spike) = simulator(sink.clone());
        spike.begin(Instant::now() + Duration::from_secs(60));
        let mut rng = ScriptedSource::new();

        let classification = sim.classify(spike.is_active(), &mut rng);
        assert_eq!(classification, Classification { status: 200, spike_forced: false });

        // Draw 80 of 100 lands on 500 with spike weights, 400 with normal weights
        let mut rng = ScriptedSource::new().with_draws([80]);
        assert_eq!(sim.classify(true, &mut rng).status, 500);
        let mut rng = ScriptedSource::new().with_draws([80]);
        assert_eq!(sim.classify(false, &mut rng).status, 400);
    }

    #[test]
    fn test_classification_frequencies() {
        let sink = MemorySink::shared();
        let (sim, _) = simulator(sink);
        let mut rng = StdRng::seed_from_u64(77);
        let n = 20_000;

        let normal_500 = (0..n).filter(|_| sim.classify(false, &mut rng).status == 500).count();
        let spiking_500 = (0..n).filter(|_| sim.classify(true, &mut rng).status == 500).count();

        let normal_rate = normal_500 as f64 / n as f64;
        let spiking_rate = spiking_500 as f64 / n as f64;
        assert!((normal_rate - 0.06).abs() < 0.01, "normal 500 rate {}", normal_rate);
        // 0.8 forced + 0.2 * 0.2 from the shifted weights
        assert!((spiking_rate - 0.84).abs() < 0.02, "spike 500 rate {}", spiking_rate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_count_invariant() {
        let sink = MemorySink::shared();
        let (sim, spike) = simulator(sink.clone());
        let mut rng = StdRng::seed_from_u64(2024);

        for round in 0..400 {
            if round % 3 == 0 {
                spike.begin(Instant::now() + Duration::from_secs(3_600));
            } else {
                spike.finish();
            }
            let endpoint = *rng.pick(ENDPOINTS.as_slice()).unwrap();
            let outcome = sim.simulate(endpoint, &mut rng).await.unwrap();
            let events = sink.take();

            assert!((1..=4).contains(&outcome.queries.len()));
            assert_eq!(events.len(), outcome.event_count());

            let id = outcome.correlation_id.as_str();
            assert!(events.iter().all(|e| e.correlation_id() == Some(id)));

            let exceptions = events.iter().filter(|e| e.message() == EXCEPTION_CAUGHT).count();
            let spikes = events.iter().filter(|e| e.message() == SPIKE_DETECTED).count();
            assert_eq!(spikes, outcome.spike_forced as usize);

            let last = events.last().unwrap();
            if outcome.status >= 500 {
                assert_eq!(exceptions, 1);
                assert_eq!(last.message(), REQUEST_FAILED);
                let exception_pos = events.iter().position(|e| e.message() == EXCEPTION_CAUGHT);
                assert_eq!(exception_pos, Some(events.len() - 2));
            } else {
                assert_eq!(exceptions, 0);
                assert_eq!(last.message(), RESPONSE_SENT);
                assert_eq!(last.severity(), Severity::Info);
            }
            assert_eq!(events[0].message(), REQUEST_RECEIVED);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_a_normal_response() {
        let sink = MemorySink::shared();
        let (sim, _) = simulator(sink.clone());
        let mut rng = StdRng::seed_from_u64(99);
        let mut seen_4xx = false;
        for _ in 0..200 {
            let outcome = sim.simulate(HEALTH, &mut rng).await.unwrap();
            let events = sink.take();
            if (400..500).contains(&outcome.status) {
                seen_4xx = true;
                let last = events.last().unwrap();
                assert_eq!(last.message(), RESPONSE_SENT);
                assert!(last.field(fields::ERROR).is_none());
            }
        }
        assert!(seen_4xx);
    }
}
