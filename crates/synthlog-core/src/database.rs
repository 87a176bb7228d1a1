//! Database Call Simulation
//!
//! One simulated query: pick a table, wait out its latency, roll a failure,
//! emit exactly one record describing what happened.

use crate::catalog::{DB_FAILURE_REASONS, DbOperation, QuerySpeed, TABLE_WEIGHTS, Table};
use crate::error::Result;
use crate::event::{Event, SharedSink, fields};
use crate::ids::CorrelationId;
use crate::rng::RandomSource;
use crate::weighted::WeightedChoice;
use std::time::Duration;
use tokio::time::Instant;

pub const QUERY_EXECUTED: &str = "Database query executed";
pub const QUERY_FAILED: &str = "Database query failed";

/// Fast tables answer in `[5, 50)` ms
pub const FAST_LATENCY_MS: (u64, u64) = (5, 50);
/// Slow tables answer in `[200, 2000]` ms
pub const SLOW_LATENCY_MS: (u64, u64) = (200, 2_000);

/// Result of one simulated query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    pub operation: DbOperation,
    pub table: Table,
    pub elapsed_ms: u64,
    pub failed: bool,
}

pub struct DatabaseSimulator {
    tables: WeightedChoice<Table>,
    failure_probability: f64,
    sink: SharedSink,
}

impl DatabaseSimulator {
    pub fn new(sink: SharedSink, failure_probability: f64) -> Result<Self> {
        Ok(Self {
            tables: WeightedChoice::new(TABLE_WEIGHTS)?,
            failure_probability,
            sink,
        })
    }

    /// Simulated latency for a query against `table`
    pub fn latency<R: RandomSource>(table: Table, rng: &mut R) -> Duration {
        let ms = match table.speed() {
            QuerySpeed::Fast => FAST_LATENCY_MS.0 + rng.below(FAST_LATENCY_MS.1 - FAST_LATENCY_MS.0),
            QuerySpeed::Slow => rng.between(SLOW_LATENCY_MS.0, SLOW_LATENCY_MS.1),
        };
        Duration::from_millis(ms)
    }

    pub async fn execute<R: RandomSource>(
        &self,
        operation: DbOperation,
        correlation_id: &CorrelationId,
        rng: &mut R,
    ) -> Result<QueryOutcome> {
        let started = Instant::now();
        let table = *self.tables.pick(rng);
        let latency = Self::latency(table, rng);

        tokio::time::sleep(latency).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let failed = rng.chance(self.failure_probability);
        let query = table.query(operation, rng);

        let event = if failed {
            let reason = rng.pick(&DB_FAILURE_REASONS).copied().unwrap_or("Unknown error");
            Event::error(QUERY_FAILED)
                .with(fields::CORRELATION_ID, correlation_id.as_str())
                .with("operation", operation.as_str())
                .with("table", table.name())
                .with("query", query)
                .with(fields::ERROR, reason)
                .with(fields::ELAPSED_TIME, elapsed_ms)
        } else {
            Event::debug(QUERY_EXECUTED)
                .with(fields::CORRELATION_ID, correlation_id.as_str())
                .with("operation", operation.as_str())
                .with("table", table.name())
                .with("query", query)
                .with(fields::ELAPSED_TIME, elapsed_ms)
                .with("rowsAffected", table.rows_affected(operation, rng))
        };
        self.sink.emit(event)?;

        Ok(QueryOutcome {
            operation,
            table,
            elapsed_ms,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MemorySink, Severity};
    use crate::ids::{IdFormat, long_id};
    use crate::rng::ScriptedSource;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_success_emits_one_debug_event() {
        let sink = MemorySink::shared();
        let db = DatabaseSimulator::new(sink.clone(), 0.05).unwrap();
        let mut rng = ScriptedSource::new();
        let id = long_id(&mut rng, IdFormat::Hyphenated);

        let outcome = db.execute(DbOperation::Select, &id, &mut rng).await.unwrap();

        assert_eq!(outcome.table, Table::Users);
        assert!(!outcome.failed);
        assert_eq!(outcome.elapsed_ms, FAST_LATENCY_MS.0);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.severity(), Severity::Debug);
        assert_eq!(event.message(), QUERY_EXECUTED);
        assert_eq!(event.correlation_id(), Some(id.as_str()));
        for key in ["operation", "table", "query", "elapsedTime", "rowsAffected"] {
            assert!(event.field(key).is_some(), "missing {}", key);
        }
        assert!(event.field(fields::ERROR).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_emits_one_error_event() {
        let sink = MemorySink::shared();
        let db = DatabaseSimulator::new(sink.clone(), 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let id = long_id(&mut rng, IdFormat::Simple);

        let outcome = db.execute(DbOperation::Delete, &id, &mut rng).await.unwrap();
        assert!(outcome.failed);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.severity(), Severity::Error);
        assert_eq!(event.message(), QUERY_FAILED);
        let reason = event.field(fields::ERROR).and_then(|v| v.as_str()).unwrap();
        assert!(DB_FAILURE_REASONS.contains(&reason));
        assert!(event.field("rowsAffected").is_none());
        assert_eq!(event.field("operation").and_then(|v| v.as_str()), Some("DELETE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_bounds_by_speed() {
        let sink = MemorySink::shared();
        let db = DatabaseSimulator::new(sink.clone(), 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let id = long_id(&mut rng, IdFormat::Simple);
        let mut saw_slow = false;

        for _ in 0..2_000 {
            let outcome = db.execute(DbOperation::Select, &id, &mut rng).await.unwrap();
            match outcome.table.speed() {
                QuerySpeed::Slow => {
                    saw_slow = true;
                    assert!(outcome.elapsed_ms >= SLOW_LATENCY_MS.0);
                    assert!(outcome.elapsed_ms <= SLOW_LATENCY_MS.1);
                }
                QuerySpeed::Fast => {
                    assert!(outcome.elapsed_ms >= FAST_LATENCY_MS.0);
                    assert!(outcome.elapsed_ms < FAST_LATENCY_MS.1);
                }
            }
        }
        assert!(saw_slow, "2% slow share should show up in 2000 calls");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rate_converges() {
        let sink = MemorySink::shared();
        let db = DatabaseSimulator::new(sink.clone(), 0.05).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);
        let id = long_id(&mut rng, IdFormat::Simple);
        let n = 10_000;

        let mut failures = 0;
        for _ in 0..n {
            if db.execute(DbOperation::Update, &id, &mut rng).await.unwrap().failed {
                failures += 1;
            }
        }

        let rate = failures as f64 / n as f64;
        // 5 standard deviations of p = 0.05 at n = 10k is ~0.011
        assert!((rate - 0.05).abs() < 0.011, "failure rate {}", rate);
        assert_eq!(sink.len(), n);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_is_a_fault() {
        let sink = Arc::new(MemorySink::new());
        sink.close();
        let db = DatabaseSimulator::new(sink, 0.0).unwrap();
        let mut rng = ScriptedSource::new();
        let id = long_id(&mut rng, IdFormat::Simple);

        assert!(db.execute(DbOperation::Insert, &id, &mut rng).await.is_err());
    }
}
