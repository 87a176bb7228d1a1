use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synthlog_core::traffic::{APPLICATION_STARTED, SHUTTING_DOWN};
use synthlog_core::{SharedSink, Severity, SimulatorConfig, TrafficGenerator};
use synthlog_sim::{Forwarder, ForwarderConfig, LevelFilter, Record, Transport, TransportError};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<Record>>>);

#[async_trait]
impl Transport for Collect {
    fn name(&self) -> &'static str {
        "collect"
    }

    async fn deliver(&mut self, batch: &[Record]) -> Result<(), TransportError> {
        self.0.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn generator_through_forwarder() {
    let collected = Collect::default();
    let forwarder = Arc::new(Forwarder::spawn(
        Box::new(collected.clone()),
        ForwarderConfig {
            batch_size: 25,
            flush_interval_ms: 250,
            channel_capacity: 4_096,
        },
    ));
    let sink: SharedSink = Arc::new(LevelFilter::new(Severity::Info, forwarder.clone()));

    let generator = TrafficGenerator::with_seed(SimulatorConfig::default(), sink, 11).unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(generator.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(90)).await;
    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();
    forwarder.close().await;

    let records = collected.0.lock().unwrap().clone();
    let stats = forwarder.stats().snapshot();
    assert_eq!(stats.sent as usize, records.len());
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.failed, 0);

    assert!(summary.requests > 0);
    assert_eq!(records.first().unwrap().event.message(), APPLICATION_STARTED);
    assert_eq!(records.last().unwrap().event.message(), SHUTTING_DOWN);
    assert!(records.iter().all(|r| r.event.severity() >= Severity::Info));
}

#[tokio::test(start_paused = true)]
async fn closed_forwarder_stops_generator() {
    let forwarder = Arc::new(Forwarder::spawn(
        Box::new(Collect::default()),
        ForwarderConfig::default(),
    ));
    let sink: SharedSink = forwarder.clone();
    let generator = TrafficGenerator::with_seed(SimulatorConfig::default(), sink, 3).unwrap();

    let handle = tokio::spawn(generator.run(CancellationToken::new()));
    tokio::time::sleep(Duration::from_secs(5)).await;
    forwarder.close().await;

    let result = handle.await.unwrap();
    assert!(result.is_err());
}
