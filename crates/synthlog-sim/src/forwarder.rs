//! Event Forwarder
//!
//! Bridges the synchronous [`Sink`] contract to an async [`Transport`]:
//! `emit` stamps the event and `try_send`s it into a bounded channel, a
//! worker task batches records and delivers them on size or on a timer.
//! A full channel drops the record; a failed batch is counted and dropped.

use crate::transport::{Record, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use synthlog_core::{Event, Sink, SinkError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub channel_capacity: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 1_000,
            channel_capacity: 10_000,
        }
    }
}

#[derive(Debug, Default)]
pub struct ForwarderStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
    pub batches: AtomicU64,
}

impl ForwarderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
    pub batches: u64,
}

enum Command {
    Record(Record),
    Flush(oneshot::Sender<()>),
}

pub struct Forwarder {
    /// Taken on close so the worker drains the channel and stops
    tx: Mutex<Option<mpsc::Sender<Command>>>,
    stats: Arc<ForwarderStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Forwarder {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(transport: Box<dyn Transport>, config: ForwarderConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(ForwarderStats::default());
        let worker = tokio::spawn(Self::worker(rx, transport, config, stats.clone()));

        Self {
            tx: Mutex::new(Some(tx)),
            stats,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    fn sender(&self) -> Option<mpsc::Sender<Command>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Deliver everything queued so far
    pub async fn flush(&self) -> Result<(), SinkError> {
        let tx = self.sender().ok_or(SinkError::Closed)?;
        let (ack, done) = oneshot::channel();
        tx.send(Command::Flush(ack))
            .await
            .map_err(|_| SinkError::Closed)?;
        done.await.map_err(|_| SinkError::Closed)
    }

    /// Close the channel and wait for the worker to deliver what is left.
    /// Later emits fail with [`SinkError::Closed`].
    pub async fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if tx.is_none() {
            debug!("Forwarder already closed");
        }
        drop(tx);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "Forwarder worker did not finish cleanly");
        }
    }

    async fn worker(
        mut rx: mpsc::Receiver<Command>,
        mut transport: Box<dyn Transport>,
        config: ForwarderConfig,
        stats: Arc<ForwarderStats>,
    ) {
        let batch_size = config.batch_size.max(1);
        let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(transport = transport.name(), batch_size, "Forwarder started");

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Record(record)) => {
                        batch.push(record);
                        if batch.len() >= batch_size {
                            Self::flush_batch(transport.as_mut(), &mut batch, &stats).await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        Self::flush_batch(transport.as_mut(), &mut batch, &stats).await;
                        let _ = ack.send(());
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    Self::flush_batch(transport.as_mut(), &mut batch, &stats).await;
                }
            }
        }

        Self::flush_batch(transport.as_mut(), &mut batch, &stats).await;
        info!(transport = transport.name(), "Forwarder stopped");
    }

    async fn flush_batch(transport: &mut dyn Transport, batch: &mut Vec<Record>, stats: &ForwarderStats) {
        if batch.is_empty() {
            return;
        }

        let records = std::mem::take(batch);
        let count = records.len() as u64;
        match transport.deliver(&records).await {
            Ok(()) => {
                stats.sent.fetch_add(count, Ordering::Relaxed);
                stats.batches.fetch_add(1, Ordering::Relaxed);
                debug!(count, transport = transport.name(), "Batch delivered");
            }
            Err(e) => {
                stats.failed.fetch_add(count, Ordering::Relaxed);
                warn!(count, transport = transport.name(), error = %e, "Batch dropped");
            }
        }
    }
}

impl Sink for Forwarder {
    fn emit(&self, event: Event) -> Result<(), SinkError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(SinkError::Closed);
        };
        match tx.try_send(Command::Record(Record::now(event))) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            worker.abort();
        }
    }
}
