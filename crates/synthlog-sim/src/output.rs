//! Assembles the sink stack chosen on the command line.

use crate::cli::{OutputArgs, OutputKind};
use crate::forwarder::{Forwarder, ForwarderConfig, StatsSnapshot};
use crate::sinks::{LevelFilter, TracingSink};
use crate::transport::{LineFormat, LineTransport, LokiConfig, LokiTransport, Transport};
use std::sync::Arc;
use synthlog_core::SharedSink;
use tracing::info;

pub struct Output {
    sink: SharedSink,
    forwarder: Option<Arc<Forwarder>>,
}

impl Output {
    /// Build the sink stack. Must be called from within a tokio runtime.
    pub fn open(args: &OutputArgs) -> anyhow::Result<Self> {
        let transport: Box<dyn Transport> = match args.output {
            OutputKind::Tracing => {
                return Ok(Self {
                    sink: Arc::new(LevelFilter::new(args.log_level.into(), Arc::new(TracingSink))),
                    forwarder: None,
                });
            }
            OutputKind::StdoutJson => Box::new(LineTransport::stdout(LineFormat::Json)),
            OutputKind::Pretty => Box::new(LineTransport::stdout(LineFormat::Pretty)),
            OutputKind::Loki => Box::new(LokiTransport::new(LokiConfig {
                host: args.loki_host.clone(),
                username: args.loki_username.clone(),
                password: args.loki_password.clone(),
                source: args.source.clone(),
                environment: args.environment.clone(),
                ..Default::default()
            })?),
        };

        let forwarder = Arc::new(Forwarder::spawn(
            transport,
            ForwarderConfig {
                batch_size: args.batch_size,
                flush_interval_ms: args.flush_interval_ms,
                ..Default::default()
            },
        ));
        let sink: SharedSink = Arc::new(LevelFilter::new(args.log_level.into(), forwarder.clone()));
        Ok(Self {
            sink,
            forwarder: Some(forwarder),
        })
    }

    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    /// Flush and stop delivery. Returns the delivery counters, if any.
    pub async fn close(&self) -> Option<StatsSnapshot> {
        let forwarder = self.forwarder.as_ref()?;
        forwarder.close().await;
        let stats = forwarder.stats().snapshot();
        info!(
            sent = stats.sent,
            failed = stats.failed,
            dropped = stats.dropped,
            batches = stats.batches,
            "Output closed"
        );
        Some(stats)
    }
}
