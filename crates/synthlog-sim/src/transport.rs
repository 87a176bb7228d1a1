//! Record Transports
//!
//! Where forwarded batches end up: a line-oriented writer (JSON or pretty
//! text) or a Loki push endpoint.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use synthlog_core::{Event, Severity};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_LOKI_HOST: &str = "http://localhost:3100";
pub const LOKI_PUSH_PATH: &str = "/loki/api/v1/push";

/// Event stamped with its emission time
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub event: Event,
}

impl Record {
    pub fn now(event: Event) -> Self {
        Self {
            time: Utc::now(),
            event,
        }
    }

    /// Single-line JSON body: `{"time","level","msg","payload"}`
    pub fn to_json_line(&self) -> String {
        json!({
            "time": self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            "level": self.event.severity(),
            "msg": self.event.message(),
            "payload": self.event.payload(),
        })
        .to_string()
    }

    pub fn to_pretty_line(&self) -> String {
        let fields: Vec<String> = self
            .event
            .payload()
            .iter()
            .map(|(key, value)| match value.as_str() {
                Some(text) => format!("{}={}", key, text),
                None => format!("{}={}", key, value),
            })
            .collect();
        format!(
            "{} {:>5} {} {}",
            self.time.format("%H:%M:%S%.3f"),
            self.event.severity().as_str().to_uppercase(),
            self.event.message(),
            fields.join(" ")
        )
        .trim_end()
        .to_string()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait Transport: Send {
    fn name(&self) -> &'static str;

    /// Deliver one batch. A failed batch is not retried.
    async fn deliver(&mut self, batch: &[Record]) -> Result<(), TransportError>;
}

// ============================================================================
// Line writer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    Json,
    Pretty,
}

pub struct LineTransport<W> {
    out: W,
    format: LineFormat,
}

impl LineTransport<std::io::Stdout> {
    pub fn stdout(format: LineFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }
}

impl<W: Write + Send> LineTransport<W> {
    pub fn new(out: W, format: LineFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> Transport for LineTransport<W> {
    fn name(&self) -> &'static str {
        match self.format {
            LineFormat::Json => "json-lines",
            LineFormat::Pretty => "pretty",
        }
    }

    async fn deliver(&mut self, batch: &[Record]) -> Result<(), TransportError> {
        for record in batch {
            let line = match self.format {
                LineFormat::Json => record.to_json_line(),
                LineFormat::Pretty => record.to_pretty_line(),
            };
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

// ============================================================================
// Loki
// ============================================================================

#[derive(Debug, Clone)]
pub struct LokiConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub source: String,
    pub environment: String,
    pub timeout_ms: u64,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LOKI_HOST.to_string(),
            username: None,
            password: None,
            source: "synthlog".to_string(),
            environment: "local".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LokiPush {
    pub streams: Vec<LokiStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LokiStream {
    pub stream: BTreeMap<String, String>,
    /// `[unix nanoseconds, line]` pairs
    pub values: Vec<[String; 2]>,
}

pub struct LokiTransport {
    client: reqwest::Client,
    url: String,
    config: LokiConfig,
}

impl LokiTransport {
    pub fn new(config: LokiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(4)
            .build()?;
        let url = format!("{}{}", config.host.trim_end_matches('/'), LOKI_PUSH_PATH);
        Ok(Self { client, url, config })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One stream per severity, records in emission order
    pub fn push_body(&self, batch: &[Record]) -> LokiPush {
        let mut by_level: BTreeMap<Severity, Vec<[String; 2]>> = BTreeMap::new();
        for record in batch {
            let nanos = record
                .time
                .timestamp_nanos_opt()
                .unwrap_or_else(|| record.time.timestamp_micros() * 1_000);
            by_level
                .entry(record.event.severity())
                .or_default()
                .push([nanos.to_string(), record.to_json_line()]);
        }

        let streams = by_level
            .into_iter()
            .map(|(level, values)| LokiStream {
                stream: BTreeMap::from([
                    ("source".to_string(), self.config.source.clone()),
                    ("environment".to_string(), self.config.environment.clone()),
                    ("level".to_string(), level.as_str().to_string()),
                ]),
                values,
            })
            .collect();
        LokiPush { streams }
    }
}

#[async_trait]
impl Transport for LokiTransport {
    fn name(&self) -> &'static str {
        "loki"
    }

    async fn deliver(&mut self, batch: &[Record]) -> Result<(), TransportError> {
        let body = self.push_body(batch);
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(records = batch.len(), streams = body.streams.len(), "Pushed to Loki");
        Ok(())
    }
}
