//! Command line surface of the `synthlog` binary.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use synthlog_core::{IdFormat, Severity, SimulatorConfig};

#[derive(Debug, Parser)]
#[command(name = "synthlog", version)]
#[command(about = "Synthetic API telemetry: request lifecycles, spikes and background noise")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate traffic until Ctrl-C or the end of --duration
    Run(RunArgs),
    /// Emit one info, warn and error sample to check the output
    Probe(OutputArgs),
    /// Print the endpoint, table and noise catalogs
    Catalog,
}

impl Command {
    /// Minimum event severity, for commands that emit events
    pub fn min_level(&self) -> Option<Severity> {
        match self {
            Command::Run(args) => Some(args.output.log_level.into()),
            Command::Probe(args) => Some(args.log_level.into()),
            Command::Catalog => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    /// One JSON object per line on stdout
    StdoutJson,
    /// Human-readable lines on stdout
    Pretty,
    /// Through the tracing subscriber on stderr
    Tracing,
    /// Push to a Loki endpoint
    Loki,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LevelArg> for Severity {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Debug => Severity::Debug,
            LevelArg::Info => Severity::Info,
            LevelArg::Warn => Severity::Warn,
            LevelArg::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Event destination
    #[arg(short, long, value_enum, default_value = "stdout-json")]
    pub output: OutputKind,

    /// Drop events below this severity
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value = "debug")]
    pub log_level: LevelArg,

    #[arg(long, env = "LOKI_HOST", default_value = "http://localhost:3100")]
    pub loki_host: String,

    #[arg(long, env = "LOKI_USERNAME")]
    pub loki_username: Option<String>,

    #[arg(long, env = "LOKI_PASSWORD", hide_env_values = true)]
    pub loki_password: Option<String>,

    /// `source` label on pushed streams
    #[arg(long, env = "LOG_SOURCE", default_value = "synthlog")]
    pub source: String,

    /// `environment` label on pushed streams
    #[arg(long, env = "LOG_ENV", default_value = "local")]
    pub environment: String,

    /// Records per delivered batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Deliver a partial batch after this long
    #[arg(long, default_value = "1000")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// Seed for a reproducible event stream
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after this long (e.g. 90s, 5m, 1h); runs until Ctrl-C otherwise
    #[arg(short, long)]
    pub duration: Option<String>,

    /// JSON file with simulator settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub db_failure_probability: Option<f64>,

    #[arg(long)]
    pub spike_probability: Option<f64>,

    #[arg(long)]
    pub spike_check_interval_ms: Option<u64>,

    #[arg(long)]
    pub spike_server_error_probability: Option<f64>,

    #[arg(long)]
    pub spike_pace_divisor: Option<u64>,

    #[arg(long)]
    pub noise_probability: Option<f64>,

    /// Use undashed correlation ids
    #[arg(long)]
    pub simple_ids: bool,
}

impl RunArgs {
    /// Settings file (or defaults) with command line overrides applied
    pub fn simulator_config(&self) -> anyhow::Result<SimulatorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => SimulatorConfig::default(),
        };

        if let Some(p) = self.db_failure_probability {
            config.db_failure_probability = p;
        }
        if let Some(p) = self.spike_probability {
            config.spike_probability = p;
        }
        if let Some(ms) = self.spike_check_interval_ms {
            config.spike_check_interval_ms = ms;
        }
        if let Some(p) = self.spike_server_error_probability {
            config.spike_server_error_probability = p;
        }
        if let Some(divisor) = self.spike_pace_divisor {
            config.spike_pace_divisor = divisor;
        }
        if let Some(p) = self.noise_probability {
            config.noise_probability = p;
        }
        if self.simple_ids {
            config.correlation_id_format = IdFormat::Simple;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn duration(&self) -> anyhow::Result<Option<Duration>> {
        self.duration.as_deref().map(parse_duration).transpose()
    }
}

/// `90`, `90s`, `5m`, `1h`
pub fn parse_duration(text: &str) -> anyhow::Result<Duration> {
    let text = text.trim();
    let (digits, unit) = match text.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => text.split_at(idx),
        None => (text, "s"),
    };
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration '{}'", text))?;
    let scale: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        other => bail!("unknown duration unit '{}' in '{}'", other, text),
    };
    match value.checked_mul(scale) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("duration '{}' is too large", text),
    }
}
