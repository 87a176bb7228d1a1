//! synthlog - synthetic API telemetry
//!
//! Usage:
//!   synthlog run --duration 5m --seed 42
//!   synthlog run --output loki --loki-host http://localhost:3100
//!   synthlog probe --output loki
//!   synthlog catalog

use anyhow::{Context, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use synthlog_core::catalog::{ENDPOINTS, TABLE_WEIGHTS};
use synthlog_core::ids::{IdFormat, long_id};
use synthlog_core::noise::NoiseKind;
use synthlog_core::{Event, Severity, Sink, TrafficGenerator};
use synthlog_sim::Output;
use synthlog_sim::cli::{Cli, Command, OutputArgs, RunArgs};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.min_level());

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Probe(args) => probe(args).await,
        Command::Catalog => {
            print_catalog();
            Ok(())
        }
    }
}

/// Diagnostics go to stderr so stdout carries only the event stream
fn init_tracing(min_level: Option<Severity>) {
    let events = min_level.unwrap_or(Severity::Info);
    let default = format!("info,synthlog::events={}", events.as_str());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.simulator_config()?;
    let duration = args.duration()?;
    let output = Output::open(&args.output).context("opening output")?;

    info!(
        output = ?args.output.output,
        seed = ?args.seed,
        duration_s = ?duration.map(|d| d.as_secs()),
        "Starting synthlog"
    );

    let generator = match args.seed {
        Some(seed) => TrafficGenerator::with_seed(config, output.sink(), seed)?,
        None => TrafficGenerator::new(config, output.sink())?,
    };

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        match duration {
            Some(limit) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                    _ = tokio::time::sleep(limit) => info!("Duration reached"),
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for Ctrl-C");
                    return;
                }
                info!("Interrupted");
            }
        }
        stopper.cancel();
    });

    let result = generator.run(cancel).await;
    output.close().await;

    let summary = result.context("traffic generation stopped on a fault")?;
    info!(
        requests = summary.requests,
        server_errors = summary.server_errors,
        spike_forced = summary.spike_forced,
        db_calls = summary.db_calls,
        db_failures = summary.db_failures,
        noise_bursts = summary.noise_bursts,
        "Run complete"
    );
    Ok(())
}

async fn probe(args: OutputArgs) -> anyhow::Result<()> {
    let output = Output::open(&args).context("opening output")?;
    let sink = output.sink();
    let mut rng = StdRng::try_from_os_rng().context("seeding probe ids")?;

    let samples = [
        Event::info("Probe info event").with("probe", true),
        Event::warn("Probe warn event").with("probe", true),
        Event::error("Probe error event")
            .with("probe", true)
            .with("error", "Synthetic probe failure"),
    ];
    for sample in samples {
        let id = long_id(&mut rng, IdFormat::Hyphenated);
        sink.emit(sample.with("correlationId", id.as_str()))?;
    }

    if let Some(stats) = output.close().await
        && (stats.failed > 0 || stats.dropped > 0)
    {
        bail!(
            "probe not delivered: {} failed, {} dropped",
            stats.failed,
            stats.dropped
        );
    }
    info!(output = ?args.output, "Probe delivered");
    Ok(())
}

fn print_catalog() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                        Endpoints                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    for endpoint in ENDPOINTS.iter() {
        println!("║ {:60} ║", endpoint.to_string());
    }

    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                     Database tables                           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    let total: u32 = TABLE_WEIGHTS.iter().map(|(_, weight)| *weight).sum();
    for (table, weight) in TABLE_WEIGHTS {
        let share = weight as f64 * 100.0 / total as f64;
        println!(
            "║ {:20} {:>6.1}%  {:31} ║",
            table.name(),
            share,
            format!("{:?}", table.speed()).to_lowercase()
        );
    }

    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                      Noise events                             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    for kind in NoiseKind::ALL {
        println!("║ {:60} ║", kind.message());
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
}
