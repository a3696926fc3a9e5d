//! trackline - command-line host for the telemetry pipeline
//!
//! This tool provides commands for:
//! - Checking pipeline configuration and endpoint health
//! - Tracking a single event
//! - Piping a stream of events from stdin, draining on EOF or Ctrl-C
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/trackline/config.toml (~/.config/trackline/config.toml)
//! - Identity: $XDG_DATA_HOME/trackline/identity (~/.local/share/trackline/identity)
//! - Logs: $XDG_STATE_HOME/trackline/trackline.log (~/.local/state/trackline/trackline.log)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use trackline_core::pipeline::HEALTH_CHECK_TIMEOUT;
use trackline_core::transport::{HttpTransport, Transport};
use trackline_core::{Config, Payload, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "trackline")]
#[command(about = "Buffer and deliver telemetry events")]
#[command(version)]
struct Args {
    /// Verbose output (logs mirrored to stderr)
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/trackline/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tenant identifier (overrides config)
    #[arg(long)]
    tenant: Option<String>,

    /// Delivery endpoint base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show pipeline configuration and probe the endpoint
    Status,

    /// Track one event, then drain and exit
    Track {
        /// Event name
        event: String,

        /// Payload: a JSON object, or any text
        #[arg(long)]
        value: Option<String>,

        /// Group into the manual batch instead of the automatic path
        #[arg(long)]
        batched: bool,
    },

    /// Track events read from stdin (`name` or `name<TAB>value` per line)
    Pipe {
        /// Group into the manual batch instead of the automatic path
        #[arg(long)]
        batched: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    if let Some(tenant) = &args.tenant {
        config.pipeline.tenant = Some(tenant.clone());
    }
    if let Some(base_url) = &args.base_url {
        config.pipeline.base_url = Some(base_url.clone());
    }

    let _log_guard = if args.verbose || config.logging.verbose {
        config.logging.verbose = true;
        Some(
            trackline_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config.pipeline).await,
        Command::Track {
            event,
            value,
            batched,
        } => cmd_track(config.pipeline, &event, value.as_deref(), batched).await,
        Command::Pipe { batched } => cmd_pipe(config.pipeline, batched).await,
    }
}

async fn cmd_status(config: &PipelineConfig) -> Result<()> {
    println!("Trackline Pipeline Configuration");
    println!("================================");
    println!();
    println!(
        "Tenant:          {}",
        config.tenant.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Base URL:        {}",
        config.base_url.as_deref().unwrap_or("<not set>")
    );
    println!("Platform:        {}", config.platform);
    println!("App Version:     {}", config.app_version);
    println!("Auto Batching:   {}", config.auto_batching);
    println!("Flush Interval:  {}s", config.flush_interval_secs);
    println!("Timeout:         {}s", config.request_timeout_secs);
    println!(
        "API Key:         {}",
        if config.api_key.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );

    println!();
    if let Err(e) = config.validate() {
        println!("Status: Not ready ({})", e);
        return Ok(());
    }

    let transport = HttpTransport::new(config).context("failed to create transport")?;
    let alive = transport
        .health_check(HEALTH_CHECK_TIMEOUT)
        .await
        .unwrap_or(false);
    if alive {
        println!("Status: Ready (endpoint alive)");
    } else {
        println!("Status: Endpoint unreachable (events would be queued or dropped)");
    }

    Ok(())
}

async fn cmd_track(
    config: PipelineConfig,
    event: &str,
    value: Option<&str>,
    batched: bool,
) -> Result<()> {
    let pipeline = start_pipeline(config).await?;

    let payload = parse_payload(value);
    if batched {
        pipeline.track_batched(event, payload);
    } else {
        pipeline.track(event, payload);
    }

    pipeline.shutdown().await;
    print_summary(&pipeline);
    Ok(())
}

async fn cmd_pipe(config: PipelineConfig, batched: bool) -> Result<()> {
    let pipeline = start_pipeline(config).await?;

    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    ctrlc::set_handler(move || notify.notify_one())
        .context("failed to install Ctrl-C handler")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let Some((event, value)) = parse_line(&line) else {
                    continue;
                };
                if batched {
                    pipeline.track_batched(event, parse_payload(value));
                } else {
                    pipeline.track(event, parse_payload(value));
                }
            }
            _ = interrupted.notified() => {
                tracing::info!("Interrupted; draining pipeline");
                break;
            }
        }
    }

    pipeline.shutdown().await;
    print_summary(&pipeline);
    Ok(())
}

/// Initialize a pipeline and give the health probe a chance to resolve, so
/// the dispatch decisions below see a settled endpoint state.
async fn start_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let pipeline = Pipeline::new();
    pipeline
        .initialize(config)
        .context("failed to initialize pipeline")?;

    let wait = HEALTH_CHECK_TIMEOUT + Duration::from_millis(100);
    if tokio::time::timeout(wait, pipeline.health_resolved()).await.is_err() {
        tracing::warn!("Health probe did not resolve in time");
    }
    tracing::debug!(health = %pipeline.health(), "Pipeline ready");

    Ok(pipeline)
}

/// Split a `name<TAB>value` line. Blank lines yield `None`.
fn parse_line(line: &str) -> Option<(&str, Option<&str>)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (event, value) = match line.split_once('\t') {
        Some((event, value)) => (event.trim(), Some(value)),
        None => (line.trim(), None),
    };
    if event.is_empty() {
        None
    } else {
        Some((event, value))
    }
}

/// JSON objects become structured payloads; anything else is text.
fn parse_payload(value: Option<&str>) -> Payload {
    match value {
        None => Payload::None,
        Some(text) => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(fields)) => Payload::Fields(fields),
            _ => Payload::Text(text.to_string()),
        },
    }
}

fn print_summary(pipeline: &Pipeline) {
    let stats = pipeline.stats();
    println!("Health:          {}", pipeline.health());
    println!("Tracked:         {}", stats.tracked);
    println!("Sent:            {}", stats.events_sent);
    println!("Dropped:         {}", stats.dropped);
    println!("Send Failures:   {}", stats.send_failures);
}
