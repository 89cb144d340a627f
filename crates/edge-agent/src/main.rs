//! Edge agent binary entry point.
//!
//! Usage: edge-agent [--collector-url <url>] [--base-dir <dir>] ...
//!
//! Samples telemetry every production interval and delivers it to the
//! collector. Records that cannot be delivered are buffered on disk and
//! replayed in order once the collector is reachable again.

mod app;
mod sampler;

use agent_config_and_utils::{init_logging, LogFormat, Paths};
use anyhow::Context;
use clap::Parser;
use relay_buffer::Relay;
use sampler::TelemetrySampler;
use std::path::PathBuf;
use tracing::info;

/// Edge agent: store-and-forward telemetry producer.
#[derive(Parser, Debug)]
#[command(name = "edge-agent")]
#[command(about = "Edge telemetry agent with store-and-forward delivery")]
struct Args {
    /// Base directory for config and buffer files (default ~/.edge-agent).
    #[arg(long, env = "EDGE_AGENT_HOME")]
    base_dir: Option<PathBuf>,

    /// Config file to load instead of <base-dir>/config.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent identifier stamped on every record.
    #[arg(long)]
    agent_id: Option<String>,

    /// Collector ingestion endpoint.
    #[arg(long)]
    collector_url: Option<String>,

    /// Directory holding the buffer files.
    #[arg(long)]
    buffer_dir: Option<PathBuf>,

    /// Production interval in milliseconds.
    #[arg(long)]
    produce_interval_ms: Option<u64>,

    /// Flush interval in milliseconds.
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Per-delivery timeout in milliseconds.
    #[arg(long)]
    delivery_timeout_ms: Option<u64>,

    /// Attempts per buffer append before a record is dropped.
    #[arg(long)]
    append_attempts: Option<u32>,

    /// Pause between buffer append attempts in milliseconds.
    #[arg(long)]
    append_backoff_ms: Option<u64>,

    /// What to do with unparseable backlog lines (skip, halt).
    #[arg(long)]
    malformed_lines: Option<String>,

    /// Report nominal sensor values instead of jittered ones.
    #[arg(long)]
    steady: bool,

    /// Write the effective configuration to <base-dir>/config.json and exit.
    #[arg(long)]
    write_config: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (compact, json).
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Flag values keyed like the environment overrides.
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "AGENT_ID" => self.agent_id.clone(),
            "COLLECTOR_URL" => self.collector_url.clone(),
            "BUFFER_DIR" => self.buffer_dir.as_ref().map(|p| p.display().to_string()),
            "PRODUCE_INTERVAL_MS" => self.produce_interval_ms.map(|v| v.to_string()),
            "FLUSH_INTERVAL_MS" => self.flush_interval_ms.map(|v| v.to_string()),
            "DELIVERY_TIMEOUT_MS" => self.delivery_timeout_ms.map(|v| v.to_string()),
            "APPEND_ATTEMPTS" => self.append_attempts.map(|v| v.to_string()),
            "APPEND_BACKOFF_MS" => self.append_backoff_ms.map(|v| v.to_string()),
            "MALFORMED_LINES" => self.malformed_lines.clone(),
            "LOG_LEVEL" => self.log_level.clone(),
            "LOG_FORMAT" => self.log_format.clone(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = match &args.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => Paths::new()?,
    };

    let mut config = app::load_config(&paths, args.config.as_deref())
        .context("failed to load configuration")?;
    config.apply_overrides(|key| args.lookup(key))?;
    config.validate().context("invalid configuration")?;

    if args.write_config {
        config.save(&paths)?;
        println!("Wrote {}", paths.config_file().display());
        return Ok(());
    }

    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    let relay_config = app::relay_config(&config, &paths);
    info!(
        agent_id = %config.agent_id,
        collector_url = %config.collector_url,
        buffer_dir = %relay_config.buffer_dir.display(),
        produce_interval_ms = config.produce_interval_ms,
        flush_interval_ms = config.flush_interval_ms,
        "Agent starting up"
    );

    let client = app::delivery_client(&config).context("failed to build delivery client")?;
    let sampler = if args.steady {
        TelemetrySampler::steady(config.agent_id.clone())
    } else {
        TelemetrySampler::new(config.agent_id.clone())
    };

    let handle = Relay::start(relay_config, client, sampler).context("failed to start relay")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal, stopping...");

    let producer = handle.producer_stats().snapshot();
    let flush = handle.flush_stats().snapshot();
    handle.shutdown().await?;

    info!(
        delivered = producer.delivered,
        buffered = producer.buffered,
        dropped = producer.dropped,
        replayed = flush.delivered,
        "Agent stopped"
    );
    Ok(())
}
