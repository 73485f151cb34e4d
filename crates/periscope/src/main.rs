//! # periscope
//!
//! Sidecar binary: loads settings, installs the Prometheus recorder, and runs
//! the reconnect supervisor, the snapshot upkeep task, and the `/metrics`
//! server until SIGINT or SIGTERM.

#![deny(unsafe_code)]

mod server;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use periscope_client::OpencodeClient;
use periscope_core::logging::{self, LogFormat};
use periscope_engine::{Engine, EngineConfig, PrometheusSink, spawn_supervisor};
use periscope_settings::{LogFormatSetting, PeriscopeSettings};
use tracing::info;

use crate::server::{ExporterState, spawn_upkeep_task, start_exporter};
use crate::shutdown::ShutdownSequence;

/// Report an OpenCode server's sessions, tokens, and errors as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "periscope", version, about)]
struct Cli {
    /// Settings file (defaults to `$PERISCOPE_CONFIG` or `~/.periscope/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the observed server.
    #[arg(long)]
    opencode_url: Option<String>,

    /// Bind address of the `/metrics` endpoint.
    #[arg(long)]
    metrics_addr: Option<String>,

    /// Snapshot export interval in milliseconds.
    #[arg(long)]
    export_interval_ms: Option<u64>,

    /// Re-poll interval in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Instance identifier attached to liveness and info series.
    #[arg(long)]
    instance: Option<String>,

    /// Debug logging, and surface swallowed poll failures.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Apply flags over file and env settings.
    fn apply(&self, settings: &mut PeriscopeSettings) {
        if let Some(url) = &self.opencode_url {
            settings.opencode_url = url.trim_end_matches('/').to_string();
        }
        if let Some(addr) = &self.metrics_addr {
            settings.metrics_addr.clone_from(addr);
        }
        if let Some(ms) = self.export_interval_ms {
            settings.export_interval_ms = ms;
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval_ms = ms;
        }
        if let Some(instance) = &self.instance {
            settings.instance.clone_from(instance);
        }
        if self.verbose {
            settings.verbose = true;
        }
        if self.json_logs {
            settings.logging.format = LogFormatSetting::Json;
        }
    }
}

fn log_format(setting: LogFormatSetting) -> LogFormat {
    match setting {
        LogFormatSetting::Compact => LogFormat::Compact,
        LogFormatSetting::Json => LogFormat::Json,
    }
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(periscope_settings::settings_path);
    let mut settings = periscope_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("invalid configuration")?;

    logging::init_subscriber(logging::level_for(settings.verbose), log_format(settings.logging.format));
    info!(
        opencode_url = %settings.opencode_url,
        metrics_addr = %settings.metrics_addr,
        instance = %settings.instance,
        poll_interval_ms = settings.poll_interval_ms,
        "starting periscope"
    );

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;
    let sink = Arc::new(PrometheusSink::new(handle));

    let client = OpencodeClient::new(&settings.opencode_url).context("failed to build HTTP client")?;
    let engine = Arc::new(Engine::new(client, sink.clone(), EngineConfig::from_settings(&settings)));

    let shutdown = ShutdownSequence::new();
    let supervisor = spawn_supervisor(Arc::clone(&engine), shutdown.worker_token());
    let upkeep = spawn_upkeep_task(
        Arc::clone(&engine),
        Arc::clone(&sink),
        Duration::from_millis(settings.export_interval_ms),
        shutdown.worker_token(),
    );
    let state = ExporterState {
        sink: Arc::clone(&sink),
        engine: Arc::clone(&engine),
    };
    let (addr, exporter) = start_exporter(&settings.metrics_addr, state, shutdown.exporter_token())
        .await
        .with_context(|| format!("failed to bind metrics endpoint {}", settings.metrics_addr))?;
    info!("metrics available at http://{addr}/metrics");

    wait_for_signal().await?;

    info!("shutting down");
    shutdown
        .run(
            vec![supervisor, upkeep],
            exporter,
            Duration::from_millis(settings.shutdown_timeout_ms),
            || {
                engine.emit_snapshots();
                sink.run_upkeep();
            },
        )
        .await;

    info!("shutdown complete");
    Ok(())
}
