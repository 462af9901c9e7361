//! Zone tracker - vehicle zone-transition service
//!
//! Ingests vehicle location reports over HTTP, resolves which configured
//! zone each vehicle occupies and records entered/exited/moved transitions.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinate, Transition, VehicleRecord, errors)
//! - `services/` - Zone lookup, classification, state store, processor
//! - `io/` - HTTP API, audit channel and writer, Prometheus formatting
//! - `infra/` - Config, Metrics

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zone_tracker::infra::{Config, Metrics};
use zone_tracker::io::{create_audit_channel, start_http_server, AppState, AuditWriter};
use zone_tracker::services::{LocationEventProcessor, VehicleStateStore, ZoneSet};

/// Zone tracker - vehicle zone-transition service
#[derive(Parser, Debug)]
#[command(name = "zone-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(git_hash = %env!("BUILD_GIT_HASH"), "zone-tracker starting");

    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        zones_file = ?config.zones_file(),
        audit_enabled = %config.audit_enabled(),
        audit_file = %config.audit_file(),
        "config_loaded"
    );

    // Zone loading is fatal: the service is meaningless without zones
    let definitions = match config.zone_definitions() {
        Ok(definitions) => definitions,
        Err(e) => {
            error!(error = %format!("{e:#}"), "zones_load_failed");
            return Err(e.into());
        }
    };
    let zones = match ZoneSet::from_definitions(definitions) {
        Ok(zones) => Arc::new(zones),
        Err(e) => {
            error!(error = %e, "zones_invalid");
            return Err(e.into());
        }
    };
    info!(count = %zones.len(), zones = ?zones.names(), "zones_loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(VehicleStateStore::new());
    let mut processor = LocationEventProcessor::new(zones.clone(), store.clone(), metrics.clone());

    // Start audit writer (if enabled)
    let audit_handle = if config.audit_enabled() {
        let (audit_sender, audit_rx) =
            create_audit_channel(config.audit_channel_capacity(), config.site_id().to_string());
        processor = processor.with_audit(audit_sender);

        let writer = AuditWriter::new(config.audit_file(), metrics.clone());
        let audit_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            writer.run(audit_rx, audit_shutdown).await;
        }))
    } else {
        None
    };

    let processor = Arc::new(processor);

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let store_clone = store.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let summary = metrics_clone.report(store_clone.vehicle_count());
            summary.log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.port()).parse()?;
    let state = Arc::new(AppState::new(processor, zones, config.site_id()));

    // Run HTTP server until shutdown
    if let Err(e) = start_http_server(addr, state, shutdown_rx).await {
        error!(error = %e, addr = %addr, "http_server_error");
        let e: Box<dyn std::error::Error> = e;
        return Err(e);
    }

    if let Some(handle) = audit_handle {
        let _ = handle.await;
    }

    info!("zone-tracker shutdown complete");
    Ok(())
}
