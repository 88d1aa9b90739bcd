//! docsync Daemon (docsyncd)
//!
//! The server process for docsync collaborative documents.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (TCP on 4000, WebSocket on 4001)
//! docsyncd
//!
//! # Custom ports
//! docsyncd --tcp-port 7000 --ws-port 7001
//!
//! # With persistence, checkpointing every 10 seconds
//! docsyncd --db /var/lib/docsync/documents.db --checkpoint-secs 10
//!
//! # With Prometheus metrics
//! docsyncd --metrics-port 9100
//!
//! # With configuration file
//! docsyncd --config /etc/docsync/docsyncd.toml
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use docsync_core::{Coordinator, Hub, HubHandle};
use docsync_storage::{CheckpointWriter, MemoryStorage, SqliteStorage, Storage};
use docsync_transport::{Metrics, MetricsServer, TcpServer, WebSocketServer};

use config::{Args, FileConfig, Settings};

const METRICS_REFRESH: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&args, file)?;

    init_logging(&settings.log_level);

    // Print banner
    print_banner();

    let storage = open_storage(&settings);

    // Recover persisted documents before accepting connections
    let records = storage
        .load_all()
        .await
        .context("Failed to recover persisted documents")?;

    let (writer, writer_task) = CheckpointWriter::spawn(storage.clone());
    let mut hub = Hub::with_sink(Arc::new(writer));
    hub.restore(records);

    let (handle, coordinator_task) = Coordinator::spawn(hub);
    handle.spawn_checkpoint_timer(settings.checkpoint_interval);

    info!(
        tcp_port = settings.tcp_port,
        ws_port = settings.ws_port,
        bind = %settings.bind,
        checkpoint_secs = settings.checkpoint_interval.as_secs(),
        "Starting docsync daemon"
    );

    let metrics = match settings.metrics_addr() {
        Some(addr) => {
            let addr = addr?;
            let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
            let server = MetricsServer::new(metrics.clone(), addr);
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!(error = %e, "Metrics server error");
                }
            });
            tokio::spawn(refresh_metrics(handle.clone(), metrics.clone()));
            Some(metrics)
        }
        None => None,
    };

    // Start servers
    let mut handles = Vec::new();

    if settings.tcp {
        let mut tcp_server = TcpServer::new(handle.clone(), settings.tcp_addr()?);
        if let Some(ref m) = metrics {
            tcp_server = tcp_server.with_metrics(m.clone());
        }
        handles.push(tokio::spawn(async move {
            if let Err(e) = tcp_server.run().await {
                error!(error = %e, "TCP server error");
            }
        }));
    }

    if settings.websocket {
        let mut ws_server = WebSocketServer::new(handle.clone(), settings.ws_addr()?);
        if let Some(ref m) = metrics {
            ws_server = ws_server.with_metrics(m.clone());
        }
        handles.push(tokio::spawn(async move {
            if let Err(e) = ws_server.run().await {
                error!(error = %e, "WebSocket server error");
            }
        }));
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for server in &handles {
        server.abort();
    }

    // Final checkpoint happens when the coordinator stops
    handle.shutdown()?;
    drop(handle);
    let hub = coordinator_task.await?;
    let stats = hub.stats();
    info!(
        documents = stats.documents,
        checkpoints = stats.checkpoints_written,
        "Coordinator stopped"
    );

    // Dropping the hub releases the last writer handle
    drop(hub);
    let written = writer_task.await?;
    if written.failed > 0 {
        warn!(failed = written.failed, "Some checkpoints were not persisted");
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG, when set, refines the configured level per module
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn open_storage(settings: &Settings) -> Arc<dyn Storage> {
    if let Some(db_path) = &settings.db {
        info!(path = %db_path.display(), "Initializing SQLite persistence");
        match SqliteStorage::new(db_path) {
            Ok(storage) => {
                info!("SQLite persistence enabled");
                return Arc::new(storage);
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize SQLite, running in-memory only");
            }
        }
    } else {
        info!("Running in-memory only (no --db specified)");
    }
    Arc::new(MemoryStorage::new())
}

async fn refresh_metrics(handle: HubHandle, metrics: Arc<Metrics>) {
    let mut interval = tokio::time::interval(METRICS_REFRESH);
    loop {
        interval.tick().await;
        match handle.stats().await {
            Ok(stats) => metrics.observe_hub(&stats),
            Err(_) => break,
        }
    }
}

fn print_banner() {
    println!(
        r#"
  docsync
  Collaborative document sync server
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
