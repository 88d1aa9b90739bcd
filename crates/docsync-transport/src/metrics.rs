//! Prometheus metrics for docsync
//!
//! Exposed in Prometheus text format over a minimal HTTP endpoint.

use crate::error::TransportResult;
use docsync_core::HubStats;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};

/// docsync metrics collector
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // Connection metrics
    pub connections_total: IntCounterVec,
    pub connections_active: IntGaugeVec,

    // Event metrics
    pub events_total: IntCounterVec,
    pub decode_errors: IntCounterVec,

    // Hub metrics, refreshed from coordinator stats
    pub documents_total: IntGauge,
    pub participants_total: IntGauge,
    pub rooms_active: IntGauge,
    pub checkpoints_written: IntGauge,

    // Data metrics
    pub bytes_received: IntCounter,
    pub bytes_sent: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let connections_total = IntCounterVec::new(
            Opts::new("docsync_connections_total", "Total number of connections"),
            &["transport"],
        )?;
        let connections_active = IntGaugeVec::new(
            Opts::new("docsync_connections_active", "Number of active connections"),
            &["transport"],
        )?;

        let events_total = IntCounterVec::new(
            Opts::new("docsync_events_total", "Total client events accepted"),
            &["event"],
        )?;
        let decode_errors = IntCounterVec::new(
            Opts::new("docsync_decode_errors_total", "Malformed frames that closed a connection"),
            &["transport"],
        )?;

        let documents_total = IntGauge::new("docsync_documents_total", "Documents held in memory")?;
        let participants_total =
            IntGauge::new("docsync_participants_total", "Joined participants")?;
        let rooms_active = IntGauge::new("docsync_rooms_active", "Rooms with at least one member")?;
        let checkpoints_written = IntGauge::new(
            "docsync_checkpoints_written",
            "Checkpoints handed to durable storage since startup",
        )?;

        let bytes_received = IntCounter::new(
            "docsync_bytes_received_total",
            "Total bytes received from clients",
        )?;
        let bytes_sent =
            IntCounter::new("docsync_bytes_sent_total", "Total bytes sent to clients")?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(documents_total.clone()))?;
        registry.register(Box::new(participants_total.clone()))?;
        registry.register(Box::new(rooms_active.clone()))?;
        registry.register(Box::new(checkpoints_written.clone()))?;
        registry.register(Box::new(bytes_received.clone()))?;
        registry.register(Box::new(bytes_sent.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            events_total,
            decode_errors,
            documents_total,
            participants_total,
            rooms_active,
            checkpoints_written,
            bytes_received,
            bytes_sent,
        })
    }

    pub fn record_connection(&self, transport: &str) {
        self.connections_total.with_label_values(&[transport]).inc();
        self.connections_active.with_label_values(&[transport]).inc();
    }

    pub fn record_disconnection(&self, transport: &str) {
        self.connections_active.with_label_values(&[transport]).dec();
    }

    pub fn record_event(&self, event: &str) {
        self.events_total.with_label_values(&[event]).inc();
    }

    pub fn record_decode_error(&self, transport: &str) {
        self.decode_errors.with_label_values(&[transport]).inc();
    }

    pub fn record_bytes(&self, received: u64, sent: u64) {
        self.bytes_received.inc_by(received);
        self.bytes_sent.inc_by(sent);
    }

    /// Copy a coordinator stats snapshot into the gauges
    pub fn observe_hub(&self, stats: &HubStats) {
        self.documents_total.set(stats.documents as i64);
        self.participants_total.set(stats.participants as i64);
        self.rooms_active.set(stats.rooms as i64);
        self.checkpoints_written.set(stats.checkpoints_written as i64);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> TransportResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// HTTP server for the metrics endpoint
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    pub async fn run(&self) -> TransportResult<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Metrics server listening on http://{}/metrics", self.addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics = self.metrics.clone();

                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let n = match stream.read(&mut buf).await {
                            Ok(n) if n > 0 => n,
                            _ => return,
                        };
                        let request = String::from_utf8_lossy(&buf[..n]);
                        let response = respond(&metrics, &request);
                        let _ = stream.write_all(response.as_bytes()).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept metrics connection");
                }
            }
        }
    }
}

fn respond(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics") || request.starts_with("GET / ") {
        match metrics.export() {
            Ok(body) => format!(
                "HTTP/1.1 200 OK\r\n\
                 Content-Type: text/plain; version=0.0.4; charset=utf-8\r\n\
                 Content-Length: {}\r\n\
                 \r\n\
                 {}",
                body.len(),
                body
            ),
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string()
            }
        }
    } else if request.starts_with("GET /health") {
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK".to_string()
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
    }
}
