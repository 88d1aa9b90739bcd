//! docsync Transport Layer
//!
//! Carries client events to the coordinator and notices back:
//! - TCP: One JSON object per line
//! - WebSocket: One JSON object per text frame
//! - Metrics: Prometheus metrics (optional feature)

pub mod error;
pub mod handler;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tcp;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{TransportError, TransportResult};
pub use handler::ConnectionHandler;
#[cfg(feature = "metrics")]
pub use metrics::{Metrics, MetricsServer};
pub use tcp::TcpServer;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketServer;
