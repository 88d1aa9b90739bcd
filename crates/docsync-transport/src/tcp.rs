//! TCP transport for docsync, one JSON object per line

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use docsync_core::{ConnectionId, HubHandle};

use crate::error::TransportResult;
use crate::handler::ConnectionHandler;

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;
#[cfg(feature = "metrics")]
use std::sync::Arc;

const TRANSPORT: &str = "tcp";

/// TCP Server for docsync
pub struct TcpServer {
    hub: HubHandle,
    addr: SocketAddr,
    client_counter: AtomicU64,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl TcpServer {
    pub fn new(hub: HubHandle, addr: SocketAddr) -> Self {
        Self {
            hub,
            addr,
            client_counter: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the TCP server
    pub async fn run(&self) -> TransportResult<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "docsync TCP server listening");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = ConnectionId::from(format!(
                        "tcp:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    ));
                    let hub = self.hub.clone();
                    #[cfg(feature = "metrics")]
                    let metrics = self.metrics.clone();

                    tokio::spawn(async move {
                        #[cfg(feature = "metrics")]
                        let result =
                            Self::handle_connection(stream, client_id.clone(), hub, metrics).await;
                        #[cfg(not(feature = "metrics"))]
                        let result = Self::handle_connection(stream, client_id.clone(), hub).await;

                        if let Err(e) = result {
                            error!(client = %client_id, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        client_id: ConnectionId,
        hub: HubHandle,
        #[cfg(feature = "metrics")] metrics: Option<Arc<Metrics>>,
    ) -> TransportResult<()> {
        info!(client = %client_id, "Client connected");

        #[cfg(feature = "metrics")]
        if let Some(ref m) = metrics {
            m.record_connection(TRANSPORT);
        }

        let (handler, mut outbox) = ConnectionHandler::open(client_id.clone(), hub)?;
        #[cfg(feature = "metrics")]
        let handler = handler.with_metrics(metrics.clone());
        let mut handler = handler;

        let result = Self::pump(&mut stream, &mut handler, &mut outbox).await;

        #[cfg(feature = "metrics")]
        if let Some(ref m) = metrics {
            m.record_disconnection(TRANSPORT);
        }

        // Dropping the handler reports the disconnect
        drop(handler);
        result
    }

    async fn pump(
        stream: &mut TcpStream,
        handler: &mut ConnectionHandler,
        outbox: &mut docsync_core::Outbox,
    ) -> TransportResult<()> {
        let client_id = handler.client_id.clone();
        let (mut reader, mut writer) = stream.split();
        let mut buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            info!(client = %client_id, "Client disconnected");
                            return Ok(());
                        }
                        Ok(n) => {
                            handler.record_received(n);
                            if let Err(e) = handler.process(&buf[..n]) {
                                warn!(
                                    client = %client_id,
                                    error = %e,
                                    "Malformed input, closing connection"
                                );
                                handler.record_decode_error(TRANSPORT);
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            error!(client = %client_id, error = %e, "Read error");
                            return Ok(());
                        }
                    }
                }

                notice = outbox.recv() => {
                    match notice {
                        Some(notice) => {
                            let line = handler.encode_line(notice)?;
                            writer.write_all(&line).await?;
                        }
                        // The coordinator has shut down
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::{Coordinator, Hub};
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::net::tcp::OwnedReadHalf;

    async fn next_event(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Value {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn connect(
        addr: SocketAddr,
    ) -> (Lines<BufReader<OwnedReadHalf>>, tokio::net::tcp::OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        (BufReader::new(read).lines(), write)
    }

    #[tokio::test]
    async fn test_tcp_relay_between_clients() {
        let (hub, _task) = Coordinator::spawn(Hub::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TcpServer::new(hub, addr);
        tokio::spawn(async move { server.serve(listener).await });

        let (mut a_lines, mut a_write) = connect(addr).await;
        a_write
            .write_all(
                b"{\"event\":\"join\",\"data\":\
                  {\"username\":\"A\",\"documentId\":\"notes\"}}\n",
            )
            .await
            .unwrap();
        assert_eq!(next_event(&mut a_lines).await, json!({"event": "load-document", "data": ""}));
        assert_eq!(next_event(&mut a_lines).await["event"], "user-joined");

        let (mut b_lines, mut b_write) = connect(addr).await;
        b_write
            .write_all(
                b"{\"event\":\"join\",\"data\":\
                  {\"username\":\"B\",\"documentId\":\"notes\"}}\n",
            )
            .await
            .unwrap();
        assert_eq!(next_event(&mut b_lines).await["event"], "load-document");
        assert_eq!(
            next_event(&mut b_lines).await["data"]["users"],
            json!([
                {"username": "A", "documentId": "notes"},
                {"username": "B", "documentId": "notes"}
            ])
        );
        assert_eq!(next_event(&mut a_lines).await["event"], "user-joined");

        a_write
            .write_all(b"{\"event\":\"send-changes\",\"data\":{\"insert\":\"hi\"}}\n")
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut b_lines).await,
            json!({"event": "receive-changes", "data": {"insert": "hi"}})
        );

        drop(b_write);
        drop(b_lines);
        assert_eq!(
            next_event(&mut a_lines).await,
            json!({
                "event": "user-left",
                "data": {"username": "B", "users": [{"username": "A", "documentId": "notes"}]}
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_line_closes_connection() {
        let (hub, _task) = Coordinator::spawn(Hub::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TcpServer::new(hub, addr);
        tokio::spawn(async move { server.serve(listener).await });

        let (mut lines, mut write) = connect(addr).await;
        write.write_all(b"PING\n").await.unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
