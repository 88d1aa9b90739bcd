//! WebSocket transport for docsync, one event per text frame

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

use docsync_core::{ConnectionId, HubHandle};

use crate::error::{TransportError, TransportResult};
use crate::handler::ConnectionHandler;

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;
#[cfg(feature = "metrics")]
use std::sync::Arc;

const TRANSPORT: &str = "websocket";

/// WebSocket Server for docsync
pub struct WebSocketServer {
    hub: HubHandle,
    addr: SocketAddr,
    client_counter: AtomicU64,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl WebSocketServer {
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

    /// Start the WebSocket server
    pub async fn run(&self) -> TransportResult<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "docsync WebSocket server listening");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = ConnectionId::from(format!(
                        "ws:{}:{}",
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
                            error!(client = %client_id, error = %e, "WebSocket connection error");
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
        stream: TcpStream,
        client_id: ConnectionId,
        hub: HubHandle,
        #[cfg(feature = "metrics")] metrics: Option<Arc<Metrics>>,
    ) -> TransportResult<()> {
        let ws_stream = accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        info!(client = %client_id, "WebSocket client connected");

        #[cfg(feature = "metrics")]
        if let Some(ref m) = metrics {
            m.record_connection(TRANSPORT);
        }

        let (handler, mut outbox) = ConnectionHandler::open(client_id.clone(), hub)?;
        #[cfg(feature = "metrics")]
        let handler = handler.with_metrics(metrics.clone());
        let mut handler = handler;

        let result = async {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                                Ok(text) => text,
                                Err(_) => {
                                    warn!(
                                        client = %client_id,
                                        "Binary frame is not UTF-8, closing connection"
                                    );
                                    handler.record_decode_error(TRANSPORT);
                                    break;
                                }
                            },
                            Some(Ok(Message::Ping(data))) => {
                                write.send(Message::Pong(data)).await?;
                                continue;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!(client = %client_id, "WebSocket client disconnected");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                error!(client = %client_id, error = %e, "WebSocket read error");
                                break;
                            }
                        };

                        handler.record_received(text.len());
                        if let Err(e) = handler.process_frame(&text) {
                            warn!(
                                client = %client_id,
                                error = %e,
                                "Malformed frame, closing connection"
                            );
                            handler.record_decode_error(TRANSPORT);
                            break;
                        }
                    }

                    notice = outbox.recv() => {
                        match notice {
                            Some(notice) => {
                                let text = handler.encode_frame(notice)?;
                                write.send(Message::Text(text)).await?;
                            }
                            None => break,
                        }
                    }
                }
            }
            Ok::<_, TransportError>(())
        }
        .await;

        #[cfg(feature = "metrics")]
        if let Some(ref m) = metrics {
            m.record_disconnection(TRANSPORT);
        }

        // Dropping the handler reports the disconnect
        drop(handler);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_core::{Coordinator, Hub};
    use serde_json::{json, Value};
    use tokio_tungstenite::connect_async;

    async fn next_event<S>(read: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            match read.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_join_and_relay() {
        let (hub, _task) = Coordinator::spawn(Hub::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = WebSocketServer::new(hub, addr);
        tokio::spawn(async move { server.serve(listener).await });

        let url = format!("ws://{}", addr);
        let (a, _) = connect_async(&url).await.unwrap();
        let (mut a_write, mut a_read) = a.split();
        let (b, _) = connect_async(&url).await.unwrap();
        let (mut b_write, mut b_read) = b.split();

        let join = |name: &str| {
            let data = json!({"username": name, "documentId": "notes"});
            Message::Text(json!({"event": "join", "data": data}).to_string())
        };

        a_write.send(join("A")).await.unwrap();
        assert_eq!(next_event(&mut a_read).await["event"], "load-document");
        assert_eq!(next_event(&mut a_read).await["event"], "user-joined");

        b_write.send(join("B")).await.unwrap();
        assert_eq!(next_event(&mut b_read).await["event"], "load-document");
        assert_eq!(next_event(&mut b_read).await["event"], "user-joined");
        assert_eq!(next_event(&mut a_read).await["event"], "user-joined");

        b_write
            .send(Message::Text(
                json!({
                    "event": "cursor-move",
                    "data": {"username": "B", "range": {"index": 3, "length": 0}}
                })
                .to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut a_read).await,
            json!({
                "event": "cursor-move",
                "data": {"username": "B", "range": {"index": 3, "length": 0}, "color": "blue"}
            })
        );
    }
}
