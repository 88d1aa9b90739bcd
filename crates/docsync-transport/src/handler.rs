//! Connection handler - decodes client events and hands them to the coordinator

use bytes::BytesMut;
use docsync_core::{ConnectionId, HubHandle, Notice, Outbox};
use docsync_protocol::{decode, encode, encode_line, ClientEvent, Parser, ServerEvent};
use tracing::{debug, trace};

use crate::error::TransportResult;

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;
#[cfg(feature = "metrics")]
use std::sync::Arc;

/// Handles a single client connection.
///
/// Opening a handler registers the connection with the coordinator;
/// dropping it reports the disconnect, which is an implicit leave.
pub struct ConnectionHandler {
    /// Unique client ID
    pub client_id: ConnectionId,
    hub: HubHandle,
    /// JSON-lines parser, used by stream transports
    parser: Parser,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl ConnectionHandler {
    /// Register a connection and return its handler with the outbox of
    /// notices addressed to it
    pub fn open(client_id: ConnectionId, hub: HubHandle) -> TransportResult<(Self, Outbox)> {
        let outbox = hub.connect(client_id.clone())?;
        let handler = Self {
            client_id,
            hub,
            parser: Parser::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        };
        Ok((handler, outbox))
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Feed raw stream bytes and submit every complete event.
    ///
    /// Returns the number of events submitted. A malformed line is an
    /// error and the caller closes the connection.
    pub fn process(&mut self, data: &[u8]) -> TransportResult<usize> {
        self.parser.feed(data)?;

        let mut submitted = 0;
        while let Some(event) = self.parser.parse::<ClientEvent>()? {
            self.submit(event)?;
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Submit one event carried in a single message frame
    pub fn process_frame(&mut self, text: &str) -> TransportResult<()> {
        let event: ClientEvent = decode(text)?;
        self.submit(event)
    }

    fn submit(&self, event: ClientEvent) -> TransportResult<()> {
        debug!(client = %self.client_id, event = event.name(), "Processing event");

        #[cfg(feature = "metrics")]
        if let Some(ref m) = self.metrics {
            m.record_event(event.name());
        }

        self.hub.submit(self.client_id.clone(), event.into())?;
        Ok(())
    }

    /// Encode a notice as one JSON line for stream transports
    pub fn encode_line(&self, notice: Notice) -> TransportResult<BytesMut> {
        let line = encode_line(&ServerEvent::from(notice))?;
        self.record_sent(line.len());
        Ok(line)
    }

    /// Encode a notice as a single text frame
    pub fn encode_frame(&self, notice: Notice) -> TransportResult<String> {
        let text = encode(&ServerEvent::from(notice))?;
        self.record_sent(text.len());
        Ok(text)
    }

    pub fn record_received(&self, _len: usize) {
        #[cfg(feature = "metrics")]
        if let Some(ref m) = self.metrics {
            m.record_bytes(_len as u64, 0);
        }
    }

    fn record_sent(&self, _len: usize) {
        #[cfg(feature = "metrics")]
        if let Some(ref m) = self.metrics {
            m.record_bytes(0, _len as u64);
        }
    }

    pub fn record_decode_error(&self, _transport: &str) {
        #[cfg(feature = "metrics")]
        if let Some(ref m) = self.metrics {
            m.record_decode_error(_transport);
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if self.hub.disconnect(self.client_id.clone()).is_err() {
            trace!(client = %self.client_id, "Coordinator gone, disconnect not reported");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use docsync_core::{Content, Coordinator, Hub};

    #[tokio::test]
    async fn test_process_submits_events() {
        let (hub, task) = Coordinator::spawn(Hub::new());
        let (mut handler, mut outbox) =
            ConnectionHandler::open(ConnectionId::from("t1"), hub.clone()).unwrap();

        let submitted = handler
            .process(
                b"{\"event\":\"join\",\"data\":\
                  {\"username\":\"ada\",\"documentId\":\"notes\"}}\n",
            )
            .unwrap();
        assert_eq!(submitted, 1);

        let notice = outbox.recv().await.unwrap();
        assert_eq!(notice, Notice::LoadDocument(Content::empty()));
        let line = handler.encode_line(notice).unwrap();
        assert_eq!(&line[..], b"{\"event\":\"load-document\",\"data\":\"\"}\n");

        drop(handler);
        drop(hub);
        let hub = task.await.unwrap();
        assert_eq!(hub.stats().participants, 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_error() {
        let (hub, _task) = Coordinator::spawn(Hub::new());
        let (mut handler, _outbox) =
            ConnectionHandler::open(ConnectionId::from("t1"), hub).unwrap();

        assert!(matches!(
            handler.process_frame("{\"event\":\"no-such-event\",\"data\":1}"),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(handler.process(b"not json\n"), Err(TransportError::Protocol(_))));
    }
}
