//! JSON-lines framing

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

/// Maximum buffered message size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Incremental parser for newline-delimited JSON messages
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse one complete message from the buffer.
    ///
    /// Blank lines are skipped. `Ok(None)` means more data is needed.
    pub fn parse<T: DeserializeOwned>(&mut self) -> ProtocolResult<Option<T>> {
        loop {
            let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => return Ok(None),
            };

            let line = self.buffer.split_to(line_end + 1);
            let text = std::str::from_utf8(&line).map_err(|_| ProtocolError::InvalidUtf8)?;
            let text = text.trim();

            if text.is_empty() {
                trace!("Skipping blank line");
                continue;
            }

            return decode(text).map(Some);
        }
    }

    /// Bytes buffered but not yet parsed
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a single message
pub fn decode<T: DeserializeOwned>(text: &str) -> ProtocolResult<T> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a single message without framing
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// Encode a message as one newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> ProtocolResult<BytesMut> {
    let json = serde_json::to_vec(message)?;
    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ClientEvent, ServerEvent};
    use docsync_core::Content;

    #[test]
    fn test_parse_complete_lines() {
        let mut parser = Parser::new();
        parser
            .feed(
                b"{\"event\":\"create-document\",\"data\":\"a\"}\r\n\
                  {\"event\":\"delete-document\",\"data\":\"a\"}\n",
            )
            .unwrap();

        let first: ClientEvent = parser.parse().unwrap().unwrap();
        let second: ClientEvent = parser.parse().unwrap().unwrap();
        assert_eq!(first.name(), "create-document");
        assert_eq!(second.name(), "delete-document");
        assert!(parser.parse::<ClientEvent>().unwrap().is_none());
    }

    #[test]
    fn test_parse_split_across_reads() {
        let mut parser = Parser::new();
        parser.feed(b"{\"event\":\"join\",\"data\":{\"username\":").unwrap();
        assert!(parser.parse::<ClientEvent>().unwrap().is_none());

        parser.feed(b"\"ada\",\"documentId\":\"notes\"}}\n").unwrap();
        let event: ClientEvent = parser.parse().unwrap().unwrap();
        assert_eq!(event.name(), "join");
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut parser = Parser::new();
        parser.feed(b"\n\r\n{\"event\":\"create-document\",\"data\":\"a\"}\n").unwrap();
        assert!(parser.parse::<ClientEvent>().unwrap().is_some());
    }

    #[test]
    fn test_malformed_line_is_error() {
        let mut parser = Parser::new();
        parser.feed(b"PING\n").unwrap();
        assert!(matches!(
            parser.parse::<ClientEvent>(),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_oversized_feed_rejected() {
        let mut parser = Parser::new();
        let chunk = vec![b'x'; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            parser.feed(&chunk),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_line_is_parseable() {
        let line = encode_line(&ServerEvent::LoadDocument(Content::empty())).unwrap();
        assert!(line.ends_with(b"\n"));

        let mut parser = Parser::new();
        parser.feed(&line).unwrap();
        let event: ServerEvent = parser.parse().unwrap().unwrap();
        assert_eq!(event, ServerEvent::LoadDocument(Content::empty()));
    }
}
