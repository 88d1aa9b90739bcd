//! docsync wire protocol
//!
//! Every message is a JSON object naming the event and carrying its payload.
//!
//! ## Message Format
//! ```text
//! {"event": "join", "data": {"username": "ada", "documentId": "notes"}}
//! {"event": "send-changes", "data": {"ops": [...], "data": {...}}}
//! {"event": "user-joined", "data": {"username": "ada", "users": [...]}}
//! ```
//!
//! Over TCP each message is one line. Over WebSocket each message is one
//! text frame.

pub mod error;
pub mod event;
pub mod parser;

pub use error::{ProtocolError, ProtocolResult};
pub use event::{
    ClientEvent, CursorMove, CursorUpdate, JoinRequest, RosterUpdate, SaveRequest, ServerEvent,
};
pub use parser::{decode, encode, encode_line, Parser};
