//! docsync Core - sessions, rooms, documents and the change relay
//!
//! This crate provides the synchronization core of docsync:
//! - Session registry and per-document rooms
//! - In-memory document store with last-write-wins semantics
//! - Change relay with a single relay order per document
//! - Presence rosters and cursor colors
//! - Checkpointing to durable storage
//! - The coordinator task that serializes every event

pub mod checkpoint;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod event;
pub mod hub;
pub mod presence;
mod relay;
pub mod room;
pub mod session;
pub mod store;

pub use checkpoint::{CheckpointSink, Checkpointer};
pub use coordinator::{Coordinator, HubHandle, Inbound, Outbox};
pub use document::{Content, DocumentId, EditOperation};
pub use error::{Error, Result};
pub use event::{Dispatch, Notice, Request};
pub use hub::{Hub, HubStats};
pub use presence::{CursorRange, CursorState, RosterEntry, CURSOR_PALETTE};
pub use room::{RoomManager, RoomState};
pub use session::{ConnectionId, Participant, SessionRegistry};
pub use store::DocumentStore;
