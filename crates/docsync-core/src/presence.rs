//! Presence and cursor tracking
//!
//! Rosters are derived from room membership (join order) plus the session
//! registry. Cursor colors come from a fixed palette indexed by the
//! participant's current roster position, recomputed on every cursor
//! event. A participant's color therefore shifts when someone ahead of
//! them in the roster leaves.

use crate::document::DocumentId;
use crate::event::{Dispatch, Notice};
use crate::hub::Hub;
use crate::room::RoomManager;
use crate::session::{ConnectionId, SessionRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Cursor colors, assigned by roster position
pub const CURSOR_PALETTE: [&str; 5] = ["red", "blue", "green", "yellow", "purple"];

/// Selection in the editor: start offset and length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub index: u64,
    pub length: u64,
}

/// One roster line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub username: String,
    pub document_id: DocumentId,
}

/// Cursor position of one participant, with its display color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub username: String,
    /// `None` when the participant's editor has no selection
    pub range: Option<CursorRange>,
    pub color_index: usize,
}

impl CursorState {
    pub fn color(&self) -> &'static str {
        CURSOR_PALETTE[self.color_index % CURSOR_PALETTE.len()]
    }
}

/// Palette slot for a roster position
pub fn color_index(roster_position: usize) -> usize {
    roster_position % CURSOR_PALETTE.len()
}

/// Current roster of a document, in join order
pub fn roster(
    rooms: &RoomManager,
    sessions: &SessionRegistry,
    document_id: &DocumentId,
) -> Vec<RosterEntry> {
    rooms
        .members_of(document_id)
        .iter()
        .filter_map(|c| sessions.lookup(c))
        .map(|p| RosterEntry {
            username: p.username.clone(),
            document_id: p.document_id.clone(),
        })
        .collect()
}

impl Hub {
    /// Admit a connection into a document's room.
    ///
    /// The joiner gets the current snapshot, then every member (joiner
    /// included) gets the new roster. If the connection was in another
    /// room, that room's remaining members get `UserLeft` first.
    pub fn join(
        &mut self,
        connection_id: &ConnectionId,
        username: &str,
        document_id: DocumentId,
    ) -> Vec<Dispatch> {
        let mut out = Vec::new();

        if self.store.ensure(&document_id) {
            self.checkpointer.mark_dirty(&document_id);
        }

        self.sessions.register(connection_id.clone(), username, document_id.clone());
        if let Some(previous) = self.rooms.join(connection_id.clone(), document_id.clone()) {
            debug!(
                client = %connection_id,
                from = %previous,
                to = %document_id,
                "Participant switched documents"
            );
            out.extend(self.roster_change(&previous, username, false));
        }

        info!(client = %connection_id, username, doc_id = %document_id, "Participant joined");

        out.push(Dispatch::new(
            connection_id.clone(),
            Notice::LoadDocument(self.store.get(&document_id)),
        ));
        out.extend(self.roster_change(&document_id, username, true));
        out
    }

    /// Remove a connection entirely. Unknown connections are a no-op.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Vec<Dispatch> {
        self.rooms.leave(connection_id);

        match self.sessions.unregister(connection_id) {
            Some(participant) => {
                info!(
                    client = %connection_id,
                    username = %participant.username,
                    doc_id = %participant.document_id,
                    "Participant left"
                );
                self.roster_change(&participant.document_id, &participant.username, false)
            }
            None => Vec::new(),
        }
    }

    /// Relay a cursor move to the rest of the sender's room
    pub fn cursor_move(
        &mut self,
        connection_id: &ConnectionId,
        range: Option<CursorRange>,
    ) -> Vec<Dispatch> {
        let Some(participant) = self.sessions.lookup(connection_id) else {
            debug!(client = %connection_id, "Cursor move from unjoined connection dropped");
            return Vec::new();
        };
        let Some(position) = self.rooms.position_of(connection_id) else {
            return Vec::new();
        };

        let cursor = CursorState {
            username: participant.username.clone(),
            range,
            color_index: color_index(position),
        };
        let targets = self.rooms.broadcast_targets(&participant.document_id, connection_id);
        Dispatch::fan_out(targets, Notice::CursorMoved(cursor))
    }

    /// Roster broadcast to every current member of a room
    fn roster_change(
        &self,
        document_id: &DocumentId,
        username: &str,
        joined: bool,
    ) -> Vec<Dispatch> {
        let users = roster(&self.rooms, &self.sessions, document_id);
        let username = username.to_string();
        let notice = if joined {
            Notice::UserJoined { username, users }
        } else {
            Notice::UserLeft { username, users }
        };
        Dispatch::fan_out(self.rooms.members_of(document_id), notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn entry(username: &str, document_id: &str) -> RosterEntry {
        RosterEntry {
            username: username.into(),
            document_id: doc(document_id),
        }
    }

    fn cursor_color_for(hub: &mut Hub, from: &ConnectionId) -> &'static str {
        let range = Some(CursorRange { index: 0, length: 0 });
        match &hub.cursor_move(from, range)[0].notice {
            Notice::CursorMoved(cursor) => cursor.color(),
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(color_index(0), 0);
        assert_eq!(color_index(4), 4);
        assert_eq!(color_index(5), 0);
        assert_eq!(color_index(7), 2);
    }

    #[test]
    fn test_roster_in_join_order() {
        let mut rooms = RoomManager::new();
        let mut sessions = SessionRegistry::new();

        for (c, name) in [("c1", "alice"), ("c2", "bob")] {
            sessions.register(conn(c), name, doc("notes"));
            rooms.join(conn(c), doc("notes"));
        }
        sessions.register(conn("c3"), "carol", doc("todo"));
        rooms.join(conn("c3"), doc("todo"));

        assert_eq!(
            roster(&rooms, &sessions, &doc("notes")),
            vec![entry("alice", "notes"), entry("bob", "notes")]
        );
    }

    #[test]
    fn test_join_sends_snapshot_then_roster() {
        let mut hub = Hub::new();
        let out = hub.join(&conn("a"), "alice", doc("notes"));

        assert_eq!(
            out,
            vec![
                Dispatch::new(conn("a"), Notice::LoadDocument(crate::Content::empty())),
                Dispatch::new(
                    conn("a"),
                    Notice::UserJoined {
                        username: "alice".into(),
                        users: vec![entry("alice", "notes")],
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_switch_notifies_old_room() {
        let mut hub = Hub::new();
        hub.join(&conn("a"), "alice", doc("notes"));
        hub.join(&conn("b"), "bob", doc("notes"));

        let out = hub.join(&conn("a"), "alice", doc("todo"));

        assert_eq!(
            out[0],
            Dispatch::new(
                conn("b"),
                Notice::UserLeft {
                    username: "alice".into(),
                    users: vec![entry("bob", "notes")],
                }
            )
        );
        assert!(matches!(out[1].notice, Notice::LoadDocument(_)));
        assert_eq!(out[1].to, conn("a"));
    }

    #[test]
    fn test_cursor_not_sent_to_sender() {
        let mut hub = Hub::new();
        hub.join(&conn("a"), "alice", doc("notes"));
        hub.join(&conn("b"), "bob", doc("notes"));

        let out = hub.cursor_move(&conn("a"), Some(CursorRange { index: 3, length: 2 }));

        assert_eq!(
            out,
            vec![Dispatch::new(
                conn("b"),
                Notice::CursorMoved(CursorState {
                    username: "alice".into(),
                    range: Some(CursorRange { index: 3, length: 2 }),
                    color_index: 0,
                })
            )]
        );
    }

    #[test]
    fn test_color_shifts_when_roster_changes() {
        let mut hub = Hub::new();
        hub.join(&conn("a"), "alice", doc("notes"));
        hub.join(&conn("b"), "bob", doc("notes"));
        hub.join(&conn("c"), "carol", doc("notes"));

        assert_eq!(cursor_color_for(&mut hub, &conn("c")), "green");

        hub.disconnect(&conn("a"));
        assert_eq!(cursor_color_for(&mut hub, &conn("c")), "blue");
    }

    #[test]
    fn test_cursor_from_unjoined_is_dropped() {
        let mut hub = Hub::new();
        assert!(hub.cursor_move(&conn("ghost"), None).is_empty());
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let mut hub = Hub::new();
        assert!(hub.disconnect(&conn("ghost")).is_empty());
    }
}
