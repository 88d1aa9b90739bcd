//! Change relay
//!
//! An edit from a joined participant is applied to the store, then sent to
//! every other member of the sender's room. Because the coordinator feeds
//! the hub one event at a time, the order edits mutate the store is the
//! order members receive them. Overlapping concurrent edits are not
//! reconciled here; clients apply the relayed sequence locally.

use crate::document::EditOperation;
use crate::event::{Dispatch, Notice};
use crate::hub::Hub;
use crate::session::ConnectionId;
use tracing::debug;

impl Hub {
    /// Relay an edit operation from `connection_id` to the rest of its room
    pub fn send_changes(
        &mut self,
        connection_id: &ConnectionId,
        op: EditOperation,
    ) -> Vec<Dispatch> {
        let Some(participant) = self.sessions.lookup(connection_id) else {
            debug!(client = %connection_id, "Edit from unjoined connection dropped");
            return Vec::new();
        };
        let document_id = participant.document_id.clone();

        match op.resulting_content() {
            Some(content) => {
                self.store.set(document_id.clone(), content);
                self.checkpointer.mark_dirty(&document_id);
            }
            None => {
                debug!(
                    client = %connection_id,
                    doc_id = %document_id,
                    "Edit carries no content, store unchanged"
                );
            }
        }

        let targets = self.rooms.broadcast_targets(&document_id, connection_id);
        debug!(
            client = %connection_id,
            doc_id = %document_id,
            targets = targets.len(),
            "Relaying edit"
        );
        Dispatch::fan_out(targets, Notice::ReceiveChanges(op))
    }
}
