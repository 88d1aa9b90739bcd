//! In-memory document store
//!
//! Holds the single authoritative copy of every document's content.
//! Writes are whole-value, last-write-wins: there is no merge and no
//! version check. Ordering comes from the coordinator, not from here.

use crate::document::{Content, DocumentId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<DocumentId, Content>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty document if none exists. Returns true if created.
    pub fn ensure(&mut self, id: &DocumentId) -> bool {
        if self.documents.contains_key(id) {
            return false;
        }
        self.documents.insert(id.clone(), Content::empty());
        true
    }

    /// Current content, or empty content for unknown ids
    pub fn get(&self, id: &DocumentId) -> Content {
        self.documents.get(id).cloned().unwrap_or_default()
    }

    /// Replace the stored content
    pub fn set(&mut self, id: DocumentId, content: Content) {
        self.documents.insert(id, content);
    }

    /// Remove a document. Returns true if it existed.
    pub fn delete(&mut self, id: &DocumentId) -> bool {
        self.documents.remove(id).is_some()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Load previously persisted documents, returning how many were loaded
    pub fn restore(&mut self, records: impl IntoIterator<Item = (DocumentId, Content)>) -> usize {
        let mut count = 0;
        for (id, content) in records {
            self.documents.insert(id, content);
            count += 1;
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self.documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    #[test]
    fn test_get_unknown_is_empty() {
        let store = DocumentStore::new();
        assert!(store.get(&doc("missing")).is_empty());
        assert!(!store.contains(&doc("missing")));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut store = DocumentStore::new();
        let id = doc("notes");

        assert!(store.ensure(&id));
        store.set(id.clone(), Content::new(json!("kept")));
        assert!(!store.ensure(&id));
        assert_eq!(store.get(&id), Content::new(json!("kept")));
    }

    #[test]
    fn test_set_is_last_write_wins() {
        let mut store = DocumentStore::new();
        let id = doc("notes");

        store.set(id.clone(), Content::new(json!("first")));
        store.set(id.clone(), Content::new(json!("second")));
        assert_eq!(store.get(&id), Content::new(json!("second")));
    }

    #[test]
    fn test_delete_then_get_is_empty() {
        let mut store = DocumentStore::new();
        let id = doc("notes");

        store.set(id.clone(), Content::new(json!("text")));
        assert!(store.delete(&id));
        assert!(store.get(&id).is_empty());
        assert!(!store.delete(&id));
    }

    #[test]
    fn test_restore() {
        let mut store = DocumentStore::new();
        let loaded = store.restore(vec![
            (doc("a"), Content::new(json!("one"))),
            (doc("b"), Content::new(json!("two"))),
        ]);

        assert_eq!(loaded, 2);
        assert_eq!(store.ids(), vec![doc("a"), doc("b")]);
    }
}
