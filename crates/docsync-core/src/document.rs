//! Document identifiers, content payloads and edit operations

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum document identifier length in bytes
pub const MAX_DOCUMENT_ID_LEN: usize = 512;

/// Document identifier - non-empty UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the length
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > MAX_DOCUMENT_ID_LEN {
            return Err(Error::InvalidDocumentId(format!(
                "Document ID exceeds {} bytes",
                MAX_DOCUMENT_ID_LEN
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque editor-state payload held for a document.
///
/// The core never looks inside it. An absent or freshly created document
/// has the empty string as its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Content(Value);

impl Content {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The content of a document that has never been written
    pub fn empty() -> Self {
        Self(Value::String(String::new()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.0, Value::String(s) if s.is_empty())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

}

impl Default for Content {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// An edit operation as produced by a participant's editor.
///
/// Relayed to other participants verbatim. When it carries a `data` field,
/// that field is the document content after the edit and becomes the
/// stored content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditOperation(Value);

impl EditOperation {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Content the document holds once this operation is applied
    pub fn resulting_content(&self) -> Option<Content> {
        self.0.get("data").cloned().map(Content)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for EditOperation {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_valid() {
        assert!(DocumentId::new("notes").is_ok());
        assert!(DocumentId::new("meeting notes / 2024").is_ok());
    }

    #[test]
    fn test_document_id_invalid() {
        assert!(DocumentId::new("").is_err());
        assert!(DocumentId::new("a".repeat(513)).is_err());
    }

    #[test]
    fn test_document_id_deserialize_validates() {
        let ok: std::result::Result<DocumentId, _> = serde_json::from_value(json!("notes"));
        assert_eq!(ok.unwrap().as_str(), "notes");

        let bad: std::result::Result<DocumentId, _> = serde_json::from_value(json!(""));
        assert!(bad.is_err());
    }

    #[test]
    fn test_empty_content() {
        assert!(Content::empty().is_empty());
        assert!(Content::default().is_empty());
        assert!(!Content::new(json!({"ops": []})).is_empty());
        assert_eq!(serde_json::to_value(Content::empty()).unwrap(), json!(""));
    }

    #[test]
    fn test_resulting_content() {
        let op = EditOperation::new(json!({
            "ops": [{"insert": "hi"}],
            "data": {"ops": [{"insert": "hi\n"}]}
        }));
        assert_eq!(
            op.resulting_content(),
            Some(Content::new(json!({"ops": [{"insert": "hi\n"}]})))
        );

        let bare = EditOperation::new(json!({"insert": "hi"}));
        assert_eq!(bare.resulting_content(), None);
    }
}
