//! Error types for docsync core

use thiserror::Error;

/// Core error types
///
/// Unknown documents and unknown connections are not errors: the hub
/// resolves them as empty content or no-ops. What is left are boundary
/// failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Coordinator is no longer running")]
    CoordinatorClosed,
}

/// Result type alias for docsync core operations
pub type Result<T> = std::result::Result<T, Error>;
