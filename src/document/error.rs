//! Document error types
//!
//! Engine failures are translated here into a small closed set of kinds
//! that callers can branch on without knowing about the engine.

use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;

/// Coarse classification every [`DocumentError`] falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No live handle for the identity
    NotFound,
    /// The engine rejected the document bytes
    LoadFailure,
    /// The page could not be rasterized
    RenderFailure,
    /// The request itself is malformed
    InvalidArgument,
}

/// Registry and rasterizer error type
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Identity has no live handle (closed, never opened, or open failed)
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Engine rejected the bytes
    #[error("Failed to load document '{id}': {reason}")]
    LoadFailed { id: String, reason: String },

    /// Encrypted document opened without a password
    #[error("Document '{0}' is encrypted and requires a password")]
    PasswordRequired(String),

    /// Encrypted document opened with the wrong password
    #[error("Incorrect password for document '{0}'")]
    IncorrectPassword(String),

    /// Page index past the end of the document
    #[error("Page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },

    /// Engine returned no page handle
    #[error("Failed to load page {0}")]
    PageLoad(usize),

    /// Bitmap too large or refused by the engine
    #[error("Failed to allocate {width}x{height} bitmap")]
    BitmapAllocation { width: u32, height: u32 },

    /// Engine-internal rasterization failure
    #[error("Render error: {0}")]
    RenderError(String),

    /// Caller went away before the render finished
    #[error("Render cancelled")]
    Cancelled,

    /// Render exceeded its time budget
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::NotFound(_) => ErrorKind::NotFound,
            DocumentError::LoadFailed { .. }
            | DocumentError::PasswordRequired(_)
            | DocumentError::IncorrectPassword(_) => ErrorKind::LoadFailure,
            DocumentError::PageOutOfRange { .. }
            | DocumentError::PageLoad(_)
            | DocumentError::BitmapAllocation { .. }
            | DocumentError::RenderError(_)
            | DocumentError::Cancelled
            | DocumentError::Timeout(_) => ErrorKind::RenderFailure,
            DocumentError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Translate an engine failure raised while opening `id`
    pub fn load(id: &str, err: EngineError) -> Self {
        match err {
            EngineError::PasswordRequired => DocumentError::PasswordRequired(id.to_string()),
            EngineError::IncorrectPassword => DocumentError::IncorrectPassword(id.to_string()),
            other => DocumentError::LoadFailed {
                id: id.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Translate an engine failure raised while rendering or measuring
    pub fn render(err: EngineError) -> Self {
        match err {
            EngineError::PageLoad(index) => DocumentError::PageLoad(index),
            EngineError::BitmapAllocation { width, height } => {
                DocumentError::BitmapAllocation { width, height }
            }
            other => DocumentError::RenderError(other.to_string()),
        }
    }
}
