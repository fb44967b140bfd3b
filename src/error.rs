//! Error types for the PDF operator linter

use std::path::PathBuf;
use thiserror::Error;

use crate::pdf::store::IndirectReference;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF operator linter
///
/// Malformed or unknown content-stream operators are not errors; they are
/// reported as [`crate::grammar::IssueKind`] values.
#[derive(Error, Debug)]
pub enum Error {
    /// PDF container error reported by lopdf
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The cross-reference table has no entry for this reference
    #[error("Object not found: {0}")]
    ObjectNotFound(IndirectReference),

    /// A stream's filters could not be applied
    #[error("Could not decode stream: {message}")]
    Decode {
        reference: Option<IndirectReference>,
        message: String,
    },

    /// A reference chain revisits a reference already being resolved
    #[error("Cyclic reference at {0}")]
    CyclicReference(IndirectReference),

    /// A page tree node appears twice during traversal
    #[error("Cyclic page tree at {0}")]
    CyclicPageTree(IndirectReference),

    /// A dictionary key or array index is absent or addresses the wrong kind
    #[error("Path not found: {path} (at '{segment}')")]
    PathNotFound { path: String, segment: String },

    /// Requested page index is past the end of the document
    #[error("Page index {index} out of range (document has {count} pages)")]
    PageIndexOutOfRange { index: usize, count: usize },

    /// Required document structure is missing or has the wrong type
    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    /// Processing stopped by cancellation or deadline
    #[error("Cancelled before processing completed")]
    Cancelled,
}
