//! Error types for collision resolution.
//!
//! Each pipeline stage has a dedicated variant so callers can tell which
//! stage aborted the run. All public functions in this crate return
//! [`crate::Result<T>`], which uses this error type.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for collision resolution operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Property list parsing or serialization failed.
    #[error("Plist error: {0}")]
    Plist(#[from] plist::Error),

    /// ZIP archive operation failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The input archive is unreadable, not a valid container, or does not
    /// contain exactly one application root.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The main identifier is invalid, or the scan produced no nodes to
    /// allocate against.
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// A metadata file could not be rewritten.
    #[error("Rewrite failed for {path}: {reason}")]
    Rewrite {
        /// Metadata file that could not be updated.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// The output archive could not be written or reopened, or dropped files.
    #[error("Repackage failed: {0}")]
    Repackage(String),

    /// The processed tree still violates the uniqueness invariant.
    #[error("Verification failed: {0}")]
    Verification(String),
}
