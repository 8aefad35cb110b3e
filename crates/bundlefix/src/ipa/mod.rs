//! IPA container handling.
//!
//! Extraction of IPA archives into a working directory and repackaging of
//! the (possibly mutated) working tree back into an archive. The pipeline
//! orchestration lives in [`crate::resolver`].

pub mod archive;
pub mod extract;

pub use archive::{create_ipa, list_entries, CompressionLevel};
pub use extract::{extract_ipa, validate_ipa};
