pub mod bundle;
pub mod error;
pub mod ipa;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod rewrite;

pub use bundle::{BundleKind, BundleNode};
pub use error::Error;
pub use ipa::{create_ipa, extract_ipa, list_entries, validate_ipa, CompressionLevel};
pub use registry::{IdentifierRegistry, RewriteMode};
pub use report::Report;
pub use resolver::CollisionResolver;

pub type Result<T> = std::result::Result<T, Error>;
