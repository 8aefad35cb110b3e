//! Bundle data model for IPA packages.
//!
//! An IPA payload is a tree of nested bundles: the main `.app`, embedded
//! `.framework` and `.appex` directories, resource `.bundle` directories,
//! and test `.xctest` bundles. Each carries an `Info.plist` declaring its
//! `CFBundleIdentifier`. This module defines the node type produced by the
//! [`scanner`] and the path-pattern classification and name sanitization
//! rules used when synthesizing replacement identifiers.

pub mod scanner;

pub use scanner::scan_bundles;

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Name of the identifier-bearing metadata file at a bundle root.
pub const METADATA_FILE: &str = "Info.plist";

/// Plist key holding a bundle's unique identifier.
pub const IDENTIFIER_KEY: &str = "CFBundleIdentifier";

/// Classification of a discovered bundle, inferred from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleKind {
    /// The top-level application bundle. Its identifier is never altered.
    Main,
    /// An embedded `.framework`.
    Framework,
    /// An app extension (`.appex`, or any bundle under `PlugIns/` or
    /// `Extensions/`).
    Extension,
    /// A resource `.bundle`.
    ResourceBundle,
    /// A test bundle (`.xctest`, or a `Tests`-suffixed name).
    TestBundle,
    /// Anything that matched no other pattern.
    Other,
}

impl BundleKind {
    /// Tag used in synthesized identifiers: `<main>.<tag>.<name>`.
    ///
    /// The main bundle never receives a synthesized identifier, so its tag
    /// is never emitted; `component` keeps the mapping total.
    pub fn tag(self) -> &'static str {
        match self {
            BundleKind::Main | BundleKind::Other => "component",
            BundleKind::Framework => "framework",
            BundleKind::Extension => "plugin",
            BundleKind::ResourceBundle => "bundle",
            BundleKind::TestBundle => "tests",
        }
    }
}

/// One discovered component of the package.
#[derive(Debug, Clone)]
pub struct BundleNode {
    /// Bundle root, relative to the package root.
    pub path: PathBuf,
    /// The bundle's metadata file, relative to the package root. Recorded
    /// even when the file does not exist; the rewriter reports it then.
    pub metadata_path: PathBuf,
    /// Path-pattern classification.
    pub kind: BundleKind,
    /// Identifier read from metadata, if the file exists, parses, and
    /// carries the field.
    pub current_identifier: Option<String>,
    /// Identifier decided by the allocator. `None` until allocation runs.
    pub assigned_identifier: Option<String>,
}

impl BundleNode {
    /// Path-derived name used when synthesizing an identifier, e.g.
    /// `Analytics` for `Frameworks/Analytics.framework`.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("component")
            .to_string()
    }
}

/// Returns true if a directory name looks like a nested bundle.
pub(crate) fn is_bundle_dir(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_ascii_lowercase().as_str(),
            "app" | "framework" | "appex" | "bundle" | "xctest"
        ),
        None => false,
    }
}

/// Classify a bundle by its path relative to the application root.
///
/// Classification is total: every path gets exactly one kind, with
/// [`BundleKind::Other`] as the fallback. Patterns are checked in a fixed
/// order so the result is deterministic.
pub fn classify(rel_path: &Path) -> BundleKind {
    let ext = rel_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let stem = rel_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

    if ext.as_deref() == Some("xctest") || stem.ends_with("Tests") {
        return BundleKind::TestBundle;
    }
    if ext.as_deref() == Some("framework") {
        return BundleKind::Framework;
    }
    if ext.as_deref() == Some("appex") {
        return BundleKind::Extension;
    }
    if ext.as_deref() == Some("bundle") {
        return BundleKind::ResourceBundle;
    }
    if under_extension_dir(rel_path) {
        return BundleKind::Extension;
    }
    BundleKind::Other
}

fn under_extension_dir(rel_path: &Path) -> bool {
    rel_path
        .parent()
        .map(|p| {
            p.components()
                .any(|c| matches!(c.as_os_str().to_str(), Some("PlugIns") | Some("Extensions")))
        })
        .unwrap_or(false)
}

/// Returns true if `identifier` is non-empty and uses only the characters
/// the distribution platform accepts: `[A-Za-z0-9._-]`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Sanitize a bundle name into an identifier fragment.
///
/// Lowercases ASCII letters, normalizes `_` and spaces to `-`, and strips
/// every other disallowed character. Falls back to `component` if nothing
/// survives.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'A'..='Z' => out.push(c.to_ascii_lowercase()),
            'a'..='z' | '0'..='9' | '.' | '-' => out.push(c),
            '_' | ' ' => out.push('-'),
            _ => {}
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "component".to_string()
    } else {
        trimmed.to_string()
    }
}
