//! Bundle graph scanner.
//!
//! Walks an extracted application tree and produces the ordered node list
//! consumed by the allocator: main bundle first, then nested bundles in
//! breadth-first directory order. Directory entries are sorted by name at
//! each level so discovery order is deterministic regardless of filesystem
//! iteration order, which matters because allocation outcomes depend on
//! processing order when disambiguating name clashes.

use crate::bundle::{classify, is_bundle_dir, BundleKind, BundleNode, IDENTIFIER_KEY, METADATA_FILE};
use crate::Result;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scan the application tree rooted at `app_root` and return its bundles.
///
/// Paths in the returned nodes are relative to `package_root` (the
/// extraction directory). The main bundle is always the first node. When
/// `scope` is given, only nested bundles under `app_root/scope` are
/// recorded; the main bundle is always included.
///
/// A missing metadata file, or one without an identifier field, is not an
/// error here: the node is recorded with `current_identifier = None` and
/// the allocator synthesizes a replacement. Malformed metadata also scans
/// as `None` and is reported by the rewriter when it tries to update it.
pub fn scan_bundles(
    package_root: &Path,
    app_root: &Path,
    scope: Option<&Path>,
) -> Result<Vec<BundleNode>> {
    let mut nodes = vec![read_node(package_root, app_root, BundleKind::Main)?];

    let scope_root = scope.map(|s| app_root.join(s));

    let mut queue = VecDeque::new();
    queue.push_back(app_root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let mut children: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            // file_type() does not follow symlinks, so symlinked directories
            // are not traversed; they travel through the pipeline as links.
            if entry.file_type()?.is_dir() {
                children.push(entry.path());
            }
        }
        children.sort();

        for child in children {
            if child.file_name().map(|n| n == "_CodeSignature").unwrap_or(false) {
                continue;
            }
            if is_bundle_dir(&child) {
                let in_scope = match &scope_root {
                    Some(root) => child.starts_with(root),
                    None => true,
                };
                if in_scope {
                    let rel = child.strip_prefix(app_root).unwrap_or(&child);
                    let kind = classify(rel);
                    let node = read_node(package_root, &child, kind)?;
                    debug!(path = %node.path.display(), ?kind, "discovered bundle");
                    nodes.push(node);
                }
            }
            queue.push_back(child);
        }
    }

    Ok(nodes)
}

/// Build a node for the bundle rooted at `bundle_root`, reading its
/// identifier from metadata if possible.
fn read_node(package_root: &Path, bundle_root: &Path, kind: BundleKind) -> Result<BundleNode> {
    let metadata_abs = bundle_root.join(METADATA_FILE);
    let current_identifier = read_identifier(&metadata_abs);

    let rel = |p: &Path| -> PathBuf {
        p.strip_prefix(package_root).unwrap_or(p).to_path_buf()
    };

    Ok(BundleNode {
        path: rel(bundle_root),
        metadata_path: rel(&metadata_abs),
        kind,
        current_identifier,
        assigned_identifier: None,
    })
}

/// Read the identifier field from a metadata file.
///
/// Returns `None` if the file is missing, unparseable, or lacks the field;
/// those conditions surface later as rewrite failures or synthesized
/// identifiers, never as scan failures.
fn read_identifier(metadata_path: &Path) -> Option<String> {
    let data = fs::read(metadata_path).ok()?;
    let value: plist::Value = plist::from_bytes(&data).ok()?;
    value
        .as_dictionary()
        .and_then(|d| d.get(IDENTIFIER_KEY))
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
