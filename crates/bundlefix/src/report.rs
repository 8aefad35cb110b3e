//! Verification and reporting.
//!
//! After the rewriter runs, the working tree is re-scanned from disk and
//! the uniqueness invariant is checked against what was actually written,
//! not against the in-memory node list. The structured [`Report`] is what
//! callers (and the upload step downstream) consume.

use crate::bundle::{is_valid_identifier, scan_bundles, BundleKind, BundleNode};
use crate::registry::{AllocationSummary, ChangeReason};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Before/after record for one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Bundle root relative to the package root.
    pub path: String,
    pub kind: BundleKind,
    /// Identifier found in the input archive, if any.
    pub before: Option<String>,
    /// Identifier in the output archive.
    pub after: String,
    pub changed: bool,
    pub reason: ChangeReason,
}

/// Structured result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub main_identifier: String,
    pub collisions_found: usize,
    pub collisions_fixed: usize,
    pub missing_fixed: usize,
    pub unique_identifiers: usize,
    pub nodes: Vec<NodeReport>,
}

impl Report {
    /// Assemble a report from allocated nodes and the allocation totals.
    ///
    /// `reasons` must align index-for-index with `nodes`, as returned by
    /// [`crate::registry::allocate`].
    pub fn build(
        main_identifier: &str,
        nodes: &[BundleNode],
        reasons: &[ChangeReason],
        summary: &AllocationSummary,
    ) -> Self {
        let node_reports: Vec<NodeReport> = nodes
            .iter()
            .zip(reasons)
            .map(|(node, reason)| {
                let after = node
                    .assigned_identifier
                    .clone()
                    .unwrap_or_default();
                NodeReport {
                    path: node.path.display().to_string(),
                    kind: node.kind,
                    before: node.current_identifier.clone(),
                    changed: node.current_identifier.as_deref() != Some(after.as_str()),
                    after,
                    reason: *reason,
                }
            })
            .collect();

        let unique: HashSet<&str> = node_reports.iter().map(|n| n.after.as_str()).collect();

        Report {
            main_identifier: main_identifier.to_string(),
            collisions_found: summary.collisions_found,
            collisions_fixed: summary.collisions_fixed,
            missing_fixed: summary.missing_fixed,
            unique_identifiers: unique.len(),
            nodes: node_reports,
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Verification(format!("cannot write report: {}", e)))?;
        Ok(())
    }
}

/// Re-scan the working tree and assert the post-processing invariants.
///
/// - every scanned bundle carries an identifier;
/// - exactly one bundle holds the main identifier, and it is the main one;
/// - all other identifiers are pairwise distinct and charset-valid.
///
/// # Errors
///
/// Returns [`Error::Verification`] describing the first violated invariant.
/// A run that fails here is a failed run, even though files were rewritten.
pub fn verify_tree(
    package_root: &Path,
    app_root: &Path,
    main_identifier: &str,
    scope: Option<&Path>,
) -> Result<()> {
    let nodes = scan_bundles(package_root, app_root, scope)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut main_count = 0usize;

    for node in &nodes {
        let identifier = node.current_identifier.as_deref().ok_or_else(|| {
            Error::Verification(format!(
                "bundle {} has no identifier after processing",
                node.path.display()
            ))
        })?;

        if !is_valid_identifier(identifier) {
            return Err(Error::Verification(format!(
                "bundle {} has ill-formed identifier {:?}",
                node.path.display(),
                identifier
            )));
        }

        if identifier == main_identifier {
            main_count += 1;
            if node.kind != BundleKind::Main {
                return Err(Error::Verification(format!(
                    "main identifier {} claimed by non-main bundle {}",
                    main_identifier,
                    node.path.display()
                )));
            }
        }

        if !seen.insert(identifier.to_string()) {
            return Err(Error::Verification(format!(
                "duplicate identifier {} on bundle {}",
                identifier,
                node.path.display()
            )));
        }
    }

    if main_count != 1 {
        return Err(Error::Verification(format!(
            "expected exactly one occurrence of main identifier {}, found {}",
            main_identifier, main_count
        )));
    }

    Ok(())
}
