//! Collision resolution pipeline.
//!
//! Ties the stages together: extract, scan, allocate, rewrite, verify,
//! repackage. Verification runs against the working tree before the output
//! archive is written, so a failed run never leaves a "fixed" artifact at
//! the destination. The working directory is a scoped temporary directory
//! removed on every exit path when it drops.

use crate::bundle::scan_bundles;
use crate::ipa::{create_ipa, extract_ipa, list_entries, validate_ipa, CompressionLevel};
use crate::registry::{allocate, RewriteMode};
use crate::report::{verify_tree, Report};
use crate::{rewrite, Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Identifier collision resolution engine with a builder-style API.
///
/// # Example
///
/// ```no_run
/// use bundlefix::CollisionResolver;
///
/// let report = CollisionResolver::new("com.example.app")
///     .compression_level(6)
///     .resolve("input.ipa", "fixed.ipa")?;
/// println!("fixed {} collisions", report.collisions_fixed);
/// # Ok::<(), bundlefix::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    main_identifier: String,
    compression_level: CompressionLevel,
    rewrite_mode: RewriteMode,
    scope: Option<PathBuf>,
}

impl CollisionResolver {
    /// Create a resolver that protects `main_identifier`.
    pub fn new(main_identifier: impl Into<String>) -> Self {
        Self {
            main_identifier: main_identifier.into(),
            compression_level: CompressionLevel::DEFAULT,
            rewrite_mode: RewriteMode::OnCollision,
            scope: None,
        }
    }

    /// Set ZIP compression level for the output archive (0-9, default 6).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = CompressionLevel::new(level);
        self
    }

    /// Choose between rewriting only colliding identifiers (default) and
    /// rewriting every non-main identifier.
    pub fn rewrite_mode(mut self, mode: RewriteMode) -> Self {
        self.rewrite_mode = mode;
        self
    }

    /// Restrict scanning to a subtree of the application bundle, e.g.
    /// `PlugIns`. The main bundle is always in scope.
    pub fn scope(mut self, subtree: impl AsRef<Path>) -> Self {
        self.scope = Some(subtree.as_ref().to_path_buf());
        self
    }

    /// Run the pipeline: extract `input`, resolve collisions, and write the
    /// verified result to `output`.
    ///
    /// The input archive is never modified. `output` is only written after
    /// the working tree passes verification; afterwards the output archive
    /// is reopened and its entry set compared against the input's.
    pub fn resolve(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Report> {
        let input = input.as_ref();
        let output = output.as_ref();

        validate_ipa(input)?;

        // Unique per run, removed on drop whichever way this returns.
        let work_dir = TempDir::with_prefix("bundlefix-")?;

        info!(input = %input.display(), "extracting archive");
        let app_root = extract_ipa(input, work_dir.path())?;

        let mut nodes = scan_bundles(work_dir.path(), &app_root, self.scope.as_deref())?;
        info!(bundles = nodes.len(), "scanned bundle tree");

        let (_registry, summary, reasons) =
            allocate(&mut nodes, &self.main_identifier, self.rewrite_mode)?;
        info!(
            collisions = summary.collisions_found,
            missing = summary.missing_fixed,
            "allocated identifiers"
        );

        let rewritten = rewrite::apply(work_dir.path(), &nodes)?;
        info!(rewritten, "rewrote metadata files");

        verify_tree(
            work_dir.path(),
            &app_root,
            &self.main_identifier,
            self.scope.as_deref(),
        )?;

        create_ipa(work_dir.path(), output, self.compression_level)?;
        self.check_completeness(input, output)?;
        info!(output = %output.display(), "wrote verified archive");

        Ok(Report::build(&self.main_identifier, &nodes, &reasons, &summary))
    }

    /// Confirm the output archive reopens and holds exactly the input's
    /// file paths: nothing added, nothing dropped.
    fn check_completeness(&self, input: &Path, output: &Path) -> Result<()> {
        let before = list_entries(input)?;
        let after = list_entries(output)?;

        if before != after {
            let missing: Vec<_> = before.difference(&after).take(5).collect();
            let added: Vec<_> = after.difference(&before).take(5).collect();
            return Err(Error::Repackage(format!(
                "output entry set differs from input (missing: {:?}, added: {:?})",
                missing, added
            )));
        }
        Ok(())
    }
}
