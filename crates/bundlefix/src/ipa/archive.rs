//! IPA repackaging.
//!
//! Reassembles a working directory back into an IPA at a destination path,
//! preserving the internal path structure, Unix modes, and symlinks. Every
//! file in the working tree goes into the archive; completeness against
//! the input is checked with the entry-listing helper.

use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// ZIP compression level, 0 (stored) through 9 (maximum deflate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// No compression.
    pub const NONE: CompressionLevel = CompressionLevel(0);
    /// Balanced default (level 6).
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);
    /// Maximum compression (level 9).
    pub const MAX: CompressionLevel = CompressionLevel(9);

    /// Creates a level from 0-9; larger values clamp to 9.
    #[must_use]
    pub fn new(level: u32) -> Self {
        CompressionLevel(level.min(9))
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        CompressionLevel::new(level)
    }
}

/// Repackage a working directory into an IPA at `output_path`.
///
/// Archive entry names are the paths relative to `package_root`, so a tree
/// produced by [`crate::ipa::extract_ipa`] round-trips with its original
/// internal structure (including `Payload/` and any top-level metadata
/// files). An existing file at `output_path` is overwritten.
///
/// # Errors
///
/// Returns [`Error::Repackage`] if `package_root` is missing or not a
/// directory, or if the destination cannot be written.
pub fn create_ipa(
    package_root: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    compression_level: CompressionLevel,
) -> Result<()> {
    let package_root = package_root.as_ref();
    let output_path = output_path.as_ref();

    if !package_root.is_dir() {
        return Err(Error::Repackage(format!(
            "working directory missing or not a directory: {}",
            package_root.display()
        )));
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Repackage(format!("cannot create output directory: {}", e)))?;
        }
    }

    let file = File::create(output_path)
        .map_err(|e| Error::Repackage(format!("cannot write {}: {}", output_path.display(), e)))?;
    let mut zip = ZipWriter::new(file);

    let options = if compression_level.level() == 0 {
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level.level() as i64))
    };

    for entry in WalkDir::new(package_root).min_depth(1).follow_links(false) {
        let entry =
            entry.map_err(|e| Error::Repackage(format!("failed to walk working tree: {}", e)))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(package_root)
            .map_err(|_| Error::Repackage("failed to compute relative path".to_string()))?;
        let archive_path = relative.display().to_string();

        let metadata = fs::symlink_metadata(path)?;

        if metadata.is_dir() {
            zip.add_directory(format!("{}/", archive_path), options)?;
        } else if metadata.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            zip.add_symlink(&archive_path, target.to_string_lossy(), options)?;
        } else {
            #[cfg(unix)]
            let options = {
                use std::os::unix::fs::PermissionsExt;
                options.unix_permissions(metadata.permissions().mode())
            };

            zip.start_file(&archive_path, options)?;
            let mut file = File::open(path)?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            zip.write_all(&buffer)?;
        }
    }

    zip.finish()?;
    debug!(output = %output_path.display(), "repackaged archive");

    Ok(())
}

/// List the non-directory entry names of an archive.
///
/// Directory entries are excluded: writers differ on whether they emit
/// them explicitly, and only file paths matter for the completeness check.
pub fn list_entries(archive_path: impl AsRef<Path>) -> Result<BTreeSet<String>> {
    let archive_path = archive_path.as_ref();
    let file = File::open(archive_path).map_err(|e| {
        Error::Repackage(format!("cannot reopen {}: {}", archive_path.display(), e))
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| {
        Error::Repackage(format!("cannot reopen {}: {}", archive_path.display(), e))
    })?;

    let mut names = BTreeSet::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        if !entry.is_dir() {
            names.insert(entry.name().to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_tree(dir: &Path) -> PathBuf {
        let root = dir.join("work");
        let app = root.join("Payload/Test.app");
        fs::create_dir_all(app.join("Resources")).unwrap();
        fs::write(
            app.join("Info.plist"),
            b"<?xml version=\"1.0\"?><plist version=\"1.0\"><dict/></plist>",
        )
        .unwrap();
        fs::write(app.join("Test"), b"BINARY_PLACEHOLDER").unwrap();
        fs::write(app.join("Resources/icon.png"), b"PNG_DATA").unwrap();
        fs::write(root.join("iTunesMetadata.plist"), b"<plist version=\"1.0\"><dict/></plist>")
            .unwrap();
        root
    }

    #[test]
    fn test_create_ipa_structure() {
        let temp = TempDir::new().unwrap();
        let root = create_test_tree(temp.path());
        let out = temp.path().join("out.ipa");

        create_ipa(&root, &out, CompressionLevel::DEFAULT).unwrap();

        let entries = list_entries(&out).unwrap();
        assert!(entries.contains("Payload/Test.app/Info.plist"));
        assert!(entries.contains("Payload/Test.app/Test"));
        assert!(entries.contains("Payload/Test.app/Resources/icon.png"));
        // Top-level files outside Payload/ are carried along
        assert!(entries.contains("iTunesMetadata.plist"));
    }

    #[test]
    fn test_create_ipa_overwrites_destination() {
        let temp = TempDir::new().unwrap();
        let root = create_test_tree(temp.path());
        let out = temp.path().join("out.ipa");
        fs::write(&out, b"stale contents").unwrap();

        create_ipa(&root, &out, CompressionLevel::NONE).unwrap();
        assert!(list_entries(&out).unwrap().contains("Payload/Test.app/Test"));
    }

    #[test]
    fn test_create_ipa_missing_root() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.ipa");
        let result = create_ipa(temp.path().join("nope"), &out, CompressionLevel::DEFAULT);
        assert!(matches!(result, Err(Error::Repackage(_))));
    }

    #[test]
    fn test_round_trip_preserves_entry_set() {
        let temp = TempDir::new().unwrap();
        let root = create_test_tree(temp.path());

        let first = temp.path().join("first.ipa");
        create_ipa(&root, &first, CompressionLevel::DEFAULT).unwrap();

        let work = temp.path().join("work2");
        crate::ipa::extract_ipa(&first, &work).unwrap();

        let second = temp.path().join("second.ipa");
        create_ipa(&work, &second, CompressionLevel::DEFAULT).unwrap();

        assert_eq!(list_entries(&first).unwrap(), list_entries(&second).unwrap());
    }

    #[test]
    fn test_compression_level_clamping() {
        assert_eq!(CompressionLevel::new(15).level(), 9);
        assert_eq!(CompressionLevel::from(3).level(), 3);
        assert_eq!(CompressionLevel::default().level(), 6);
    }

    #[test]
    #[cfg(unix)]
    fn test_create_ipa_preserves_symlinks() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let root = create_test_tree(temp.path());
        let app = root.join("Payload/Test.app");
        let versions = app.join("Frameworks/A.framework/Versions/A");
        fs::create_dir_all(&versions).unwrap();
        fs::write(versions.join("A"), b"binary").unwrap();
        symlink("A", app.join("Frameworks/A.framework/Versions/Current")).unwrap();

        let out = temp.path().join("out.ipa");
        create_ipa(&root, &out, CompressionLevel::DEFAULT).unwrap();

        let file = File::open(&out).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let mut found = false;
        for i in 0..zip.len() {
            let entry = zip.by_index(i).unwrap();
            if entry.name().contains("Versions/Current") {
                if let Some(mode) = entry.unix_mode() {
                    found = (mode & 0o170000) == 0o120000;
                }
            }
        }
        assert!(found, "symlink should survive repackaging");
    }
}
