//! IPA extraction.
//!
//! Unpacks an IPA into a working directory and locates the single `.app`
//! bundle under `Payload/`. The archive is memory-mapped and entries are
//! extracted in parallel; Unix modes and symlinks are preserved so the
//! repackaged artifact round-trips byte-for-byte at the path level.

use crate::{Error, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;

struct EntryPlan {
    index: usize,
    outpath: PathBuf,
    is_symlink: bool,
    #[cfg(unix)]
    unix_mode: Option<u32>,
}

/// Check that `ipa_path` exists and starts with a ZIP signature.
///
/// The input archive is opened read-only and never modified.
pub fn validate_ipa(ipa_path: impl AsRef<Path>) -> Result<()> {
    let ipa_path = ipa_path.as_ref();

    if !ipa_path.exists() {
        return Err(Error::Extraction(format!(
            "archive not found: {}",
            ipa_path.display()
        )));
    }

    let mut file = File::open(ipa_path)?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic[0..2] != b"PK" {
        return Err(Error::Extraction(format!(
            "not a valid ZIP/IPA archive: {}",
            ipa_path.display()
        )));
    }

    Ok(())
}

/// Extract an IPA into `dest_dir` and return the path to its `.app` bundle.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if the archive is unreadable, not a valid
/// ZIP, or does not contain exactly one `.app` directory under `Payload/`.
pub fn extract_ipa(ipa_path: impl AsRef<Path>, dest_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let ipa_path = ipa_path.as_ref();
    let dest_dir = dest_dir.as_ref();

    validate_ipa(ipa_path)?;

    let file = File::open(ipa_path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mmap = Arc::new(mmap);

    let cursor = Cursor::new(&mmap[..]);
    let mut zip = ZipArchive::new(cursor)
        .map_err(|e| Error::Extraction(format!("cannot open {}: {}", ipa_path.display(), e)))?;

    fs::create_dir_all(dest_dir)?;

    // First pass: plan entries and create the directory skeleton so the
    // parallel pass only ever writes files.
    let mut plans: Vec<EntryPlan> = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };

        #[cfg(unix)]
        let unix_mode = entry.unix_mode();
        #[cfg(unix)]
        let is_symlink = unix_mode
            .map(|mode| (mode & 0o170000) == 0o120000)
            .unwrap_or(false);
        #[cfg(not(unix))]
        let is_symlink = false;

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            plans.push(EntryPlan {
                index: i,
                outpath,
                is_symlink,
                #[cfg(unix)]
                unix_mode,
            });
        }
    }

    debug!(entries = plans.len(), dest = %dest_dir.display(), "extracting archive");

    plans.par_iter().try_for_each(|plan| -> Result<()> {
        // Each worker opens its own view into the shared mmap.
        let cursor = Cursor::new(&mmap[..]);
        let mut zip = ZipArchive::new(cursor)?;
        let mut entry = zip.by_index(plan.index)?;

        #[cfg(unix)]
        if plan.is_symlink {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            if plan.outpath.symlink_metadata().is_ok() {
                let _ = fs::remove_file(&plan.outpath);
            }
            std::os::unix::fs::symlink(&target, &plan.outpath)?;
            return Ok(());
        }

        let mut outfile = File::create(&plan.outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = plan.unix_mode {
                fs::set_permissions(&plan.outpath, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }

        Ok(())
    })?;

    find_app_root(dest_dir)
}

/// Locate the single `.app` directory under `Payload/`.
///
/// Zero application roots and more than one are both extraction failures;
/// downstream stages need exactly one protected main bundle.
fn find_app_root(dest_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let payload_dir = dest_dir.as_ref().join("Payload");

    if !payload_dir.is_dir() {
        return Err(Error::Extraction(
            "no Payload directory found in archive".to_string(),
        ));
    }

    let mut apps: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(&payload_dir)? {
        let path = entry?.path();
        if path.is_dir() && path.extension().map(|e| e == "app").unwrap_or(false) {
            apps.push(path);
        }
    }
    apps.sort();

    match apps.len() {
        0 => Err(Error::Extraction(
            "no .app bundle found in Payload/".to_string(),
        )),
        1 => Ok(apps.remove(0)),
        n => Err(Error::Extraction(format!(
            "expected exactly one .app bundle in Payload/, found {}",
            n
        ))),
    }
}
