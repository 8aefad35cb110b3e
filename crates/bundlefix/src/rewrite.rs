//! Metadata rewriter.
//!
//! Applies the allocator's decisions back into each affected `Info.plist`.
//! Files are parsed into a structured plist value and only the identifier
//! field is replaced; the rest of the dictionary is untouched. Binary
//! plists are written back binary, XML plists as XML. Nodes whose assigned
//! identifier equals the current one are skipped entirely, which makes a
//! second run over already-correct metadata a no-op.

use crate::bundle::{BundleNode, IDENTIFIER_KEY};
use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

/// Rewrite the identifier field of every node whose assignment differs
/// from its current value. Returns the number of files rewritten.
///
/// # Errors
///
/// Returns [`Error::Rewrite`] naming the offending metadata file if it is
/// missing, unreadable, or not a plist dictionary. Must only be called
/// after allocation; a node without an assignment is a rewrite failure.
pub fn apply(package_root: &Path, nodes: &[BundleNode]) -> Result<usize> {
    let mut rewritten = 0;

    for node in nodes {
        let assigned = node.assigned_identifier.as_deref().ok_or_else(|| {
            Error::Rewrite {
                path: node.metadata_path.clone(),
                reason: "node has no assigned identifier".to_string(),
            }
        })?;

        if node.current_identifier.as_deref() == Some(assigned) {
            continue;
        }

        rewrite_identifier(&package_root.join(&node.metadata_path), assigned)?;
        debug!(
            path = %node.metadata_path.display(),
            identifier = assigned,
            "metadata rewritten"
        );
        rewritten += 1;
    }

    Ok(rewritten)
}

/// Replace the identifier field of a single metadata file in place.
fn rewrite_identifier(metadata_path: &Path, identifier: &str) -> Result<()> {
    let fail = |reason: String| Error::Rewrite {
        path: metadata_path.to_path_buf(),
        reason,
    };

    let data = fs::read(metadata_path)
        .map_err(|e| fail(format!("cannot read metadata file: {}", e)))?;

    let mut value: plist::Value =
        plist::from_bytes(&data).map_err(|e| fail(format!("malformed property list: {}", e)))?;

    let dict = value
        .as_dictionary_mut()
        .ok_or_else(|| fail("plist root is not a dictionary".to_string()))?;

    dict.insert(
        IDENTIFIER_KEY.to_string(),
        plist::Value::String(identifier.to_string()),
    );

    let mut buf = Vec::new();
    if data.starts_with(BINARY_PLIST_MAGIC) {
        value
            .to_writer_binary(&mut buf)
            .map_err(|e| fail(format!("cannot serialize plist: {}", e)))?;
    } else {
        value
            .to_writer_xml(&mut buf)
            .map_err(|e| fail(format!("cannot serialize plist: {}", e)))?;
    }

    fs::write(metadata_path, buf)
        .map_err(|e| fail(format!("cannot write metadata file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleKind;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_xml_plist(path: &Path, identifier: Option<&str>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut dict = plist::Dictionary::new();
        dict.insert(
            "CFBundleName".into(),
            plist::Value::String("Keep Me".into()),
        );
        dict.insert("CFBundleVersion".into(), plist::Value::String("42".into()));
        if let Some(id) = identifier {
            dict.insert("CFBundleIdentifier".into(), plist::Value::String(id.into()));
        }
        plist::Value::Dictionary(dict).to_file_xml(path).unwrap();
    }

    fn node_for(rel: &str, current: Option<&str>, assigned: &str) -> BundleNode {
        BundleNode {
            path: PathBuf::from(rel).parent().unwrap().to_path_buf(),
            metadata_path: PathBuf::from(rel),
            kind: BundleKind::Framework,
            current_identifier: current.map(String::from),
            assigned_identifier: Some(assigned.to_string()),
        }
    }

    fn read_identifier(path: &Path) -> Option<String> {
        let value = plist::Value::from_file(path).unwrap();
        value
            .as_dictionary()
            .and_then(|d| d.get("CFBundleIdentifier"))
            .and_then(|v| v.as_string())
            .map(String::from)
    }

    #[test]
    fn test_rewrite_changes_only_identifier() {
        let temp = TempDir::new().unwrap();
        let rel = "A.framework/Info.plist";
        write_xml_plist(&temp.path().join(rel), Some("com.old"));

        let nodes = vec![node_for(rel, Some("com.old"), "com.new")];
        let count = apply(temp.path(), &nodes).unwrap();
        assert_eq!(count, 1);

        let value = plist::Value::from_file(temp.path().join(rel)).unwrap();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(
            dict.get("CFBundleIdentifier").unwrap().as_string(),
            Some("com.new")
        );
        // Unrelated fields survive
        assert_eq!(dict.get("CFBundleName").unwrap().as_string(), Some("Keep Me"));
        assert_eq!(dict.get("CFBundleVersion").unwrap().as_string(), Some("42"));
    }

    #[test]
    fn test_rewrite_inserts_missing_identifier() {
        let temp = TempDir::new().unwrap();
        let rel = "Assets.bundle/Info.plist";
        write_xml_plist(&temp.path().join(rel), None);

        let nodes = vec![node_for(rel, None, "com.example.app.bundle.assets")];
        assert_eq!(apply(temp.path(), &nodes).unwrap(), 1);
        assert_eq!(
            read_identifier(&temp.path().join(rel)).as_deref(),
            Some("com.example.app.bundle.assets")
        );
    }

    #[test]
    fn test_rewrite_skips_unchanged_nodes() {
        let temp = TempDir::new().unwrap();
        let rel = "A.framework/Info.plist";
        let file = temp.path().join(rel);
        write_xml_plist(&file, Some("com.same"));
        let before = fs::read(&file).unwrap();

        let nodes = vec![node_for(rel, Some("com.same"), "com.same")];
        assert_eq!(apply(temp.path(), &nodes).unwrap(), 0);
        assert_eq!(fs::read(&file).unwrap(), before);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let rel = "A.framework/Info.plist";
        let file = temp.path().join(rel);
        write_xml_plist(&file, Some("com.old"));

        let mut nodes = vec![node_for(rel, Some("com.old"), "com.new")];
        assert_eq!(apply(temp.path(), &nodes).unwrap(), 1);
        let after_first = fs::read(&file).unwrap();

        // Second run with the metadata already correct writes nothing
        nodes[0].current_identifier = Some("com.new".to_string());
        assert_eq!(apply(temp.path(), &nodes).unwrap(), 0);
        assert_eq!(fs::read(&file).unwrap(), after_first);
    }

    #[test]
    fn test_rewrite_missing_file_fails_with_path() {
        let temp = TempDir::new().unwrap();
        let rel = "Ghost.framework/Info.plist";
        let nodes = vec![node_for(rel, None, "com.ghost")];

        match apply(temp.path(), &nodes) {
            Err(Error::Rewrite { path, .. }) => assert!(path.ends_with(rel)),
            other => panic!("expected rewrite error, got {:?}", other),
        }
    }

    #[test]
    fn test_rewrite_malformed_plist_fails() {
        let temp = TempDir::new().unwrap();
        let rel = "Bad.framework/Info.plist";
        let file = temp.path().join(rel);
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"this is not a plist at all").unwrap();

        let nodes = vec![node_for(rel, None, "com.bad")];
        assert!(matches!(
            apply(temp.path(), &nodes),
            Err(Error::Rewrite { .. })
        ));
    }

    #[test]
    fn test_rewrite_preserves_binary_format() {
        let temp = TempDir::new().unwrap();
        let rel = "Bin.framework/Info.plist";
        let file = temp.path().join(rel);
        fs::create_dir_all(file.parent().unwrap()).unwrap();

        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), plist::Value::String("com.old".into()));
        dict.insert("CFBundleName".into(), plist::Value::String("Bin".into()));
        plist::Value::Dictionary(dict)
            .to_file_binary(&file)
            .unwrap();

        let nodes = vec![node_for(rel, Some("com.old"), "com.new")];
        apply(temp.path(), &nodes).unwrap();

        let data = fs::read(&file).unwrap();
        assert!(data.starts_with(b"bplist00"), "binary plist stays binary");
        assert_eq!(read_identifier(&file).as_deref(), Some("com.new"));
    }
}
