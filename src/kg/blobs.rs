//! Human-readable payload sink
//!
//! Opaque blobs (typically JSON snapshots of node inputs/outputs) are stored
//! on the filesystem keyed `<root>/<runId>/<eventId>.json` and referenced
//! from execution state nodes by their relative path. The layout is portable
//! across processes so a finished run can be inspected offline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed blob store
#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Root directory; created lazily on first write
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a payload, returning the reference to record on the state node
    pub fn store(&self, run_id: &str, event_id: &str, payload: &[u8]) -> io::Result<String> {
        let rel = format!("{}/{}.json", sanitize(run_id), sanitize(event_id));
        let path = self.root.join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, payload)?;
        debug!("Stored blob {} ({} bytes)", rel, payload.len());
        Ok(rel)
    }

    /// Read a payload back by reference; `None` if it no longer exists
    pub fn read(&self, blob_ref: &str) -> io::Result<Option<Vec<u8>>> {
        // Refs are produced by `store`, but guard against traversal anyway.
        if blob_ref.contains("..") {
            return Ok(None);
        }
        match fs::read(self.root.join(blob_ref)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List the blob refs recorded for one run, in event order
    pub fn refs_for_run(&self, run_id: &str) -> io::Result<Vec<String>> {
        let dir = self.root.join(sanitize(run_id));
        let mut refs = Vec::new();
        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        refs.push(format!(
                            "{}/{}",
                            sanitize(run_id),
                            entry.file_name().to_string_lossy()
                        ));
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        refs.sort();
        Ok(refs)
    }
}

/// Keep run/event ids filesystem-safe
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());

        let r = blobs.store("run-1", "state-0", b"{\"x\":1}").unwrap();
        assert_eq!(r, "run-1/state-0.json");

        let bytes = blobs.read(&r).unwrap().unwrap();
        assert_eq!(bytes, b"{\"x\":1}");
    }

    #[test]
    fn test_missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());
        assert!(blobs.read("run-1/state-9.json").unwrap().is_none());
    }

    #[test]
    fn test_refs_for_run_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());
        blobs.store("run-1", "state-2", b"b").unwrap();
        blobs.store("run-1", "state-1", b"a").unwrap();

        let refs = blobs.refs_for_run("run-1").unwrap();
        assert_eq!(refs, vec!["run-1/state-1.json", "run-1/state-2.json"]);
    }

    #[test]
    fn test_ids_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());
        let r = blobs.store("run/../../etc", "ev il", b"x").unwrap();
        assert!(!r.contains(".."));
        assert!(!r.contains(' '));
        assert!(blobs.read(&r).unwrap().is_some());
    }

    #[test]
    fn test_traversal_refs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path());
        assert!(blobs.read("../outside.json").unwrap().is_none());
    }
}
