//! Raw image bytes keyed by file name.
//!
//! [`FsBlobStore`] keeps one file per key inside a dedicated directory.
//! Writes go to a hidden `.partial` sibling that is synced and then renamed
//! over the final name, so a crash never leaves a truncated image under a
//! live key. A leftover partial file has no record and is collected by the
//! orphan sweep like any other stray file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};

use crate::error::{StoreError, StoreResult};

/// Durable storage for image bytes.
pub trait BlobStore: Send {
    /// Make sure the backing location exists.
    fn ensure_ready(&self) -> StoreResult<()>;

    /// Create or overwrite the blob at `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;

    fn read(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Remove the blob. A missing key is [`StoreError::NotFound`].
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Every stored key. Only the orphan sweep needs this.
    fn list_keys(&self) -> StoreResult<Vec<String>>;
}

/// Reject keys that would escape the blob directory.
fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(StoreError::InvalidArgument(format!(
            "`{key}` is not a valid blob key"
        )));
    }
    Ok(())
}

/// New blobs may not start with `.`, which is reserved for partial files.
fn validate_new_key(key: &str) -> StoreResult<()> {
    validate_key(key)?;
    if key.starts_with('.') {
        return Err(StoreError::InvalidArgument(format!(
            "`{key}` is reserved for partial writes"
        )));
    }
    Ok(())
}

fn not_found(key: &str) -> StoreError {
    StoreError::NotFound {
        entity: "blob",
        id: key.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Filesystem
// ═══════════════════════════════════════════════════════════════════════

/// One file per blob under `root`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn partial_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.partial"))
    }
}

impl BlobStore for FsBlobStore {
    fn ensure_ready(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            StoreError::io(format!("creating blob directory {}", self.root.display()), e)
        })?;
        debug!(root = %self.root.display(), "blob directory ready");
        Ok(())
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn write(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        validate_new_key(key)?;
        let partial = self.partial_path_for(key);
        let target = self.path_for(key);

        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&partial)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&partial, &target)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(StoreError::io(format!("writing blob {key}"), e));
        }
        debug!("blob written");
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        fs::read(self.path_for(key)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(key),
            _ => StoreError::io(format!("reading blob {key}"), e),
        })
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        fs::remove_file(self.path_for(key)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(key),
            _ => StoreError::io(format!("deleting blob {key}"), e),
        })?;
        debug!("blob deleted");
        Ok(())
    }

    fn list_keys(&self) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            StoreError::io(format!("listing blob directory {}", self.root.display()), e)
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("reading blob directory entry", e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StoreError::io("reading blob file type", e))?
                .is_file();
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(key) => keys.push(key),
                Err(raw) => warn!(name = ?raw, "skipping blob file with a non-UTF-8 name"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  In-memory
// ═══════════════════════════════════════════════════════════════════════

/// Process-local blob store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    fn ensure_ready(&self) -> StoreResult<()> {
        Ok(())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        validate_new_key(key)?;
        self.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.lock().get(key).cloned().ok_or_else(|| not_found(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock().remove(key).map(|_| ()).ok_or_else(|| not_found(key))
    }

    fn list_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("images"));
        store.ensure_ready().unwrap();
        (dir, store)
    }

    #[test]
    fn write_read_overwrite() {
        let (_dir, store) = fs_store();
        store.write("a.jpg", b"first").unwrap();
        assert_eq!(store.read("a.jpg").unwrap(), b"first");

        store.write("a.jpg", b"second").unwrap();
        assert_eq!(store.read("a.jpg").unwrap(), b"second");
        assert_eq!(store.list_keys().unwrap(), vec!["a.jpg"]);
    }

    #[test]
    fn missing_keys_are_not_found() {
        let (_dir, store) = fs_store();
        assert!(store.read("missing.jpg").unwrap_err().is_not_found());
        assert!(store.delete("missing.jpg").unwrap_err().is_not_found());
    }

    #[test]
    fn list_keys_skips_directories() {
        let (_dir, store) = fs_store();
        store.write("b.jpg", b"b").unwrap();
        store.write("a.jpg", b"a").unwrap();
        fs::create_dir(store.root().join("nested")).unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn leftover_partial_files_are_listed() {
        let (_dir, store) = fs_store();
        fs::write(store.root().join(".a.jpg.partial"), b"torn").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec![".a.jpg.partial"]);
    }

    #[test]
    fn partial_files_can_be_deleted() {
        let (_dir, store) = fs_store();
        fs::write(store.root().join(".a.jpg.partial"), b"torn").unwrap();

        store.delete(".a.jpg.partial").unwrap();
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_not_listed() {
        use std::os::unix::ffi::OsStrExt;

        let (_dir, store) = fs_store();
        store.write("a.jpg", b"a").unwrap();
        let raw = std::ffi::OsStr::from_bytes(b"stray-\xff.jpg");
        fs::write(store.root().join(raw), b"x").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["a.jpg"]);
    }

    #[test]
    fn ensure_ready_is_idempotent() {
        let (_dir, store) = fs_store();
        store.ensure_ready().unwrap();
        assert!(store.root().is_dir());
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let (_dir, store) = fs_store();
        for key in ["", "../escape.jpg", "a/b.jpg", ".hidden"] {
            let err = store.write(key, b"x").unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)), "key {key:?}");
        }
    }

    #[test]
    fn write_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("never-created"));
        let err = store.write("a.jpg", b"x").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn memory_store_clones_share_contents() {
        let store = MemoryBlobStore::new();
        let handle = store.clone();
        store.write("a.jpg", b"bytes").unwrap();

        assert!(handle.contains("a.jpg"));
        handle.delete("a.jpg").unwrap();
        assert!(store.is_empty());
        assert!(store.delete("a.jpg").unwrap_err().is_not_found());
    }
}
