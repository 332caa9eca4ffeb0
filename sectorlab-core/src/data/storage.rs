//! Keyed blob storage underneath the bar cache.
//!
//! Keys are `/`-separated relative paths such as `symbol=^NSEI/bars.parquet`.
//! [`FsBlobStore`] maps them onto a directory tree with atomic writes;
//! [`MemoryBlobStore`] keeps everything in a map for tests and dry runs.

use super::provider::DataError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DataError>;

    /// Create or replace a blob.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), DataError>;

    /// Remove a blob. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), DataError>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, DataError>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DataError> {
        Ok(self.read().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), DataError> {
        self.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), DataError> {
        self.write().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, DataError> {
        Ok(self
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Blob store rooted at a directory.
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

    fn path_for(&self, key: &str) -> Result<PathBuf, DataError> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(DataError::Cache(format!("invalid blob key '{key}'")));
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DataError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataError::Cache(format!("read {}: {e}", path.display()))),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), DataError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DataError::Cache(format!("failed to create dir: {e}")))?;
        }
        // Write to a sibling temp file, then rename into place.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes)
            .map_err(|e| DataError::Cache(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DataError::Cache(format!("atomic rename failed: {e}"))
        })
    }

    fn delete(&self, key: &str) -> Result<(), DataError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DataError::Cache(format!("delete {}: {e}", path.display()))),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, DataError> {
        let mut out = Vec::new();
        if self.root.is_dir() {
            collect_keys(&self.root, &self.root, &mut out)?;
        }
        out.retain(|k| k.starts_with(prefix));
        out.sort();
        Ok(out)
    }
}

fn collect_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), DataError> {
    let entries =
        fs::read_dir(dir).map_err(|e| DataError::Cache(format!("read dir: {e}")))?;
    for entry in entries {
        let path = entry
            .map_err(|e| DataError::Cache(format!("dir entry: {e}")))?
            .path();
        if path.is_dir() {
            collect_keys(root, &path, out)?;
            continue;
        }
        if path.extension().is_some_and(|e| e == "tmp") {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            let key: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(key.join("/"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn BlobStore) {
        assert_eq!(store.get("symbol=A/bars.parquet").unwrap(), None);
        store.put("symbol=A/bars.parquet", b"abc").unwrap();
        store.put("symbol=A/meta.json", b"{}").unwrap();
        store.put("symbol=B/meta.json", b"{}").unwrap();
        assert_eq!(store.get("symbol=A/bars.parquet").unwrap().as_deref(), Some(&b"abc"[..]));

        store.put("symbol=A/bars.parquet", b"xyz").unwrap();
        assert_eq!(store.get("symbol=A/bars.parquet").unwrap().as_deref(), Some(&b"xyz"[..]));

        assert_eq!(
            store.keys("symbol=A/").unwrap(),
            vec!["symbol=A/bars.parquet".to_string(), "symbol=A/meta.json".to_string()]
        );
        assert_eq!(store.keys("").unwrap().len(), 3);

        store.delete("symbol=A/bars.parquet").unwrap();
        store.delete("symbol=A/bars.parquet").unwrap();
        assert_eq!(store.get("symbol=A/bars.parquet").unwrap(), None);
    }

    #[test]
    fn memory_store_contract() {
        let store = MemoryBlobStore::new();
        exercise(&store);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsBlobStore::new(dir.path()));
    }

    #[test]
    fn fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.put("../outside", b"x").is_err());
        assert!(store.get("/etc/passwd").is_err());
        assert!(store.put("", b"x").is_err());
    }

    #[test]
    fn fs_store_keys_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("not-created"));
        assert!(store.keys("").unwrap().is_empty());
    }
}
