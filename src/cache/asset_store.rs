use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{HlodError, Result};

/// Persistent keyed storage for opaque serialized records.
///
/// Keys are `/`-separated relative paths such as `cache/simplified/abc.meshlist`.
pub trait AssetStore {
    /// Bytes stored under `key`, `None` when absent.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace the record under `key`.
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove the record under `key`; removing an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> bool;

    /// Remove every record whose key starts with `prefix`, returning how many went.
    fn delete_prefix(&mut self, prefix: &str) -> Result<usize>;
}

impl<S: AssetStore + ?Sized> AssetStore for &mut S {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> bool {
        (**self).exists(key)
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<usize> {
        (**self).delete_prefix(prefix)
    }
}

/// Store backed by files under a root directory, one file per key.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root, rejecting keys that escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(HlodError::Cache(format!("invalid asset key '{key}'")));
        }
        Ok(self.root.join(relative))
    }

    /// Remove the directories above `path` that are left empty, stopping at the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails on the first directory that still has entries
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    /// Relative keys of every file below `dir`.
    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_keys(&path, keys)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl AssetStore for FileAssetStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved asset");
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted asset");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }

        let mut keys = Vec::new();
        self.collect_keys(&self.root, &mut keys)?;

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            let path = self.root.join(key);
            fs::remove_file(&path)?;
            self.prune_empty_parents(&path);
            removed += 1;
        }
        debug!(root = %self.root.display(), prefix, removed, "Deleted assets by prefix");
        Ok(removed)
    }
}

/// In-process store, for tests and for builds that do not persist results.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    records: BTreeMap<String, Vec<u8>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl AssetStore for MemoryAssetStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).cloned())
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.records.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<usize> {
        let before = self.records.len();
        self.records.retain(|k, _| !k.starts_with(prefix));
        Ok(before - self.records.len())
    }
}
