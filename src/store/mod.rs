pub mod dataset;
pub mod frame;
pub mod codec;
pub mod partition;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use walkdir::WalkDir;

pub use dataset::Dataset;
pub use frame::Frame;
pub use partition::PartitionStore;

/// Flat key/value object storage with `/`-separated keys.
pub trait ObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// All keys under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Objects as files beneath a root directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, s| p.join(s))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let final_path = self.path(key);
        let dir = final_path
            .parent()
            .with_context(|| format!("Object key has no parent: {}", key))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        // Stage next to the target so the rename stays on one filesystem.
        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let temp_path = dir.join(format!(".{}.tmp", file_name));
        fs::write(&temp_path, data)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &final_path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key);
        fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.path(prefix);
        if !start.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&start) {
            let entry = entry.with_context(|| format!("Failed to list {}", start.display()))?;
            if !entry.file_type().is_file() || entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).with_context(|| {
                format!("{} is outside {}", entry.path().display(), self.root.display())
            })?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }
}
