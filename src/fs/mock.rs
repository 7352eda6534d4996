// src/fs/mock.rs

//! In-memory [`FileSystem`] for store tests.
//!
//! Only files are tracked; directories exist implicitly as path prefixes.

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock().insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Delete a file, returning whether it existed. Lets tests simulate an
    /// index entry whose backing record went missing.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        self.lock().remove(path.as_ref()).is_some()
    }

    /// All file paths currently stored, in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }
}
