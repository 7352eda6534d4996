// src/fs/mod.rs

//! Filesystem seam for the output store.
//!
//! Every store write replaces a whole file (a record, a `node_info.json`
//! counter or the run index), so the trait only needs whole-file reads and
//! writes.

use std::ffi::OsString;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace the file at `path` with `contents`, creating parent
    /// directories as needed. Readers see either the old or the new content.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn is_file(&self, path: &Path) -> bool;
}

/// `std::fs`-backed implementation.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }

        let tmp = sibling_tmp(path);
        fs::write(&tmp, contents).with_context(|| format!("writing file {:?}", tmp))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming {:?} to {:?}", tmp, path))?;
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `<path>.tmp`, in the same directory so the rename stays on one device.
fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_creates_parents_and_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run_1/node_1/node_info.json");
        let fs = RealFileSystem;

        fs.write(&path, br#"{"iteration":1}"#).unwrap();
        fs.write(&path, br#"{"iteration":2}"#).unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), r#"{"iteration":2}"#);
        assert!(!sibling_tmp(&path).exists());
    }
}
