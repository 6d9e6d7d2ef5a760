//! Advisory file locks next to the records file.
//!
//! Two repodeck processes share one records file. Each record store call
//! takes a short lock on `<records>.lock`, and the process that runs
//! operations holds `<records>.owner.lock` until it exits.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// `path` with `suffix` appended to its file name
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))
}

/// Exclusive ownership of a records file and its working copies.
///
/// Only the owner may recover interrupted operations or start new ones.
/// The lock is released when the value is dropped or the process dies.
#[derive(Debug)]
pub struct OwnerLock {
    _file: File,
    path: PathBuf,
}

impl OwnerLock {
    pub fn path_for(records_file: &Path) -> PathBuf {
        sibling_path(records_file, ".owner.lock")
    }

    /// Take ownership without waiting; `None` when another process holds it
    pub fn try_acquire(records_file: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(records_file);
        let file = open_lock_file(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired {}", path.display());
                Ok(Some(Self { _file: file, path }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!("{} is held by another process", path.display());
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lock held around a single read or read-modify-write of the records
pub(crate) struct StoreLock {
    _file: File,
}

impl StoreLock {
    pub(crate) fn shared(records_file: &Path) -> Result<Self> {
        let path = sibling_path(records_file, ".lock");
        let file = open_lock_file(&path)?;
        FileExt::lock_shared(&file).with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(Self { _file: file })
    }

    pub(crate) fn exclusive(records_file: &Path) -> Result<Self> {
        let path = sibling_path(records_file, ".lock");
        let file = open_lock_file(&path)?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(Self { _file: file })
    }
}
