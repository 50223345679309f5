//! File Store
//!
//! list/read/write/delete over the files directly under one root directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{FileportError, Result};

use super::name::{is_temp_name, validate_name, TEMP_PREFIX, TEMP_SUFFIX};

/// Number of write-lock stripes
const LOCK_STRIPES: usize = 64;

/// Owns the store root directory
///
/// ## Concurrency:
/// - Reads take no lock; writes are atomic renames so a reader sees either
///   the old or the new content
/// - `write`/`delete` hold the stripe lock for their name, so same-name
///   mutations within one process never interleave
/// - Across processes (process pool) same-name writes are last-writer-wins
pub struct FileStore {
    /// Root directory as given by the caller
    root: PathBuf,

    /// Canonical root, used to confirm resolved paths stay inside
    canonical_root: PathBuf,

    /// Striped per-name write locks (index = crc32(name) % LOCK_STRIPES)
    write_locks: Vec<Mutex<()>>,
}

impl FileStore {
    /// Open the store, creating the root directory if it doesn't exist
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let canonical_root = fs::canonicalize(&root)?;
        if !canonical_root.is_dir() {
            return Err(FileportError::Config(format!(
                "store root {} is not a directory",
                root.display()
            )));
        }

        tracing::debug!("File store opened at {}", canonical_root.display());

        Ok(Self {
            root,
            canonical_root,
            write_locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// List regular files directly under the root, sorted by name
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.canonical_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            // Names that aren't UTF-8 can't be requested over the protocol anyway
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };

            if is_temp_name(&name) {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Read a whole file
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;

        // Symlinks are followed, but only to targets inside the root
        let target = match fs::canonicalize(&path) {
            Ok(target) => target,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileportError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !target.starts_with(&self.canonical_root) || !target.is_file() {
            return Err(FileportError::NotFound(name.to_string()));
        }

        fs::read(&target).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileportError::NotFound(name.to_string()),
            _ => FileportError::Io(e),
        })
    }

    /// Create or replace a file
    ///
    /// The content goes to a temp file in the root which is then renamed over
    /// the target, so the prior content survives any failure.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        let _guard = self.lock_for(name);

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.canonical_root)?;

        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| FileportError::Io(e.error))?;

        tracing::debug!("Stored {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    /// Remove a file
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        let _guard = self.lock_for(name);

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                return Err(FileportError::NotFound(name.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileportError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileportError::NotFound(name.to_string()),
            _ => FileportError::Io(e),
        })?;

        tracing::debug!("Deleted {}", name);
        Ok(())
    }

    /// Check whether a regular file with this name exists
    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the root directory as configured
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.canonical_root.join(name))
    }

    fn lock_for(&self, name: &str) -> MutexGuard<'_, ()> {
        let stripe = crc32fast::hash(name.as_bytes()) as usize % LOCK_STRIPES;
        self.write_locks[stripe].lock()
    }
}
