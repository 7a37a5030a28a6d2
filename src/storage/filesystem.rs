use crate::storage::{StorageBackend, StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Filesystem-based storage backend
///
/// Keeps per-request working directories below a configurable root path
/// (`./tmp` by default).
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root_path: PathBuf,
}

impl FilesystemStorage {
    /// Create a new filesystem storage backend with the given root path
    pub fn new<P: AsRef<Path>>(root_path: P) -> StorageResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        if !root_path.exists() {
            std::fs::create_dir_all(&root_path).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create storage root directory '{}': {}",
                    root_path.display(),
                    e
                ))
            })?;
        }

        // Not canonicalized: on macOS /var resolves to /private/var and the
        // configured parent would no longer prefix the working directories.
        Ok(Self { root_path })
    }
}

impl StorageBackend for FilesystemStorage {
    fn base_path(&self) -> &Path {
        &self.root_path
    }
}
