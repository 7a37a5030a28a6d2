use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod artifact;
pub mod filesystem;

pub use artifact::Artifact;
pub use filesystem::FilesystemStorage;

/// Error type for storage operations
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Path(String),
    Config(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Path(e) => write!(f, "Path error: {}", e),
            StorageError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend holding the transient artifacts of in-flight batches
///
/// Every batch gets its own working directory below `requests/`; files
/// inside it are written create-exclusive so concurrent batches never
/// clobber each other.
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Get the base path for this storage backend
    fn base_path(&self) -> &Path;

    /// Create a subpath relative to the storage root
    fn subpath_str(&self, path: &str) -> PathBuf {
        self.base_path().join(path)
    }

    /// Ensure a directory exists under the storage root, creating it if necessary
    fn ensure_dir_str(&self, path: &str) -> StorageResult<PathBuf> {
        let full_path = self.subpath_str(path);
        std::fs::create_dir_all(&full_path)?;
        Ok(full_path)
    }

    /// Create a temporary directory with a given prefix within a subdirectory
    fn tempdir_in_str(&self, subdir: &str, prefix: &str) -> StorageResult<tempfile::TempDir> {
        let parent = self.ensure_dir_str(subdir)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&parent)
            .map_err(StorageError::from)
    }

    /// Unique working directory for one batch, removed when dropped
    fn request_workdir(&self, request_id: &str) -> StorageResult<tempfile::TempDir> {
        self.tempdir_in_str("requests", &format!("{}_", request_id))
    }

    /// Write `contents` to a new file `name` inside `dir`.
    ///
    /// Fails if the file already exists. The returned guard deletes the file
    /// when dropped unless it is kept.
    fn write_artifact(&self, dir: &Path, name: &str, contents: &[u8]) -> StorageResult<Artifact> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(StorageError::Path(format!("invalid artifact name '{}'", name)));
        }
        let path = dir.join(name);
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        // guard first so a failed write does not leave a partial file behind
        let artifact = Artifact::adopt(path);
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(artifact)
    }
}

/// Configuration for storage backend
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// Keep the working directory and the failing file's artifacts when a
    /// batch fails
    #[serde(default)]
    pub retain_failed_artifacts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_path(),
            retain_failed_artifacts: false,
        }
    }
}

fn default_backend() -> String {
    "filesystem".to_string()
}

fn default_path() -> String {
    "./tmp".to_string()
}

/// Create a storage backend from configuration
pub fn create_storage_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config.backend.as_str() {
        "filesystem" => {
            let storage = FilesystemStorage::new(&config.path)?;
            Ok(Arc::new(storage))
        }
        _ => Err(StorageError::Config(format!(
            "Unknown storage backend: {}",
            config.backend
        ))),
    }
}

/// Make an uploaded file name safe to use as an artifact name
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized = name.replace(['/', '\\'], "_");
    if sanitized.trim().is_empty() || sanitized == "." || sanitized == ".." {
        "upload".to_string()
    } else {
        sanitized
    }
}
