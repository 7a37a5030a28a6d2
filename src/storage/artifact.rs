use std::path::{Path, PathBuf};

/// A transient file removed when the guard is dropped
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    keep: bool,
}

impl Artifact {
    /// Take ownership of an existing file
    pub fn adopt(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard, leaving the file on disk
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove artifact {}: {}", self.path.display(), e),
        }
    }
}
