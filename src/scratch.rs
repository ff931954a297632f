//! Scoped temporary files and directories, removed when dropped.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A temporary file owned by exactly one pipeline call.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of an existing (or about to be created) file.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch file {}: {}", self.path.display(), e),
        }
    }
}

/// A uniquely named temporary directory, removed recursively when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `{parent}/{prefix}_{uuid}`.
    pub fn create_in(parent: &Path, prefix: &str) -> std::io::Result<Self> {
        let path = parent.join(format!("{}_{}", prefix, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path for `name` inside the directory. Directory components of `name` are dropped.
    pub fn child(&self, name: &str) -> PathBuf {
        self.path.join(base_name(name))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed scratch dir {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch dir {}: {}", self.path.display(), e),
        }
    }
}

/// Last path component of a client-supplied name, with a fallback for empty names.
pub fn base_name(name: &str) -> String {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("upload")
        .to_string()
}
