//! Local directory operations

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// Upper bound on suffixes tried by [`Dir::create_fresh`]
const MAX_FRESH_ATTEMPTS: u32 = 1000;

/// A local directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), ProvisionError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Create a directory that did not exist before, under `parent`.
    ///
    /// Tries `name`, then `name_1`, `name_2`, ... so an existing directory is
    /// never reused.
    pub async fn create_fresh(parent: &Path, name: &str) -> Result<Dir, ProvisionError> {
        fs::create_dir_all(parent).await?;

        for attempt in 0..MAX_FRESH_ATTEMPTS {
            let candidate = match attempt {
                0 => parent.join(name),
                n => parent.join(format!("{name}_{n}")),
            };
            match fs::create_dir(&candidate).await {
                Ok(()) => return Ok(Dir::new(candidate)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProvisionError::Internal(format!(
            "no free directory name for {} under {}",
            name,
            parent.display()
        )))
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
