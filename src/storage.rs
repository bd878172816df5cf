//! File storage for dropgate.
//!
//! Files live flat in the data directory, named by their token:
//! ```text
//! {data_dir}/
//! ├── .Zx8...Qw.tmp     (upload in progress)
//! ├── Ab3...9f          (stored file)
//! └── ...
//! ```
//! Paths are derived from the token alone. The client-supplied filename
//! never reaches this module.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;

use crate::error::StorageError;
use crate::Result;

/// Physical file storage rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Absolute data directory.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a FileStorage rooted at `base_path`.
    ///
    /// The directory is created if it doesn't exist and the path is made absolute.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        let base_path = fs::canonicalize(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Final location of a stored file.
    pub fn final_path(&self, token: &str) -> PathBuf {
        self.base_path.join(token)
    }

    /// Location of a file while it is being received.
    pub fn temp_path(&self, token: &str) -> PathBuf {
        self.base_path.join(format!(".{token}.tmp"))
    }

    /// Create the temporary file for an upload.
    ///
    /// Fails if a temporary file for the token already exists.
    pub async fn create_temp(&self, token: &str) -> Result<File> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.temp_path(token))
            .await?;
        Ok(file)
    }

    /// Atomically move a fully received temporary file into place.
    ///
    /// Returns the final path.
    pub async fn persist(&self, token: &str) -> Result<PathBuf> {
        let final_path = self.final_path(token);
        tokio::fs::rename(self.temp_path(token), &final_path).await?;
        Ok(final_path)
    }

    /// Remove the temporary file of an aborted upload.
    ///
    /// `true` if a file was removed.
    pub async fn discard_temp(&self, token: &str) -> io::Result<bool> {
        remove_if_exists(&self.temp_path(token)).await
    }

    /// Open a stored file for reading.
    pub async fn open(&self, stored_path: &Path) -> Result<File> {
        match File::open(stored_path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::Missing.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a stored file exists.
    pub fn exists(&self, stored_path: &Path) -> bool {
        stored_path.is_file()
    }
}

/// Delete a file.
///
/// `true` if the file was deleted, `false` if it didn't exist.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
