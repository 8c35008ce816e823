//! Blob store for stash.
//!
//! File contents live on disk, one directory per storage:
//! ```text
//! {root}/
//! ├── {storage_id}/
//! │   ├── {entity_id}.{extension}
//! │   └── {entity_id}          (files without an extension)
//! └── ...
//! ```
//! Only file entities own a blob. Directories exist purely as metadata.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, warn};

use crate::{Result, StashError};

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at `root`.
    ///
    /// The root directory will be created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    /// Get the root path of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the blobs of one storage.
    pub fn storage_dir(&self, storage_id: &str) -> PathBuf {
        self.root.join(storage_id)
    }

    /// File name of an entity's blob.
    pub fn blob_name(entity_id: &str, extension: &str) -> String {
        if extension.is_empty() {
            entity_id.to_string()
        } else {
            format!("{entity_id}.{extension}")
        }
    }

    /// Full path of an entity's blob.
    pub fn blob_path(&self, storage_id: &str, entity_id: &str, extension: &str) -> PathBuf {
        self.storage_dir(storage_id)
            .join(Self::blob_name(entity_id, extension))
    }

    /// Create the blob directory of a new storage.
    pub async fn create_storage_dir(&self, storage_id: &str) -> Result<()> {
        fs::create_dir_all(self.storage_dir(storage_id)).await?;
        Ok(())
    }

    /// Whether the blob directory of a storage exists.
    pub async fn storage_exists(&self, storage_id: &str) -> bool {
        fs::metadata(self.storage_dir(storage_id))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Remove a storage's blob directory and everything in it.
    ///
    /// Returns `false` if it didn't exist.
    pub async fn remove_storage_dir(&self, storage_id: &str) -> Result<bool> {
        match fs::remove_dir_all(self.storage_dir(storage_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a staged upload into place.
    ///
    /// Falls back to copy and remove when the staging area is on another
    /// filesystem.
    pub async fn place(
        &self,
        staged: &Path,
        storage_id: &str,
        entity_id: &str,
        extension: &str,
    ) -> Result<PathBuf> {
        let target = self.blob_path(storage_id, entity_id, extension);

        if fs::rename(staged, &target).await.is_err() {
            fs::copy(staged, &target).await?;
            if let Err(e) = fs::remove_file(staged).await {
                warn!(path = %staged.display(), error = %e, "failed to remove staged upload");
            }
        }

        debug!(path = %target.display(), "placed blob");
        Ok(target)
    }

    /// Write content directly as an entity's blob.
    pub async fn write(
        &self,
        storage_id: &str,
        entity_id: &str,
        extension: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let target = self.blob_path(storage_id, entity_id, extension);
        fs::write(&target, content).await?;
        Ok(target)
    }

    /// Duplicate a blob under a new entity ID.
    pub async fn copy(
        &self,
        storage_id: &str,
        source_id: &str,
        target_id: &str,
        extension: &str,
    ) -> Result<PathBuf> {
        let source = self.blob_path(storage_id, source_id, extension);
        let target = self.blob_path(storage_id, target_id, extension);

        match fs::copy(&source, &target).await {
            Ok(_) => Ok(target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!(storage_id, entity_id = source_id, path = %source.display(), "blob missing for existing entity");
                Err(StashError::Integrity(format!("entity {source_id} has no blob")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an entity's blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it didn't exist.
    pub async fn delete(&self, storage_id: &str, entity_id: &str, extension: &str) -> Result<bool> {
        Self::remove_path(&self.blob_path(storage_id, entity_id, extension)).await
    }

    /// Remove blobs written by an operation that did not commit.
    pub async fn discard(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = Self::remove_path(path).await {
                warn!(path = %path.display(), error = %e, "failed to discard blob");
            }
        }
    }

    /// Whether an entity's blob exists.
    pub async fn exists(&self, storage_id: &str, entity_id: &str, extension: &str) -> bool {
        fs::try_exists(self.blob_path(storage_id, entity_id, extension))
            .await
            .unwrap_or(false)
    }

    async fn remove_path(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
