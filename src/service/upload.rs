//! Batch upload.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{error, info};

use crate::entity::{
    new_entity_id, parse_relative_path, validate_entity_name, Entity, EntityRepository, NewEntity,
    PathResolver, SizePropagator,
};
use crate::storage::{QuotaEnforcer, StorageRepository};
use crate::{Result, StashError};

use super::{require_directory, require_storage, StashService};

/// A file already received into the staging area.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Where the content was staged.
    pub staged_path: PathBuf,
    /// The client's file name.
    pub original_name: String,
    /// Relative path such as `a/b/file.txt`, if the client sent one.
    pub relative_path: Option<String>,
    /// Content length in bytes.
    pub size: i64,
}

impl UploadItem {
    /// Create an item without a relative path.
    pub fn new(staged_path: impl Into<PathBuf>, original_name: impl Into<String>, size: i64) -> Self {
        Self {
            staged_path: staged_path.into(),
            original_name: original_name.into(),
            relative_path: None,
            size,
        }
    }

    /// Set the relative path.
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }
}

impl StashService {
    /// Upload a batch of staged files below `parent_id`.
    ///
    /// The batch is all or nothing: quota is checked for the whole batch
    /// first, and any failure afterwards rolls back the metadata and
    /// removes the blobs already placed.
    pub async fn upload(
        &self,
        storage_id: &str,
        parent_id: Option<&str>,
        items: &[UploadItem],
        uploader_id: &str,
    ) -> Result<Vec<Entity>> {
        if items.is_empty() {
            return Err(StashError::Validation("no files to upload".to_string()));
        }

        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            validate_entity_name(&item.original_name)?;
            if item.size < 0 {
                return Err(StashError::Validation("file size cannot be negative".to_string()));
            }
            segments.push(match item.relative_path {
                Some(ref path) => parse_relative_path(path)?,
                None => Vec::new(),
            });
        }

        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        let storage = require_storage(&mut tx, storage_id).await?;
        if !self.blobs.storage_exists(storage_id).await {
            error!(storage_id, "storage has no blob directory");
            return Err(StashError::NotFound("storage".to_string()));
        }
        if let Some(parent_id) = parent_id {
            require_directory(&mut tx, storage_id, parent_id).await?;
        }

        let existing = EntityRepository::count_files(&mut tx, storage_id).await?;
        let sizes: Vec<i64> = items.iter().map(|item| item.size).collect();
        QuotaEnforcer::validate(&storage, existing, &sizes)?;

        let batch = UploadBatch {
            storage_id,
            parent_id,
            uploader_id,
            uploaded_at: Utc::now(),
        };
        let mut placed = Vec::with_capacity(items.len());

        let created = match self
            .write_batch(&mut tx, &batch, items, &segments, &mut placed)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                drop(tx);
                self.blobs.discard(&placed).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            self.blobs.discard(&placed).await;
            return Err(e.into());
        }

        info!(
            storage_id,
            files = created.len(),
            bytes = sizes.iter().sum::<i64>(),
            "upload completed"
        );
        Ok(created)
    }

    async fn write_batch(
        &self,
        conn: &mut SqliteConnection,
        batch: &UploadBatch<'_>,
        items: &[UploadItem],
        segments: &[Vec<String>],
        placed: &mut Vec<PathBuf>,
    ) -> Result<Vec<Entity>> {
        let mut records = Vec::with_capacity(items.len());
        let mut deltas: HashMap<Option<String>, i64> = HashMap::new();

        for (item, segments) in items.iter().zip(segments) {
            let parent = PathResolver::resolve_or_create(
                conn,
                batch.storage_id,
                batch.parent_id,
                segments,
                batch.uploader_id,
                batch.uploaded_at,
            )
            .await?;

            let record = NewEntity::file(
                new_entity_id(),
                batch.storage_id,
                &item.original_name,
                item.size,
                batch.uploader_id,
            )
            .with_parent(parent.clone())
            .with_uploaded_at(batch.uploaded_at);

            let path = self
                .blobs
                .place(&item.staged_path, batch.storage_id, &record.id, &record.extension)
                .await
                .map_err(|e| {
                    error!(storage_id = batch.storage_id, entity_id = %record.id, error = %e, "failed to place uploaded blob");
                    e
                })?;
            placed.push(path);

            *deltas.entry(parent).or_insert(0) += item.size;
            records.push(record);
        }

        EntityRepository::bulk_create(conn, &records).await?;
        SizePropagator::propagate_all(conn, &deltas).await?;

        let total: i64 = records.iter().map(|r| r.size).sum();
        StorageRepository::adjust_used(conn, batch.storage_id, total).await?;

        Ok(records.into_iter().map(Entity::from).collect())
    }
}

struct UploadBatch<'a> {
    storage_id: &'a str,
    parent_id: Option<&'a str>,
    uploader_id: &'a str,
    uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use crate::db::Database;
    use crate::storage::{NewStorage, QuotaLimit, Storage};
    use tempfile::TempDir;

    async fn setup(storage: NewStorage) -> (TempDir, StashService, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = BlobStore::new(temp_dir.path().join("blobs")).unwrap();
        let service = StashService::new(db, blobs);
        let storage = service.create_storage(&storage, "u1").await.unwrap();
        (temp_dir, service, storage)
    }

    fn stage(temp_dir: &TempDir, name: &str, content: &[u8]) -> UploadItem {
        let path = temp_dir.path().join(format!("{}.part", new_entity_id()));
        std::fs::write(&path, content).unwrap();
        UploadItem::new(path, name, content.len() as i64)
    }

    #[tokio::test]
    async fn test_upload_with_relative_paths() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;

        let items = vec![
            stage(&temp_dir, "x.txt", &[0; 10]).with_relative_path("a/b/x.txt"),
            stage(&temp_dir, "y.txt", &[0; 20]).with_relative_path("a/y.txt"),
        ];
        let created = service.upload(&storage.id, None, &items, "u1").await.unwrap();
        assert_eq!(created.len(), 2);

        let root = service.list(&storage.id, None).await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].fullname, "a");
        assert_eq!(root[0].size, 30);

        let inside = service.list(&storage.id, Some(&root[0].id)).await.unwrap();
        let b = inside.iter().find(|e| e.fullname == "b").unwrap();
        assert_eq!(b.size, 10);

        let storage = service.get_storage(&storage.id).await.unwrap();
        assert_eq!(storage.used, 30);

        for entity in &created {
            assert!(service.blobs().exists(&storage.id, &entity.id, &entity.extension).await);
            assert!(!items.iter().any(|i| i.staged_path.exists()));
        }
    }

    #[tokio::test]
    async fn test_upload_rejects_capacity_overflow() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 100)).await;

        let items = vec![
            stage(&temp_dir, "a.bin", &[0; 60]),
            stage(&temp_dir, "b.bin", &[0; 50]),
        ];
        let err = service.upload(&storage.id, None, &items, "u1").await.unwrap_err();

        match err {
            StashError::QuotaExceeded(violation) => assert_eq!(violation.limit, QuotaLimit::Capacity),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(service.list(&storage.id, None).await.unwrap().is_empty());
        assert_eq!(service.get_storage(&storage.id).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_upload_rolls_back_on_missing_staged_file() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;

        let good = stage(&temp_dir, "good.txt", b"content");
        let missing = UploadItem::new(temp_dir.path().join("missing.part"), "bad.txt", 3)
            .with_relative_path("nested/bad.txt");

        let result = service.upload(&storage.id, None, &[good, missing], "u1").await;
        assert!(result.is_err());

        assert!(service.list(&storage.id, None).await.unwrap().is_empty());
        assert_eq!(service.get_storage(&storage.id).await.unwrap().used, 0);

        let leftovers = std::fs::read_dir(service.blobs().storage_dir(&storage.id))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_upload_into_file_parent_fails() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let created = service
            .upload(&storage.id, None, &[stage(&temp_dir, "f.txt", b"1")], "u1")
            .await
            .unwrap();

        let err = service
            .upload(&storage.id, Some(&created[0].id), &[stage(&temp_dir, "g.txt", b"1")], "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_upload_unknown_storage() {
        let (temp_dir, service, _storage) = setup(NewStorage::new("main", 1000)).await;

        let err = service
            .upload("ghost", None, &[stage(&temp_dir, "f.txt", b"1")], "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, StashError::NotFound(_)));
    }
}
