//! Directory creation and renaming.

use tracing::info;

use crate::entity::{
    new_entity_id, split_filename, validate_entity_name, Entity, EntityRepository, NewEntity,
};
use crate::{Result, StashError};

use super::{require_directory, require_entity, require_storage, StashService};

impl StashService {
    /// Create an empty directory.
    ///
    /// Two directories with the same name cannot share a parent.
    pub async fn mkdir(
        &self,
        storage_id: &str,
        parent_id: Option<&str>,
        name: &str,
        uploader_id: &str,
    ) -> Result<Entity> {
        validate_entity_name(name)?;

        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        require_storage(&mut tx, storage_id).await?;
        if let Some(parent_id) = parent_id {
            require_directory(&mut tx, storage_id, parent_id).await?;
        }
        if EntityRepository::find_directory(&mut tx, storage_id, parent_id, name)
            .await?
            .is_some()
        {
            return Err(StashError::InvalidOperation(format!(
                "a directory named {name} already exists here"
            )));
        }

        let directory = NewEntity::directory(new_entity_id(), storage_id, name, uploader_id)
            .with_parent(parent_id.map(str::to_string));
        let created = EntityRepository::create(&mut tx, &directory).await?;
        tx.commit().await?;

        info!(storage_id, entity_id = %created.id, "directory created");
        Ok(created)
    }

    /// Rename an entity.
    ///
    /// A file keeps its extension and blob; only the display name and the
    /// name stem change.
    pub async fn rename(&self, storage_id: &str, entity_id: &str, fullname: &str) -> Result<Entity> {
        validate_entity_name(fullname)?;

        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        let mut entity = require_entity(&mut tx, storage_id, entity_id).await?;

        let name = if entity.is_directory() {
            let clash = EntityRepository::find_directory(
                &mut tx,
                storage_id,
                entity.parent_id.as_deref(),
                fullname,
            )
            .await?;
            if clash.is_some_and(|other| other.id != entity.id) {
                return Err(StashError::InvalidOperation(format!(
                    "a directory named {fullname} already exists here"
                )));
            }
            fullname.to_string()
        } else {
            split_filename(fullname).0
        };

        EntityRepository::rename(&mut tx, entity_id, &name, fullname).await?;
        tx.commit().await?;

        entity.name = name;
        entity.fullname = fullname.to_string();
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use crate::db::Database;
    use crate::service::UploadItem;
    use crate::storage::{NewStorage, Storage};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, StashService, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = BlobStore::new(temp_dir.path().join("blobs")).unwrap();
        let service = StashService::new(db, blobs);
        let storage = service
            .create_storage(&NewStorage::new("main", 1000), "u1")
            .await
            .unwrap();
        (temp_dir, service, storage)
    }

    #[tokio::test]
    async fn test_mkdir_and_duplicate() {
        let (_temp_dir, service, storage) = setup().await;

        let docs = service.mkdir(&storage.id, None, "docs", "u1").await.unwrap();
        assert_eq!(docs.size, 0);
        assert!(docs.is_directory());

        let err = service.mkdir(&storage.id, None, "docs", "u1").await.unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));

        let nested = service
            .mkdir(&storage.id, Some(&docs.id), "docs", "u1")
            .await
            .unwrap();
        assert_eq!(nested.parent_id.as_deref(), Some(docs.id.as_str()));
    }

    #[tokio::test]
    async fn test_mkdir_invalid_name() {
        let (_temp_dir, service, storage) = setup().await;

        let err = service.mkdir(&storage.id, None, "a/b", "u1").await.unwrap_err();
        assert!(matches!(err, StashError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rename_file_keeps_extension() {
        let (temp_dir, service, storage) = setup().await;
        let staged = temp_dir.path().join("staged");
        std::fs::write(&staged, b"12345").unwrap();
        let file = service
            .upload(&storage.id, None, &[UploadItem::new(&staged, "draft.txt", 5)], "u1")
            .await
            .unwrap()
            .remove(0);

        let renamed = service.rename(&storage.id, &file.id, "final.md").await.unwrap();
        assert_eq!(renamed.fullname, "final.md");
        assert_eq!(renamed.name, "final");
        assert_eq!(renamed.extension, "txt");
        assert_eq!(renamed.size, 5);
        assert!(service.blobs().exists(&storage.id, &file.id, "txt").await);
    }

    #[tokio::test]
    async fn test_rename_directory_clash() {
        let (_temp_dir, service, storage) = setup().await;
        service.mkdir(&storage.id, None, "a", "u1").await.unwrap();
        let b = service.mkdir(&storage.id, None, "b", "u1").await.unwrap();

        let err = service.rename(&storage.id, &b.id, "a").await.unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));

        let renamed = service.rename(&storage.id, &b.id, "c").await.unwrap();
        assert_eq!(renamed.name, "c");
    }

    #[tokio::test]
    async fn test_rename_unknown_entity() {
        let (_temp_dir, service, storage) = setup().await;

        let err = service.rename(&storage.id, "ghost", "x").await.unwrap_err();
        assert!(matches!(err, StashError::NotFound(_)));
    }
}
