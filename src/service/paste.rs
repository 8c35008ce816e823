//! Copy and cut of entity subtrees.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{error, info};

use crate::entity::{new_entity_id, Entity, EntityRepository, NewEntity, SizePropagator};
use crate::storage::{QuotaEnforcer, Storage, StorageRepository};
use crate::{Result, StashError};

use super::{load_requested, outermost, require_directory, require_storage, StashService};

/// How pasted entities are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasteMode {
    /// Duplicate entities and their blobs.
    Copy,
    /// Move entities under the target.
    Cut,
}

/// Refuse to paste an entity into itself or one of its descendants.
async fn check_not_inside(
    conn: &mut SqliteConnection,
    entities: &[Entity],
    target_id: Option<&str>,
) -> Result<()> {
    let Some(target_id) = target_id else {
        return Ok(());
    };

    let chain: HashSet<String> = EntityRepository::ancestor_ids(conn, target_id)
        .await?
        .into_iter()
        .collect();
    if let Some(entity) = entities.iter().find(|e| chain.contains(&e.id)) {
        return Err(StashError::InvalidOperation(format!(
            "cannot paste {} into itself",
            entity.fullname
        )));
    }
    Ok(())
}

/// First free name among `name`, `name (copy)`, `name (copy 2)`, ...
async fn unique_directory_name(
    conn: &mut SqliteConnection,
    storage_id: &str,
    parent_id: Option<&str>,
    name: &str,
    claimed: &HashSet<String>,
) -> Result<String> {
    let mut candidate = name.to_string();
    let mut attempt = 0;

    loop {
        let taken = claimed.contains(&candidate)
            || EntityRepository::find_directory(conn, storage_id, parent_id, &candidate)
                .await?
                .is_some();
        if !taken {
            return Ok(candidate);
        }

        attempt += 1;
        candidate = if attempt == 1 {
            format!("{name} (copy)")
        } else {
            format!("{name} (copy {attempt})")
        };
    }
}

impl StashService {
    /// Copy or move entities under `target_id`, or the storage root.
    pub async fn paste(
        &self,
        storage_id: &str,
        mode: PasteMode,
        entity_ids: &[String],
        target_id: Option<&str>,
    ) -> Result<()> {
        match mode {
            PasteMode::Copy => self.copy(storage_id, entity_ids, target_id).await.map(|_| ()),
            PasteMode::Cut => self.cut(storage_id, entity_ids, target_id).await,
        }
    }

    /// Deep-copy entities under `target_id`.
    ///
    /// The copies count against the storage's quota like an upload. A
    /// copied directory whose name is taken at the target gets a
    /// `(copy)` suffix. Returns the new top-level entities.
    pub async fn copy(
        &self,
        storage_id: &str,
        entity_ids: &[String],
        target_id: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        let storage = require_storage(&mut tx, storage_id).await?;
        if let Some(target_id) = target_id {
            require_directory(&mut tx, storage_id, target_id).await?;
        }
        let requested = load_requested(&mut tx, storage_id, entity_ids).await?;
        check_not_inside(&mut tx, &requested, target_id).await?;
        let roots = outermost(&mut tx, requested).await?;

        let mut copied = Vec::new();
        let result = self
            .copy_subtrees(&mut tx, &storage, &roots, target_id, &mut copied)
            .await;

        let (top_level, bytes) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(tx);
                self.blobs.discard(&copied).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            self.blobs.discard(&copied).await;
            return Err(e.into());
        }

        info!(storage_id, entities = roots.len(), bytes, "entities copied");
        Ok(top_level)
    }

    async fn copy_subtrees(
        &self,
        conn: &mut SqliteConnection,
        storage: &Storage,
        roots: &[Entity],
        target_id: Option<&str>,
        copied: &mut Vec<PathBuf>,
    ) -> Result<(Vec<Entity>, i64)> {
        let mut sources = Vec::new();
        for root in roots {
            sources.extend(EntityRepository::subtree(conn, root).await?);
        }

        let sizes: Vec<i64> = sources.iter().filter(|e| e.is_file()).map(|e| e.size).collect();
        let existing = EntityRepository::count_files(conn, &storage.id).await?;
        QuotaEnforcer::validate(storage, existing, &sizes)?;

        let root_ids: HashSet<&str> = roots.iter().map(|r| r.id.as_str()).collect();
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut claimed = HashSet::new();
        let mut records = Vec::with_capacity(sources.len());
        let mut top_level = Vec::with_capacity(roots.len());

        for source in &sources {
            let is_root = root_ids.contains(source.id.as_str());
            let parent = if is_root {
                target_id.map(str::to_string)
            } else {
                source
                    .parent_id
                    .as_ref()
                    .and_then(|parent| id_map.get(parent))
                    .cloned()
            };

            let mut record = NewEntity::copy_of(source, new_entity_id(), parent);
            if is_root && source.is_directory() {
                let name =
                    unique_directory_name(conn, &storage.id, target_id, &source.name, &claimed)
                        .await?;
                claimed.insert(name.clone());
                record = record.with_directory_name(&name);
            }

            if source.is_file() {
                let path = self
                    .blobs
                    .copy(&storage.id, &source.id, &record.id, &source.extension)
                    .await
                    .map_err(|e| {
                        error!(storage_id = %storage.id, entity_id = %source.id, error = %e, "failed to copy blob");
                        e
                    })?;
                copied.push(path);
            }

            id_map.insert(source.id.clone(), record.id.clone());
            if is_root {
                top_level.push(Entity::from(record.clone()));
            }
            records.push(record);
        }

        EntityRepository::bulk_create(conn, &records).await?;

        let bytes: i64 = sizes.iter().sum();
        SizePropagator::propagate(conn, target_id, bytes).await?;
        StorageRepository::adjust_used(conn, &storage.id, bytes).await?;

        Ok((top_level, bytes))
    }

    /// Move entities under `target_id`.
    ///
    /// Blobs stay where they are. Sizes are taken off the old ancestor
    /// chain and added to the new one.
    pub async fn cut(
        &self,
        storage_id: &str,
        entity_ids: &[String],
        target_id: Option<&str>,
    ) -> Result<()> {
        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        require_storage(&mut tx, storage_id).await?;
        if let Some(target_id) = target_id {
            require_directory(&mut tx, storage_id, target_id).await?;
        }
        let requested = load_requested(&mut tx, storage_id, entity_ids).await?;
        check_not_inside(&mut tx, &requested, target_id).await?;

        let mut claimed = HashSet::new();
        for entity in requested.iter().filter(|e| e.is_directory()) {
            if entity.parent_id.as_deref() == target_id {
                continue;
            }
            let clash = EntityRepository::find_directory(&mut tx, storage_id, target_id, &entity.name)
                .await?
                .is_some();
            if clash || !claimed.insert(entity.name.clone()) {
                return Err(StashError::InvalidOperation(format!(
                    "a directory named {} already exists at the destination",
                    entity.name
                )));
            }
        }

        let mut moved = 0;
        for requested_entity in &requested {
            // Earlier moves may have changed the size of this entity.
            let entity = EntityRepository::get_by_id(&mut tx, &requested_entity.id)
                .await?
                .ok_or_else(|| StashError::NotFound(format!("entity {}", requested_entity.id)))?;
            if entity.parent_id.as_deref() == target_id {
                continue;
            }

            SizePropagator::propagate(&mut tx, entity.parent_id.as_deref(), -entity.size).await?;
            SizePropagator::propagate(&mut tx, target_id, entity.size).await?;
            EntityRepository::set_parent(&mut tx, &entity.id, target_id).await?;
            moved += 1;
        }

        tx.commit().await?;

        info!(storage_id, entities = moved, "entities moved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use crate::db::Database;
    use crate::service::UploadItem;
    use crate::storage::{NewStorage, QuotaLimit};
    use tempfile::TempDir;

    async fn setup(storage: NewStorage) -> (TempDir, StashService, Storage) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let blobs = BlobStore::new(temp_dir.path().join("blobs")).unwrap();
        let service = StashService::new(db, blobs);
        let storage = service.create_storage(&storage, "u1").await.unwrap();
        (temp_dir, service, storage)
    }

    async fn upload(
        temp_dir: &TempDir,
        service: &StashService,
        storage: &Storage,
        path: &str,
        size: usize,
    ) -> Entity {
        let staged = temp_dir.path().join(new_entity_id());
        std::fs::write(&staged, vec![7u8; size]).unwrap();
        let name = path.rsplit('/').next().unwrap();
        let item = UploadItem::new(&staged, name, size as i64).with_relative_path(path);
        service
            .upload(&storage.id, None, &[item], "u1")
            .await
            .unwrap()
            .remove(0)
    }

    async fn root_dir(service: &StashService, storage: &Storage, name: &str) -> Entity {
        service
            .list(&storage.id, None)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.fullname == name)
            .unwrap()
    }

    #[tokio::test]
    async fn test_copy_directory_to_root_gets_copy_suffix() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        upload(&temp_dir, &service, &storage, "a/f.txt", 10).await;
        let a = root_dir(&service, &storage, "a").await;

        let copies = service.copy(&storage.id, &[a.id.clone()], None).await.unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].fullname, "a (copy)");
        assert_eq!(copies[0].size, 10);

        let again = service.copy(&storage.id, &[a.id.clone()], None).await.unwrap();
        assert_eq!(again[0].fullname, "a (copy 2)");

        assert_eq!(service.get_storage(&storage.id).await.unwrap().used, 30);

        let inner = service.list(&storage.id, Some(&copies[0].id)).await.unwrap();
        assert_eq!(inner.len(), 1);
        assert_ne!(inner[0].id, a.id);
        assert!(service.blobs().exists(&storage.id, &inner[0].id, "txt").await);
    }

    #[tokio::test]
    async fn test_copy_into_directory_updates_sizes() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let f = upload(&temp_dir, &service, &storage, "src/f.txt", 10).await;
        upload(&temp_dir, &service, &storage, "dst/deep/keep.txt", 1).await;
        let dst = root_dir(&service, &storage, "dst").await;
        let deep = service.list(&storage.id, Some(&dst.id)).await.unwrap().remove(0);

        service
            .paste(&storage.id, PasteMode::Copy, &[f.id.clone()], Some(&deep.id))
            .await
            .unwrap();

        assert_eq!(service.get_entity(&storage.id, &deep.id).await.unwrap().size, 11);
        assert_eq!(service.get_entity(&storage.id, &dst.id).await.unwrap().size, 11);
        assert_eq!(root_dir(&service, &storage, "src").await.size, 10);
    }

    #[tokio::test]
    async fn test_copy_respects_quota() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 15)).await;
        let f = upload(&temp_dir, &service, &storage, "f.bin", 10).await;

        let err = service.copy(&storage.id, &[f.id.clone()], None).await.unwrap_err();
        match err {
            StashError::QuotaExceeded(v) => assert_eq!(v.limit, QuotaLimit::Capacity),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(service.list(&storage.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_copy_failing_midway_rolls_back() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        upload(&temp_dir, &service, &storage, "a/x.txt", 5).await;
        let y = upload(&temp_dir, &service, &storage, "a/y.txt", 10).await;
        let a = root_dir(&service, &storage, "a").await;
        service.blobs().delete(&storage.id, &y.id, &y.extension).await.unwrap();

        let err = service.copy(&storage.id, &[a.id.clone()], None).await.unwrap_err();
        assert!(matches!(err, StashError::Integrity(_)));

        let root = service.list(&storage.id, None).await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(service.get_storage(&storage.id).await.unwrap().used, 15);
        assert_eq!(service.get_entity(&storage.id, &a.id).await.unwrap().size, 15);

        let blobs = std::fs::read_dir(service.blobs().storage_dir(&storage.id))
            .unwrap()
            .count();
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn test_copy_into_itself_fails() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let f = upload(&temp_dir, &service, &storage, "a/b/f.bin", 1).await;
        let a = root_dir(&service, &storage, "a").await;

        let err = service
            .copy(&storage.id, &[a.id.clone()], f.parent_id.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));

        let err = service.copy(&storage.id, &[a.id.clone()], Some(&a.id)).await.unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_cut_moves_sizes() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let f = upload(&temp_dir, &service, &storage, "a/f.bin", 10).await;
        upload(&temp_dir, &service, &storage, "b/g.bin", 1).await;
        let b = root_dir(&service, &storage, "b").await;

        service
            .paste(&storage.id, PasteMode::Cut, &[f.id.clone()], Some(&b.id))
            .await
            .unwrap();

        assert_eq!(root_dir(&service, &storage, "a").await.size, 0);
        assert_eq!(root_dir(&service, &storage, "b").await.size, 11);
        assert_eq!(service.get_storage(&storage.id).await.unwrap().used, 11);

        let moved = service.get_entity(&storage.id, &f.id).await.unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(b.id.as_str()));
        assert!(service.blobs().exists(&storage.id, &f.id, "bin").await);
    }

    #[tokio::test]
    async fn test_cut_parent_and_child_together() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let f = upload(&temp_dir, &service, &storage, "a/f.bin", 10).await;
        upload(&temp_dir, &service, &storage, "t/keep.bin", 1).await;
        let a = root_dir(&service, &storage, "a").await;
        let t = root_dir(&service, &storage, "t").await;

        service
            .cut(&storage.id, &[a.id.clone(), f.id.clone()], Some(&t.id))
            .await
            .unwrap();

        assert_eq!(service.get_entity(&storage.id, &t.id).await.unwrap().size, 11);
        assert_eq!(service.get_entity(&storage.id, &a.id).await.unwrap().size, 0);
        let f = service.get_entity(&storage.id, &f.id).await.unwrap();
        assert_eq!(f.parent_id.as_deref(), Some(t.id.as_str()));
    }

    #[tokio::test]
    async fn test_cut_directory_name_clash() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        upload(&temp_dir, &service, &storage, "x/docs/a.txt", 1).await;
        upload(&temp_dir, &service, &storage, "docs/b.txt", 1).await;
        let x = root_dir(&service, &storage, "x").await;
        let nested_docs = service.list(&storage.id, Some(&x.id)).await.unwrap().remove(0);

        let err = service
            .cut(&storage.id, &[nested_docs.id.clone()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_cut_into_descendant_fails() {
        let (temp_dir, service, storage) = setup(NewStorage::new("main", 1000)).await;
        let f = upload(&temp_dir, &service, &storage, "a/b/f.bin", 1).await;
        let a = root_dir(&service, &storage, "a").await;

        let err = service
            .cut(&storage.id, &[a.id.clone()], f.parent_id.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, StashError::InvalidOperation(_)));
        assert!(service.get_entity(&storage.id, &a.id).await.unwrap().parent_id.is_none());
    }
}
