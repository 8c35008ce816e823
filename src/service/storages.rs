//! Storage lifecycle operations.

use tracing::{info, warn};

use crate::entity::EntityRepository;
use crate::storage::{
    Actor, Member, NewStorage, QuotaLimit, QuotaViolation, Storage, StorageRepository,
    StorageUpdate, MAX_STORAGE_DESCRIPTION_LENGTH, MAX_STORAGE_NAME_LENGTH,
};
use crate::{Result, StashError};

use super::{require_storage, StashService};

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StashError::Validation("storage name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_STORAGE_NAME_LENGTH {
        return Err(StashError::Validation(format!(
            "storage name must be at most {MAX_STORAGE_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        if description.chars().count() > MAX_STORAGE_DESCRIPTION_LENGTH {
            return Err(StashError::Validation(format!(
                "description must be at most {MAX_STORAGE_DESCRIPTION_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

fn validate_limits(size: Option<i64>, max_file_size: Option<i64>, max_files_count: Option<i64>) -> Result<()> {
    if matches!(size, Some(size) if size <= 0) {
        return Err(StashError::Validation("capacity must be positive".to_string()));
    }
    if matches!(max_file_size, Some(limit) if limit < 0) {
        return Err(StashError::Validation("file size limit cannot be negative".to_string()));
    }
    if matches!(max_files_count, Some(limit) if limit < 0) {
        return Err(StashError::Validation("file count limit cannot be negative".to_string()));
    }
    Ok(())
}

impl StashService {
    /// Create a storage owned by `owner_id`.
    pub async fn create_storage(&self, storage: &NewStorage, owner_id: &str) -> Result<Storage> {
        validate_name(&storage.name)?;
        validate_description(storage.description.as_deref())?;
        validate_limits(Some(storage.size), storage.max_file_size, storage.max_files_count)?;

        let mut tx = self.db.begin_write().await?;
        if StorageRepository::get_by_name(&mut tx, &storage.name).await?.is_some() {
            return Err(StashError::InvalidOperation(format!(
                "a storage named {} already exists",
                storage.name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let created = StorageRepository::create(&mut tx, &id, storage, owner_id).await?;
        self.blobs.create_storage_dir(&id).await?;

        if let Err(e) = tx.commit().await {
            let _ = self.blobs.remove_storage_dir(&id).await;
            return Err(e.into());
        }

        info!(storage_id = %id, name = %created.name, owner_id, "storage created");
        Ok(created)
    }

    /// Get a storage.
    pub async fn get_storage(&self, storage_id: &str) -> Result<Storage> {
        let mut conn = self.db.pool().acquire().await?;
        require_storage(&mut conn, storage_id).await
    }

    /// Get a storage together with its members.
    pub async fn storage_with_members(&self, storage_id: &str) -> Result<(Storage, Vec<Member>)> {
        let mut conn = self.db.pool().acquire().await?;
        let storage = require_storage(&mut conn, storage_id).await?;
        let members = StorageRepository::members(&mut conn, storage_id).await?;
        Ok((storage, members))
    }

    /// Storages the actor may see. Global admins see all of them.
    pub async fn list_storages(&self, actor: &Actor) -> Result<Vec<Storage>> {
        let mut conn = self.db.pool().acquire().await?;
        if actor.is_admin {
            StorageRepository::list_all(&mut conn).await
        } else {
            StorageRepository::list_visible_to(&mut conn, &actor.id).await
        }
    }

    /// Edit a storage's settings and members.
    ///
    /// The capacity cannot drop below the bytes already in use.
    pub async fn edit_storage(&self, storage_id: &str, update: &StorageUpdate) -> Result<Storage> {
        if let Some(ref name) = update.name {
            validate_name(name)?;
        }
        if let Some(ref description) = update.description {
            validate_description(description.as_deref())?;
        }
        validate_limits(
            update.size,
            update.max_file_size.flatten(),
            update.max_files_count.flatten(),
        )?;

        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;
        let storage = require_storage(&mut tx, storage_id).await?;

        if let Some(ref name) = update.name {
            if let Some(other) = StorageRepository::get_by_name(&mut tx, name).await? {
                if other.id != storage.id {
                    return Err(StashError::InvalidOperation(format!(
                        "a storage named {name} already exists"
                    )));
                }
            }
        }
        if let Some(size) = update.size {
            if size < storage.used {
                return Err(StashError::QuotaExceeded(QuotaViolation::new(
                    QuotaLimit::Capacity,
                    size,
                )));
            }
        }

        let updated = StorageRepository::update(&mut tx, storage_id, update)
            .await?
            .ok_or_else(|| StashError::NotFound("storage".to_string()))?;
        tx.commit().await?;

        info!(storage_id, "storage updated");
        Ok(updated)
    }

    /// Delete a storage with all of its entities and blobs.
    pub async fn delete_storage(&self, storage_id: &str) -> Result<()> {
        let guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;
        require_storage(&mut tx, storage_id).await?;

        let removed = EntityRepository::delete_by_storage(&mut tx, storage_id).await?;
        StorageRepository::delete(&mut tx, storage_id).await?;
        tx.commit().await?;

        if let Err(e) = self.blobs.remove_storage_dir(storage_id).await {
            warn!(storage_id, error = %e, "failed to remove storage blobs");
        }

        drop(guard);
        self.locks.forget(storage_id).await;

        info!(storage_id, entities = removed, "storage deleted");
        Ok(())
    }
}
