//! Storage service for stash.
//!
//! `StashService` owns the metadata database, the blob store and the
//! per-storage lock registry. Every mutating operation of a storage:
//! 1. takes the storage's lock,
//! 2. validates the whole request before writing anything,
//! 3. applies metadata changes in one transaction,
//! 4. keeps blobs consistent with what was committed.

mod locks;
mod paste;
mod remove;
mod storages;
mod tree;
mod upload;

pub use locks::StorageLocks;
pub use paste::PasteMode;
pub use upload::UploadItem;

use std::collections::HashSet;

use sqlx::SqliteConnection;

use crate::archive::DownloadPlan;
use crate::blob::BlobStore;
use crate::db::Database;
use crate::entity::{Breadcrumb, Entity, EntityRepository};
use crate::storage::{Storage, StorageRepository};
use crate::{Result, StashError};

/// Entry point for storage and entity operations.
pub struct StashService {
    db: Database,
    blobs: BlobStore,
    locks: StorageLocks,
}

impl StashService {
    /// Create a new service.
    pub fn new(db: Database, blobs: BlobStore) -> Self {
        Self {
            db,
            blobs,
            locks: StorageLocks::new(),
        }
    }

    /// Get the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the blob store.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// List the children of a directory, or the storage root.
    pub async fn list(&self, storage_id: &str, parent_id: Option<&str>) -> Result<Vec<Entity>> {
        let mut conn = self.db.pool().acquire().await?;
        require_storage(&mut conn, storage_id).await?;
        if let Some(parent_id) = parent_id {
            require_directory(&mut conn, storage_id, parent_id).await?;
        }

        EntityRepository::list(&mut conn, storage_id, parent_id).await
    }

    /// Get one entity of a storage.
    pub async fn get_entity(&self, storage_id: &str, entity_id: &str) -> Result<Entity> {
        let mut conn = self.db.pool().acquire().await?;
        require_entity(&mut conn, storage_id, entity_id).await
    }

    /// Path from the storage root down to an entity.
    pub async fn breadcrumbs(&self, storage_id: &str, entity_id: &str) -> Result<Vec<Breadcrumb>> {
        let mut conn = self.db.pool().acquire().await?;
        require_entity(&mut conn, storage_id, entity_id).await?;
        EntityRepository::breadcrumbs(&mut conn, entity_id).await
    }

    /// Prepare a download of the given entities.
    ///
    /// The plan is resolved up front so missing entities are reported
    /// before any byte is streamed.
    pub async fn download(&self, storage_id: &str, entity_ids: &[String]) -> Result<DownloadPlan> {
        let mut conn = self.db.pool().acquire().await?;
        require_storage(&mut conn, storage_id).await?;
        DownloadPlan::build(&mut conn, &self.blobs, storage_id, entity_ids).await
    }
}

pub(crate) async fn require_storage(conn: &mut SqliteConnection, storage_id: &str) -> Result<Storage> {
    StorageRepository::get_by_id(conn, storage_id)
        .await?
        .ok_or_else(|| StashError::NotFound("storage".to_string()))
}

pub(crate) async fn require_entity(
    conn: &mut SqliteConnection,
    storage_id: &str,
    entity_id: &str,
) -> Result<Entity> {
    EntityRepository::get_in_storage(conn, storage_id, entity_id)
        .await?
        .ok_or_else(|| StashError::NotFound(format!("entity {entity_id}")))
}

pub(crate) async fn require_directory(
    conn: &mut SqliteConnection,
    storage_id: &str,
    entity_id: &str,
) -> Result<Entity> {
    let entity = EntityRepository::get_in_storage(conn, storage_id, entity_id)
        .await?
        .ok_or_else(|| StashError::NotFound(format!("directory {entity_id}")))?;

    if !entity.is_directory() {
        return Err(StashError::InvalidOperation(format!(
            "{} is not a directory",
            entity.fullname
        )));
    }
    Ok(entity)
}

/// Load the requested entities, failing on the first unknown ID.
///
/// Duplicates are dropped, the request order is kept.
pub(crate) async fn load_requested(
    conn: &mut SqliteConnection,
    storage_id: &str,
    entity_ids: &[String],
) -> Result<Vec<Entity>> {
    if entity_ids.is_empty() {
        return Err(StashError::Validation("no entities given".to_string()));
    }

    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(entity_ids.len());
    for id in entity_ids {
        if seen.insert(id.as_str()) {
            entities.push(require_entity(conn, storage_id, id).await?);
        }
    }
    Ok(entities)
}

/// Drop requested entities that sit below another requested entity.
///
/// Handling the outermost ones is enough since their subtrees contain the rest.
pub(crate) async fn outermost(conn: &mut SqliteConnection, entities: Vec<Entity>) -> Result<Vec<Entity>> {
    let requested: HashSet<String> = entities.iter().map(|e| e.id.clone()).collect();
    let mut roots = Vec::with_capacity(entities.len());

    for entity in entities {
        let chain = EntityRepository::ancestor_ids(conn, &entity.id).await?;
        if !chain.iter().skip(1).any(|id| requested.contains(id)) {
            roots.push(entity);
        }
    }
    Ok(roots)
}
