//! Recursive deletion.

use tracing::{info, warn};

use crate::entity::{Entity, EntityRepository, SizePropagator};
use crate::storage::StorageRepository;
use crate::Result;

use super::{load_requested, outermost, require_storage, StashService};

impl StashService {
    /// Delete entities and everything below them.
    ///
    /// Every ID must exist in the storage, otherwise nothing is deleted.
    /// Metadata is committed first, then blobs are removed best-effort.
    /// Returns the number of bytes freed.
    pub async fn delete(&self, storage_id: &str, entity_ids: &[String]) -> Result<i64> {
        let _guard = self.locks.acquire(storage_id).await;
        let mut tx = self.db.begin_write().await?;

        require_storage(&mut tx, storage_id).await?;
        let requested = load_requested(&mut tx, storage_id, entity_ids).await?;
        let roots = outermost(&mut tx, requested).await?;

        let mut freed = 0;
        let mut removed_files: Vec<Entity> = Vec::new();
        let mut removed = 0;

        for root in &roots {
            let subtree = EntityRepository::subtree(&mut tx, root).await?;
            let bytes: i64 = subtree.iter().filter(|e| e.is_file()).map(|e| e.size).sum();

            SizePropagator::propagate(&mut tx, root.parent_id.as_deref(), -bytes).await?;

            // Children before parents.
            for entity in subtree.iter().rev() {
                EntityRepository::delete(&mut tx, &entity.id).await?;
            }

            removed += subtree.len();
            freed += bytes;
            removed_files.extend(subtree.into_iter().filter(Entity::is_file));
        }

        StorageRepository::adjust_used(&mut tx, storage_id, -freed).await?;
        tx.commit().await?;

        for file in &removed_files {
            match self.blobs.delete(storage_id, &file.id, &file.extension).await {
                Ok(true) => {}
                Ok(false) => warn!(storage_id, entity_id = %file.id, "blob already missing"),
                Err(e) => warn!(storage_id, entity_id = %file.id, error = %e, "failed to remove blob"),
            }
        }

        info!(storage_id, entities = removed, bytes = freed, "entities deleted");
        Ok(freed)
    }
}
