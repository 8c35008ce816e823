//! Directory size maintenance.

use std::collections::{HashMap, HashSet};

use sqlx::SqliteConnection;
use tracing::trace;

use crate::{Result, StashError};

use super::{EntityRepository, MAX_TREE_DEPTH};

/// Applies size deltas to a directory and all of its ancestors.
pub struct SizePropagator;

impl SizePropagator {
    /// Add `delta` to `start` and every ancestor up to the root.
    ///
    /// `start` is the parent of the changed entity; None means the change
    /// happened at the storage root and nothing is updated. Returns the
    /// number of directories touched.
    pub async fn propagate(
        conn: &mut SqliteConnection,
        start: Option<&str>,
        delta: i64,
    ) -> Result<usize> {
        if delta == 0 {
            return Ok(0);
        }

        let mut visited = HashSet::new();
        let mut current = start.map(str::to_string);

        while let Some(id) = current {
            if visited.len() >= MAX_TREE_DEPTH || !visited.insert(id.clone()) {
                return Err(StashError::Integrity(format!(
                    "parent chain starting at {} does not reach the root",
                    start.unwrap_or_default()
                )));
            }

            if !EntityRepository::adjust_size(conn, &id, delta).await? {
                return Err(StashError::Integrity(format!(
                    "ancestor {id} is missing while propagating size"
                )));
            }

            let entity = EntityRepository::get_by_id(conn, &id).await?.ok_or_else(|| {
                StashError::Integrity(format!("ancestor {id} is missing while propagating size"))
            })?;
            current = entity.parent_id;
        }

        trace!(delta, depth = visited.len(), "propagated size delta");
        Ok(visited.len())
    }

    /// Apply several deltas, one walk per distinct starting directory.
    pub async fn propagate_all(
        conn: &mut SqliteConnection,
        deltas: &HashMap<Option<String>, i64>,
    ) -> Result<usize> {
        let mut touched = 0;
        for (start, delta) in deltas {
            touched += Self::propagate(conn, start.as_deref(), *delta).await?;
        }
        Ok(touched)
    }
}
