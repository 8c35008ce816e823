//! API handlers.
//!
//! Handlers check the caller's access level, then call into the service.

pub mod entity;
pub mod storage;

pub use entity::*;
pub use storage::*;

use std::path::PathBuf;
use std::sync::Arc;

use crate::service::StashService;
use crate::storage::{is_authorized, AccessLevel, Actor, Member, Storage};
use crate::web::error::ApiError;

/// Shared state of all handlers.
pub struct AppState {
    /// Storage and entity operations.
    pub service: Arc<StashService>,
    /// Where multipart uploads are streamed before being placed.
    pub staging_dir: PathBuf,
    /// Maximum size of one uploaded file in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<StashService>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            staging_dir: staging_dir.into(),
            max_upload_size: 1024 * 1024 * 1024,
        }
    }

    /// Set the upload size limit in megabytes.
    pub fn with_max_upload_size_mb(mut self, mb: u64) -> Self {
        self.max_upload_size = mb * 1024 * 1024;
        self
    }
}

/// Load a storage and check that the actor holds `level` on it.
pub(crate) async fn authorize(
    state: &AppState,
    actor: &Actor,
    storage_id: &str,
    level: AccessLevel,
) -> Result<(Storage, Vec<Member>), ApiError> {
    let (storage, members) = state.service.storage_with_members(storage_id).await?;

    if !is_authorized(actor, &storage, &members, level) {
        tracing::debug!(user_id = %actor.id, storage_id, ?level, "access denied");
        return Err(ApiError::forbidden("Access denied"));
    }

    Ok((storage, members))
}
