//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::storage::{Member, Storage, StorageAccess};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Storage as presented to clients.
#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    /// Capacity in bytes.
    pub size: i64,
    pub used: i64,
    pub available: i64,
    pub access: StorageAccess,
    /// Per-file size limit; absent when unrestricted.
    pub max_file_size: Option<i64>,
    /// File count limit; absent when unrestricted.
    pub max_files_count: Option<i64>,
    pub created_at: String,
    /// Present on single-storage responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Member>>,
}

impl From<Storage> for StorageResponse {
    fn from(storage: Storage) -> Self {
        Self {
            available: storage.available(),
            max_file_size: storage.restrict_file_size.then_some(storage.max_file_size),
            max_files_count: storage.restrict_files_count.then_some(storage.max_files_count),
            id: storage.id,
            name: storage.name,
            description: storage.description,
            owner_id: storage.owner_id,
            size: storage.size,
            used: storage.used,
            access: storage.access,
            created_at: storage.created_at,
            members: None,
        }
    }
}

impl StorageResponse {
    /// Attach the member list.
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = Some(members);
        self
    }
}

/// Result of a delete request.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Bytes released from the storage.
    pub freed: i64,
}
