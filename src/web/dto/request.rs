//! Request DTOs for the HTTP API.

use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::service::PasteMode;
use crate::storage::{Member, NewStorage, StorageAccess, StorageUpdate};

use super::validation::{no_control_chars, non_empty_ids, not_empty_trimmed};

/// Distinguish an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Storage creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStorageRequest {
    #[validate(length(min = 1, max = 32), custom(function = "not_empty_trimmed"))]
    pub name: String,
    #[validate(length(max = 256))]
    #[serde(default)]
    pub description: Option<String>,
    /// Capacity in bytes.
    #[validate(range(min = 1))]
    pub size: i64,
    #[serde(default = "default_access")]
    pub access: StorageAccess,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub max_file_size: Option<i64>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub max_files_count: Option<i64>,
    #[serde(default)]
    pub members: Vec<Member>,
}

fn default_access() -> StorageAccess {
    StorageAccess::Private
}

impl CreateStorageRequest {
    /// Convert into the service's builder.
    pub fn into_new_storage(self) -> NewStorage {
        let mut storage = NewStorage::new(self.name, self.size).with_access(self.access);
        if let Some(description) = self.description {
            storage = storage.with_description(description);
        }
        if let Some(max_file_size) = self.max_file_size {
            storage = storage.with_max_file_size(max_file_size);
        }
        if let Some(max_files_count) = self.max_files_count {
            storage = storage.with_max_files_count(max_files_count);
        }
        for member in self.members {
            storage = storage.with_member(member);
        }
        storage
    }
}

/// Storage edit request. Absent fields stay unchanged, `null` lifts a limit.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateStorageRequest {
    #[validate(length(min = 1, max = 32), custom(function = "not_empty_trimmed"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[validate(range(min = 1))]
    pub size: Option<i64>,
    pub access: Option<StorageAccess>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_file_size: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_files_count: Option<Option<i64>>,
    pub members: Option<Vec<Member>>,
}

impl UpdateStorageRequest {
    /// Convert into the service's update builder.
    pub fn into_update(self) -> StorageUpdate {
        StorageUpdate {
            name: self.name,
            description: self.description,
            size: self.size,
            access: self.access,
            max_file_size: self.max_file_size,
            max_files_count: self.max_files_count,
            members: self.members,
        }
    }
}

/// Query for listing entities.
#[derive(Debug, Default, Deserialize)]
pub struct ListEntitiesQuery {
    /// Parent directory; the storage root when absent.
    pub parent: Option<String>,
}

/// Directory creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDirectoryRequest {
    #[validate(
        length(min = 1, max = 255),
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Request naming a set of entities (delete, download).
#[derive(Debug, Deserialize, Validate)]
pub struct EntitiesRequest {
    #[validate(length(min = 1), custom(function = "non_empty_ids"))]
    pub entities: Vec<String>,
}

/// Copy or cut request.
#[derive(Debug, Deserialize, Validate)]
pub struct PasteRequest {
    #[serde(rename = "type")]
    pub mode: PasteMode,
    #[validate(length(min = 1), custom(function = "non_empty_ids"))]
    pub entities: Vec<String>,
    /// Target directory; the storage root when absent.
    #[serde(default)]
    pub parent: Option<String>,
}

/// Rename request.
#[derive(Debug, Deserialize, Validate)]
pub struct RenameRequest {
    #[validate(
        length(min = 1, max = 255),
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub fullname: String,
}
