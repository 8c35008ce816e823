//! Storage types for stash.

use serde::{Deserialize, Serialize};

use crate::StashError;

/// Visibility of a storage to non-members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageAccess {
    /// Anyone authenticated may read.
    Public,
    /// Only the owner and members may read.
    Private,
}

impl StorageAccess {
    /// Get the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageAccess::Public => "public",
            StorageAccess::Private => "private",
        }
    }
}

impl std::str::FromStr for StorageAccess {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(StorageAccess::Public),
            "private" => Ok(StorageAccess::Private),
            other => Err(StashError::Validation(format!("unknown access mode: {other}"))),
        }
    }
}

impl TryFrom<String> for StorageAccess {
    type Error = StashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Role of a member inside one storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// May edit the storage and everything in it.
    Administrator,
    /// May upload and restructure entities.
    Maintainer,
    /// Read-only.
    Watcher,
}

impl MemberRole {
    /// Get the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Administrator => "administrator",
            MemberRole::Maintainer => "maintainer",
            MemberRole::Watcher => "watcher",
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(MemberRole::Administrator),
            "maintainer" => Ok(MemberRole::Maintainer),
            "watcher" => Ok(MemberRole::Watcher),
            other => Err(StashError::Validation(format!("unknown member role: {other}"))),
        }
    }
}

impl TryFrom<String> for MemberRole {
    type Error = StashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A quota-bounded namespace.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Storage {
    /// Unique storage ID.
    pub id: String,
    /// Unique storage name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// User ID of the owner.
    pub owner_id: String,
    /// Capacity in bytes.
    pub size: i64,
    /// Bytes currently consumed by files.
    pub used: i64,
    /// Visibility mode.
    #[sqlx(try_from = "String")]
    pub access: StorageAccess,
    /// Whether `max_file_size` is enforced.
    pub restrict_file_size: bool,
    /// Maximum size of a single file in bytes.
    pub max_file_size: i64,
    /// Whether `max_files_count` is enforced.
    pub restrict_files_count: bool,
    /// Maximum number of files in the storage.
    pub max_files_count: i64,
    /// When the storage was created.
    pub created_at: String,
}

impl Storage {
    /// Bytes still available before the capacity is reached.
    pub fn available(&self) -> i64 {
        (self.size - self.used).max(0)
    }
}

/// A member of a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    /// Member's user ID.
    pub user_id: String,
    /// Member's role in this storage.
    #[sqlx(try_from = "String")]
    pub role: MemberRole,
}

impl Member {
    /// Create a new member entry.
    pub fn new(user_id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Data for creating a new storage.
#[derive(Debug, Clone)]
pub struct NewStorage {
    /// Unique storage name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Capacity in bytes.
    pub size: i64,
    /// Visibility mode.
    pub access: StorageAccess,
    /// Per-file size limit, if any.
    pub max_file_size: Option<i64>,
    /// File count limit, if any.
    pub max_files_count: Option<i64>,
    /// Initial members.
    pub members: Vec<Member>,
}

impl NewStorage {
    /// Create a new private storage with the given capacity.
    pub fn new(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            size,
            access: StorageAccess::Private,
            max_file_size: None,
            max_files_count: None,
            members: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the access mode.
    pub fn with_access(mut self, access: StorageAccess) -> Self {
        self.access = access;
        self
    }

    /// Restrict the size of every single file.
    pub fn with_max_file_size(mut self, max_file_size: i64) -> Self {
        self.max_file_size = Some(max_file_size);
        self
    }

    /// Restrict the number of files in the storage.
    pub fn with_max_files_count(mut self, max_files_count: i64) -> Self {
        self.max_files_count = Some(max_files_count);
        self
    }

    /// Add a member.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }
}

/// Builder for updating a storage.
///
/// Limits use `Option<Option<_>>`: `Some(None)` lifts a limit.
#[derive(Debug, Clone, Default)]
pub struct StorageUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New capacity.
    pub size: Option<i64>,
    /// New access mode.
    pub access: Option<StorageAccess>,
    /// New per-file size limit.
    pub max_file_size: Option<Option<i64>>,
    /// New file count limit.
    pub max_files_count: Option<Option<i64>>,
    /// Replacement member list.
    pub members: Option<Vec<Member>>,
}

impl StorageUpdate {
    /// Create a new StorageUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = Some(description.map(|s| s.into()));
        self
    }

    /// Set the capacity.
    pub fn size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the access mode.
    pub fn access(mut self, access: StorageAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Set or lift the per-file size limit.
    pub fn max_file_size(mut self, max_file_size: Option<i64>) -> Self {
        self.max_file_size = Some(max_file_size);
        self
    }

    /// Set or lift the file count limit.
    pub fn max_files_count(mut self, max_files_count: Option<i64>) -> Self {
        self.max_files_count = Some(max_files_count);
        self
    }

    /// Replace the member list.
    pub fn members(mut self, members: Vec<Member>) -> Self {
        self.members = Some(members);
        self
    }

    /// Check if any column of the storage row is set.
    pub fn has_column_changes(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.size.is_some()
            || self.access.is_some()
            || self.max_file_size.is_some()
            || self.max_files_count.is_some()
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        !self.has_column_changes() && self.members.is_none()
    }
}
