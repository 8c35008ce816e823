//! Entity types for stash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StashError;

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A leaf backed by a blob.
    File,
    /// An interior node whose size is the sum of its descendant files.
    Directory,
}

impl EntityType {
    /// Get the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Directory => "directory",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntityType::File),
            "directory" => Ok(EntityType::Directory),
            other => Err(StashError::Integrity(format!("unknown entity type: {other}"))),
        }
    }
}

impl TryFrom<String> for EntityType {
    type Error = StashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A node in a storage's tree.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Entity {
    /// Entity ID.
    pub id: String,
    /// Owning storage.
    pub storage_id: String,
    /// Parent directory, or None for the storage root.
    pub parent_id: Option<String>,
    /// File or directory.
    #[sqlx(try_from = "String")]
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Name without extension for files, full name for directories.
    pub name: String,
    /// Extension without the dot, empty when there is none.
    pub extension: String,
    /// Display name.
    pub fullname: String,
    /// File length, or the sum of descendant file lengths for directories.
    pub size: i64,
    /// Who uploaded or created the entity.
    pub uploader_id: String,
    /// Creation timestamp.
    pub uploaded_at: DateTime<Utc>,
}

impl Entity {
    /// Whether this entity is a file.
    pub fn is_file(&self) -> bool {
        self.entity_type == EntityType::File
    }

    /// Whether this entity is a directory.
    pub fn is_directory(&self) -> bool {
        self.entity_type == EntityType::Directory
    }
}

/// Data for inserting a new entity.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub id: String,
    pub storage_id: String,
    pub parent_id: Option<String>,
    pub entity_type: EntityType,
    pub name: String,
    pub extension: String,
    pub fullname: String,
    pub size: i64,
    pub uploader_id: String,
    pub uploaded_at: DateTime<Utc>,
}

impl NewEntity {
    /// Describe a file from its original file name.
    pub fn file(
        id: impl Into<String>,
        storage_id: impl Into<String>,
        original_name: &str,
        size: i64,
        uploader_id: impl Into<String>,
    ) -> Self {
        let (name, extension) = split_filename(original_name);
        Self {
            id: id.into(),
            storage_id: storage_id.into(),
            parent_id: None,
            entity_type: EntityType::File,
            name,
            extension,
            fullname: original_name.to_string(),
            size,
            uploader_id: uploader_id.into(),
            uploaded_at: Utc::now(),
        }
    }

    /// Describe an empty directory.
    pub fn directory(
        id: impl Into<String>,
        storage_id: impl Into<String>,
        name: &str,
        uploader_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            storage_id: storage_id.into(),
            parent_id: None,
            entity_type: EntityType::Directory,
            name: name.to_string(),
            extension: String::new(),
            fullname: name.to_string(),
            size: 0,
            uploader_id: uploader_id.into(),
            uploaded_at: Utc::now(),
        }
    }

    /// Clone an existing entity under a new ID and parent.
    ///
    /// Size and uploader are preserved.
    pub fn copy_of(source: &Entity, id: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            storage_id: source.storage_id.clone(),
            parent_id,
            entity_type: source.entity_type,
            name: source.name.clone(),
            extension: source.extension.clone(),
            fullname: source.fullname.clone(),
            size: source.size,
            uploader_id: source.uploader_id.clone(),
            uploaded_at: Utc::now(),
        }
    }

    /// Set the parent directory.
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Set the creation timestamp.
    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = uploaded_at;
        self
    }

    /// Rename a directory record.
    pub fn with_directory_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.fullname = name.to_string();
        self
    }
}

impl From<NewEntity> for Entity {
    fn from(new: NewEntity) -> Self {
        Self {
            id: new.id,
            storage_id: new.storage_id,
            parent_id: new.parent_id,
            entity_type: new.entity_type,
            name: new.name,
            extension: new.extension,
            fullname: new.fullname,
            size: new.size,
            uploader_id: new.uploader_id,
            uploaded_at: new.uploaded_at,
        }
    }
}

/// One step of the path from the root to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Breadcrumb {
    pub id: String,
    pub fullname: String,
}

/// Split a file name into name and extension at the last dot.
///
/// A leading dot does not start an extension, so `.hidden` has none.
pub fn split_filename(fullname: &str) -> (String, String) {
    match fullname.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < fullname.len() => (
            fullname[..pos].to_string(),
            fullname[pos + 1..].to_string(),
        ),
        _ => (fullname.to_string(), String::new()),
    }
}
