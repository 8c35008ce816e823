//! Entity tree for stash.
//!
//! Files and directories of one storage form a forest of adjacency-list
//! records:
//! - Entity records and their repository
//! - Relative path resolution with on-demand directory creation
//! - Propagation of size deltas up the ancestor chain

mod model;
mod path;
mod propagate;
mod repository;

pub use model::{split_filename, Breadcrumb, Entity, EntityType, NewEntity};
pub use path::{parse_relative_path, PathResolver};
pub use propagate::SizePropagator;
pub use repository::EntityRepository;

use crate::{Result, StashError};

/// Longest parent chain walked before the tree is considered corrupt.
pub const MAX_TREE_DEPTH: usize = 1024;

/// Maximum length for an entity name (in characters).
pub const MAX_ENTITY_NAME_LENGTH: usize = 255;

/// Generate a new entity ID.
pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate a file or directory name supplied by a client.
pub fn validate_entity_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StashError::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_ENTITY_NAME_LENGTH {
        return Err(StashError::Validation(format!(
            "name must be at most {MAX_ENTITY_NAME_LENGTH} characters"
        )));
    }
    if name == "." || name == ".." {
        return Err(StashError::Validation(format!("'{name}' is not a valid name")));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(StashError::Validation(
            "name cannot contain slashes or control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entity_name() {
        assert!(validate_entity_name("report.pdf").is_ok());
        assert!(validate_entity_name("фото 2024").is_ok());
        assert!(validate_entity_name("").is_err());
        assert!(validate_entity_name("   ").is_err());
        assert!(validate_entity_name("..").is_err());
        assert!(validate_entity_name("a/b").is_err());
        assert!(validate_entity_name("a\\b").is_err());
        assert!(validate_entity_name("a\nb").is_err());
        assert!(validate_entity_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_new_entity_id_is_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
