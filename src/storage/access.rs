//! Access-control predicates over storages.
//!
//! Each predicate answers one question about `(actor, storage)`; the web
//! layer composes them through [`is_authorized`].

use super::{Member, MemberRole, Storage, StorageAccess};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// User ID.
    pub id: String,
    /// Whether the user is a global administrator.
    pub is_admin: bool,
}

impl Actor {
    /// Create a regular user actor.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    /// Create a global administrator actor.
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

/// Access level required by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Read entities and download.
    Watcher,
    /// Upload, mkdir, delete, paste, rename.
    Maintainer,
    /// Edit the storage itself.
    Administrator,
    /// Delete the storage.
    Owner,
}

fn member_role(actor: &Actor, members: &[Member]) -> Option<MemberRole> {
    members
        .iter()
        .find(|m| m.user_id == actor.id)
        .map(|m| m.role)
}

/// Global admin or the storage owner.
pub fn is_owner(actor: &Actor, storage: &Storage) -> bool {
    actor.is_admin || storage.owner_id == actor.id
}

/// May read the storage.
pub fn can_watch(actor: &Actor, storage: &Storage, members: &[Member]) -> bool {
    is_owner(actor, storage)
        || storage.access == StorageAccess::Public
        || member_role(actor, members).is_some()
}

/// May restructure the storage's entities.
pub fn can_maintain(actor: &Actor, storage: &Storage, members: &[Member]) -> bool {
    is_owner(actor, storage)
        || matches!(
            member_role(actor, members),
            Some(MemberRole::Maintainer | MemberRole::Administrator)
        )
}

/// May edit the storage record and its members.
pub fn can_administer(actor: &Actor, storage: &Storage, members: &[Member]) -> bool {
    is_owner(actor, storage) || member_role(actor, members) == Some(MemberRole::Administrator)
}

/// Check an actor against the level an operation requires.
pub fn is_authorized(
    actor: &Actor,
    storage: &Storage,
    members: &[Member],
    level: AccessLevel,
) -> bool {
    match level {
        AccessLevel::Watcher => can_watch(actor, storage, members),
        AccessLevel::Maintainer => can_maintain(actor, storage, members),
        AccessLevel::Administrator => can_administer(actor, storage, members),
        AccessLevel::Owner => is_owner(actor, storage),
    }
}
