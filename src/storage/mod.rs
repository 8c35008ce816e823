//! Storage namespaces for stash.
//!
//! A storage is a quota-bounded namespace owning one entity tree:
//! - Storage and member records with their repository
//! - Quota validation for prospective writes
//! - Access-control predicates consumed by the web layer

mod access;
mod model;
mod quota;
mod repository;

pub use access::{
    can_administer, can_maintain, can_watch, is_authorized, is_owner, AccessLevel, Actor,
};
pub use model::{Member, MemberRole, NewStorage, Storage, StorageAccess, StorageUpdate};
pub use quota::{format_bytes, QuotaEnforcer, QuotaLimit, QuotaViolation};
pub use repository::StorageRepository;

/// Maximum length for a storage name (in characters).
pub const MAX_STORAGE_NAME_LENGTH: usize = 32;

/// Maximum length for a storage description (in characters).
pub const MAX_STORAGE_DESCRIPTION_LENGTH: usize = 256;
