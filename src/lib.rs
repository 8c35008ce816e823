//! stash - multi-tenant hierarchical file storage
//!
//! Storages are quota-bounded namespaces holding a tree of files and
//! directories. Metadata lives in SQLite, file content in a blob store on
//! disk, and a JSON web API exposes the operations.

pub mod archive;
pub mod blob;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod logging;
pub mod service;
pub mod storage;
pub mod web;

pub use archive::DownloadPlan;
pub use blob::BlobStore;
pub use config::Config;
pub use db::Database;
pub use entity::{Breadcrumb, Entity, EntityType};
pub use error::{Result, StashError};
pub use service::{PasteMode, StashService, UploadItem};
pub use storage::{AccessLevel, Actor, NewStorage, Storage, StorageAccess, StorageUpdate};
