//! Web API for stash.
//!
//! A JSON API over [`StashService`](crate::StashService) with JWT bearer
//! authentication. Uploads are multipart, downloads are streamed.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
