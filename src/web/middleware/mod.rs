//! Middleware for the Web API.

pub mod auth;
pub mod cors;

pub use auth::{jwt_auth, AuthUser, JwtClaims, JwtState, ADMIN_ROLE};
pub use cors::create_cors_layer;
