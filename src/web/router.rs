//! Router configuration for the Web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_directory, create_storage, delete_entities, delete_storage, download_entities,
    get_breadcrumbs, get_entity, get_storage, list_entities, list_storages, paste_entities,
    rename_entity, update_storage, upload_entities, AppState,
};
use super::middleware::{create_cors_layer, jwt_auth, JwtState};

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: &[String],
) -> Router {
    let storage_routes = Router::new()
        .route("/", get(list_storages).post(create_storage))
        .route(
            "/:id",
            get(get_storage).patch(update_storage).delete(delete_storage),
        );

    // Upload size is enforced per file while streaming
    let entity_routes = Router::new()
        .route(
            "/:id/entities",
            get(list_entities)
                .post(upload_entities)
                .layer(DefaultBodyLimit::disable())
                .delete(delete_entities),
        )
        .route(
            "/:id/entities/:entity_id",
            get(get_entity).patch(rename_entity),
        )
        .route("/:id/entities/:entity_id/breadcrumbs", get(get_breadcrumbs))
        .route("/:id/directories", post(create_directory))
        .route("/:id/download", post(download_entities))
        .route("/:id/paste", post(paste_entities));

    let api_routes = Router::new().nest("/storages", storage_routes.merge(entity_routes));

    let jwt_state_for_middleware = jwt_state.clone();

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let state = jwt_state_for_middleware.clone();
                    jwt_auth(state, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}
