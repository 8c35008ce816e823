//! Storage handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::storage::AccessLevel;
use crate::web::dto::{
    ApiResponse, CreateStorageRequest, StorageResponse, UpdateStorageRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::{authorize, AppState};
use crate::web::middleware::AuthUser;

/// GET /api/storages - List storages visible to the caller.
pub async fn list_storages(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<ApiResponse<Vec<StorageResponse>>>, ApiError> {
    let storages = state.service.list_storages(&actor).await?;

    Ok(Json(ApiResponse::new(
        storages.into_iter().map(StorageResponse::from).collect(),
    )))
}

/// POST /api/storages - Create a storage (global administrators only).
pub async fn create_storage(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateStorageRequest>,
) -> Result<Json<ApiResponse<StorageResponse>>, ApiError> {
    if !actor.is_admin {
        return Err(ApiError::forbidden("Only administrators can create storages"));
    }

    let storage = state
        .service
        .create_storage(&req.into_new_storage(), &actor.id)
        .await?;
    let (_, members) = state.service.storage_with_members(&storage.id).await?;

    Ok(Json(ApiResponse::new(
        StorageResponse::from(storage).with_members(members),
    )))
}

/// GET /api/storages/:id - Get storage details.
pub async fn get_storage(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
) -> Result<Json<ApiResponse<StorageResponse>>, ApiError> {
    let (storage, members) = authorize(&state, &actor, &storage_id, AccessLevel::Watcher).await?;

    Ok(Json(ApiResponse::new(
        StorageResponse::from(storage).with_members(members),
    )))
}

/// PATCH /api/storages/:id - Edit storage settings and members.
pub async fn update_storage(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateStorageRequest>,
) -> Result<Json<ApiResponse<StorageResponse>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Administrator).await?;

    let update = req.into_update();
    if update.is_empty() {
        return Err(ApiError::bad_request("No changes given"));
    }

    let storage = state.service.edit_storage(&storage_id, &update).await?;
    let (_, members) = state.service.storage_with_members(&storage_id).await?;

    Ok(Json(ApiResponse::new(
        StorageResponse::from(storage).with_members(members),
    )))
}

/// DELETE /api/storages/:id - Delete a storage and all of its content.
pub async fn delete_storage(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Owner).await?;

    state.service.delete_storage(&storage_id).await?;

    Ok(Json(ApiResponse::new(())))
}
