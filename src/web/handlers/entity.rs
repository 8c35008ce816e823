//! Entity handlers.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::entity::{new_entity_id, Breadcrumb, Entity};
use crate::service::UploadItem;
use crate::storage::AccessLevel;
use crate::web::dto::{
    ApiResponse, CreateDirectoryRequest, DeleteResponse, EntitiesRequest, ListEntitiesQuery,
    PasteRequest, RenameRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::{authorize, AppState};
use crate::web::middleware::AuthUser;

/// Capacity of the in-memory pipe between the archive writer and the response.
const DOWNLOAD_PIPE_CAPACITY: usize = 64 * 1024;

/// Generate a safe Content-Disposition header value for downloads.
///
/// Control characters are removed, quotes and backslashes replaced, and
/// non-ASCII names are sent RFC 5987 encoded.
fn content_disposition_header(filename: &str) -> String {
    let plain = filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// Files streamed into the staging directory for one request.
///
/// Whatever is still there when the request ends is removed.
struct StagedUploads {
    dir: PathBuf,
    items: Vec<UploadItem>,
}

impl StagedUploads {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            items: Vec::new(),
        }
    }

    fn next_path(&self) -> PathBuf {
        self.dir.join(format!("{}.part", new_entity_id()))
    }

    async fn cleanup(&self) {
        for item in &self.items {
            if let Err(e) = tokio::fs::remove_file(&item.staged_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove staged upload {:?}: {}", item.staged_path, e);
                }
            }
        }
    }
}

/// Split a client file name into the bare name and an optional relative path.
fn split_upload_name(file_name: &str) -> (String, Option<String>) {
    let normalized = file_name.replace('\\', "/");
    match normalized.rsplit_once('/') {
        Some((_, name)) => (name.to_string(), Some(normalized.clone())),
        None => (normalized, None),
    }
}

/// GET /api/storages/:id/entities - List a directory or the storage root.
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    Query(query): Query<ListEntitiesQuery>,
) -> Result<Json<ApiResponse<Vec<Entity>>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Watcher).await?;

    let entities = state
        .service
        .list(&storage_id, query.parent.as_deref())
        .await?;

    Ok(Json(ApiResponse::new(entities)))
}

/// GET /api/storages/:id/entities/:entity_id - Get a single entity.
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path((storage_id, entity_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Entity>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Watcher).await?;

    let entity = state.service.get_entity(&storage_id, &entity_id).await?;

    Ok(Json(ApiResponse::new(entity)))
}

/// GET /api/storages/:id/entities/:entity_id/breadcrumbs - Path from the root.
pub async fn get_breadcrumbs(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path((storage_id, entity_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<Breadcrumb>>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Watcher).await?;

    let crumbs = state.service.breadcrumbs(&storage_id, &entity_id).await?;

    Ok(Json(ApiResponse::new(crumbs)))
}

/// POST /api/storages/:id/entities - Upload files.
///
/// Request body: multipart/form-data with any number of file parts and an
/// optional "parent" field. A file part's name may carry a relative path
/// such as `photos/2024/beach.jpg`.
pub async fn upload_entities(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<Entity>>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Maintainer).await?;

    tokio::fs::create_dir_all(&state.staging_dir)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create staging directory: {}", e);
            ApiError::internal("Failed to receive upload")
        })?;

    let mut staged = StagedUploads::new(state.staging_dir.clone());
    let received = receive_multipart(&state, &mut multipart, &mut staged).await;

    let result = match received {
        Ok(_) if staged.items.is_empty() => Err(ApiError::bad_request("No file provided")),
        Ok(parent) => state
            .service
            .upload(&storage_id, parent.as_deref(), &staged.items, &actor.id)
            .await
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };

    staged.cleanup().await;
    result.map(|created| Json(ApiResponse::new(created)))
}

/// Stream every file part into the staging directory.
///
/// Returns the value of the "parent" field.
async fn receive_multipart(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &mut StagedUploads,
) -> Result<Option<String>, ApiError> {
    let mut parent = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            if field.name() == Some("parent") {
                let value = field.text().await.map_err(|e| {
                    tracing::error!("Failed to read parent field: {}", e);
                    ApiError::bad_request("Invalid parent")
                })?;
                if !value.trim().is_empty() {
                    parent = Some(value.trim().to_string());
                }
            }
            continue;
        };

        let (original_name, relative_path) = split_upload_name(&file_name);
        let path = staged.next_path();
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            tracing::error!("Failed to create staged file: {}", e);
            ApiError::internal("Failed to receive upload")
        })?;

        let mut item = UploadItem::new(&path, original_name, 0);
        if let Some(relative_path) = relative_path {
            item = item.with_relative_path(relative_path);
        }
        staged.items.push(item);

        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(|e| {
            tracing::error!("Failed to read file content: {}", e);
            ApiError::bad_request("Failed to read file")
        })? {
            size += chunk.len() as u64;
            if size > state.max_upload_size {
                let max_mb = state.max_upload_size / 1024 / 1024;
                return Err(ApiError::bad_request(format!(
                    "File too large (max {}MB)",
                    max_mb
                )));
            }
            file.write_all(&chunk).await.map_err(|e| {
                tracing::error!("Failed to write staged file: {}", e);
                ApiError::internal("Failed to receive upload")
            })?;
        }
        file.flush().await.map_err(|e| {
            tracing::error!("Failed to flush staged file: {}", e);
            ApiError::internal("Failed to receive upload")
        })?;

        if let Some(item) = staged.items.last_mut() {
            item.size = size as i64;
        }
    }

    Ok(parent)
}

/// POST /api/storages/:id/directories - Create a directory.
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CreateDirectoryRequest>,
) -> Result<Json<ApiResponse<Entity>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Maintainer).await?;

    let directory = state
        .service
        .mkdir(&storage_id, req.parent.as_deref(), &req.name, &actor.id)
        .await?;

    Ok(Json(ApiResponse::new(directory)))
}

/// POST /api/storages/:id/download - Download a file or a zip archive.
///
/// The archive is produced by a background task writing into a bounded
/// pipe; the response body reads from the other end.
pub async fn download_entities(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    ValidatedJson(req): ValidatedJson<EntitiesRequest>,
) -> Result<Response<Body>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Watcher).await?;

    let plan = state.service.download(&storage_id, &req.entities).await?;
    let content_type = plan.content_type();
    let disposition = content_disposition_header(plan.file_name());

    let (reader, writer) = tokio::io::duplex(DOWNLOAD_PIPE_CAPACITY);
    tokio::spawn(async move {
        if let Err(e) = plan.write_to(writer).await {
            tracing::error!(storage_id = %storage_id, "Download stream failed: {}", e);
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// DELETE /api/storages/:id/entities - Delete entities recursively.
pub async fn delete_entities(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    ValidatedJson(req): ValidatedJson<EntitiesRequest>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Maintainer).await?;

    let freed = state.service.delete(&storage_id, &req.entities).await?;

    Ok(Json(ApiResponse::new(DeleteResponse { freed })))
}

/// POST /api/storages/:id/paste - Copy or move entities.
pub async fn paste_entities(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(storage_id): Path<String>,
    ValidatedJson(req): ValidatedJson<PasteRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Maintainer).await?;

    state
        .service
        .paste(&storage_id, req.mode, &req.entities, req.parent.as_deref())
        .await?;

    Ok(Json(ApiResponse::new(())))
}

/// PATCH /api/storages/:id/entities/:entity_id - Rename an entity.
pub async fn rename_entity(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path((storage_id, entity_id)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<RenameRequest>,
) -> Result<Json<ApiResponse<Entity>>, ApiError> {
    authorize(&state, &actor, &storage_id, AccessLevel::Maintainer).await?;

    let entity = state
        .service
        .rename(&storage_id, &entity_id, &req.fullname)
        .await?;

    Ok(Json(ApiResponse::new(entity)))
}
