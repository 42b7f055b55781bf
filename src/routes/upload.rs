use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;
use crate::models::api::UploadedFile;
use crate::storage::upload_key;

/// File upload routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/uploads", post(upload_files))
}

/// POST /api/uploads - Store every `files` part and return its public URL.
async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedFile>>, (StatusCode, String)> {
    let mut uploaded = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart field: {e}"),
        )
    })? {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file: {e}"),
            )
        })?;
        if data.is_empty() {
            continue;
        }

        let key = upload_key(filename.as_deref(), &data);
        let url = state
            .storage
            .upload_bytes(&data, &key, content_type.as_deref())
            .await
            .map_err(|e| {
                error!("Upload to {} failed: {e}", state.storage.provider_name());
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Upload failed: {e}"))
            })?;
        info!("Uploaded {} bytes as {key}", data.len());
        uploaded.push(UploadedFile { url });
    }

    if uploaded.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file provided".to_string()));
    }
    Ok(Json(uploaded))
}
