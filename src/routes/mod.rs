pub mod chat;
pub mod generate;
pub mod scenarios;
pub mod upload;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::app::AppState;
use crate::chat::{ErrorKind, ExchangeError};
use crate::models::api::HealthResponse;

/// Build all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(scenarios::routes())
        .merge(chat::routes())
        .merge(generate::routes())
        .merge(upload::routes());

    if state.settings.storage_provider == "local" {
        router = router.nest_service("/files", ServeDir::new(&state.settings.storage_path));
    }

    router.with_state(state)
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        environment: state.settings.environment.clone(),
    })
}

/// Map an orchestration failure onto the handler error shape.
pub(crate) fn exchange_error(e: ExchangeError) -> (StatusCode, String) {
    match e.kind() {
        ErrorKind::UpstreamFailure => error!("Exchange failed: {e}"),
        ErrorKind::NotFound | ErrorKind::ValidationFailure => warn!("Exchange rejected: {e}"),
    }
    (e.status_code(), e.to_string())
}
