use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use super::exchange_error;
use crate::app::AppState;
use crate::completion::ChatModel;
use crate::models::api::{
    HistoryMessage, HistoryQuery, SendMessageRequest, SendMessageResponse, SimilarRequest, SimilarResponse,
};

/// Chat routes for a scenario.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/scenarios/{scenario_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/scenarios/{scenario_id}/messages/similar", post(similar_messages))
}

/// POST /api/scenarios/{scenario_id}/messages - Player message, one reply per AI character.
async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, (StatusCode, String)> {
    let model = ChatModel::resolve(req.selected_model.as_deref());
    info!("Message for scenario {scenario_id} using model {}", model.as_str());

    let cancel = state.shutdown.child_token();
    let result = state
        .chat
        .send_message(&scenario_id, &req.message, model, &cancel)
        .await
        .map_err(exchange_error)?;

    Ok(Json(result.into()))
}

/// GET /api/scenarios/{scenario_id}/messages - Stored conversation, oldest first.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryMessage>>, (StatusCode, String)> {
    let cancel = state.shutdown.child_token();
    let messages = state
        .chat
        .conversation(&scenario_id, params.limit, &cancel)
        .await
        .map_err(exchange_error)?;

    Ok(Json(messages))
}

/// POST /api/scenarios/{scenario_id}/messages/similar
async fn similar_messages(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
    Json(req): Json<SimilarRequest>,
) -> Result<Json<SimilarResponse>, (StatusCode, String)> {
    let cancel = state.shutdown.child_token();
    let results = state
        .chat
        .similar_turns(&scenario_id, &req.query, req.k, &cancel)
        .await
        .map_err(exchange_error)?;

    Ok(Json(SimilarResponse { results }))
}
