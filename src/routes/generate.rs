use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;
use crate::chat::prompt::{freeform_system_prompt, sanitize_history};
use crate::completion::{ChatModel, CompletionError, CompletionRequest};
use crate::drafting::DraftError;
use crate::models::api::{
    DraftRequest, EmbeddingRequest, EmbeddingResponse, GenerateResponseRequest, GenerateResponseResponse,
};
use crate::models::scenario::ScenarioDraft;

const FREEFORM_FALLBACK_REPLY: &str = "I'm not sure how to respond to that.";
const FREEFORM_MAX_TOKENS: u32 = 1024;
const FREEFORM_TEMPERATURE: f64 = 0.7;

/// Stateless generation routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/generate-response", post(generate_response))
        .route("/api/generate-embedding", post(generate_embedding))
        .route("/api/scenario-drafts", post(draft_scenario))
}

/// POST /api/generate-response - In-character reply without persistence.
async fn generate_response(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateResponseRequest>,
) -> Result<Json<GenerateResponseResponse>, (StatusCode, String)> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Prompt is required".to_string()));
    }

    let system_prompt = freeform_system_prompt(req.character.as_ref(), req.scenario.as_ref());
    let mut request = CompletionRequest::new(system_prompt, prompt, ChatModel::Llama3_70b);
    request.history = sanitize_history(req.history);
    request.max_tokens = Some(FREEFORM_MAX_TOKENS);
    request.temperature = Some(FREEFORM_TEMPERATURE);

    let response = match state.completion_model.complete(&request).await {
        Ok(text) => text,
        Err(CompletionError::MissingContent) => FREEFORM_FALLBACK_REPLY.to_string(),
        Err(e) => {
            error!("Error generating AI response: {e}");
            return Err((StatusCode::BAD_GATEWAY, "Failed to generate response".to_string()));
        }
    };

    Ok(Json(GenerateResponseResponse { response }))
}

/// POST /api/generate-embedding
async fn generate_embedding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, (StatusCode, String)> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is required".to_string()));
    }

    let embedding = state.embedding_model.embed(&req.text).await.map_err(|e| {
        error!("Error generating embedding: {e}");
        (StatusCode::BAD_GATEWAY, "Failed to generate embedding".to_string())
    })?;

    Ok(Json(EmbeddingResponse { embedding }))
}

/// POST /api/scenario-drafts - Draft a scenario from a plot idea or refine one.
async fn draft_scenario(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<ScenarioDraft>, (StatusCode, String)> {
    let draft = state.drafter.draft(req).await.map_err(|e| {
        error!("Scenario drafting failed: {e}");
        match e {
            DraftError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            DraftError::Unparsable { raw, .. } => (
                StatusCode::BAD_GATEWAY,
                format!("Failed to parse AI response into valid JSON. Raw response: {raw}"),
            ),
            other => (StatusCode::BAD_GATEWAY, other.to_string()),
        }
    })?;

    info!("Returning drafted scenario '{}'", draft.title);
    Ok(Json(draft))
}
