use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;
use crate::lifecycle;
use crate::models::api::{CreateScenarioResponse, DeleteScenarioResponse, ListScenariosQuery};
use crate::models::scenario::{Scenario, ScenarioSummary};

/// Scenario management routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/scenarios", get(list_scenarios).post(create_scenario))
        .route("/api/scenarios/{scenario_id}", get(get_scenario).delete(delete_scenario))
}

/// POST /api/scenarios - Create a scenario and its message storage.
async fn create_scenario(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Result<(StatusCode, Json<CreateScenarioResponse>), (StatusCode, String)> {
    let scenario_id = lifecycle::create_scenario(
        state.scenario_store.as_ref(),
        state.turn_store.as_ref(),
        raw,
        state.embedding_model.dimensions(),
    )
    .await
    .map_err(|e| {
        error!("Scenario creation failed: {e}");
        (e.status_code(), e.to_string())
    })?;

    info!("Created scenario {scenario_id}");
    Ok((StatusCode::CREATED, Json(CreateScenarioResponse { scenario_id })))
}

/// GET /api/scenarios - List scenarios, newest first.
async fn list_scenarios(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListScenariosQuery>,
) -> Result<Json<Vec<ScenarioSummary>>, (StatusCode, String)> {
    let scenarios = state
        .scenario_store
        .list_scenarios(params.limit.clamp(1, 200), params.offset.max(0))
        .await
        .map_err(|e| {
            error!("Database error: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}"))
        })?;

    Ok(Json(scenarios))
}

/// GET /api/scenarios/{scenario_id}
async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
) -> Result<Json<Scenario>, (StatusCode, String)> {
    let scenario = state
        .scenario_store
        .get_scenario(&scenario_id)
        .await
        .map_err(|e| {
            error!("Database error: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}"))
        })?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Scenario {scenario_id} not found")))?;

    Ok(Json(scenario))
}

/// DELETE /api/scenarios/{scenario_id} - 200 when fully deleted, 207 when
/// only the document went away, 500 otherwise.
async fn delete_scenario(
    State(state): State<Arc<AppState>>,
    Path(scenario_id): Path<String>,
) -> (StatusCode, Json<DeleteScenarioResponse>) {
    let report = lifecycle::delete_scenario(
        state.scenario_store.as_ref(),
        state.turn_store.as_ref(),
        &scenario_id,
    )
    .await;

    (
        report.outcome.status_code(),
        Json(DeleteScenarioResponse {
            message: report.message,
            outcome: report.outcome,
            document_deleted: report.document_deleted,
            collection_dropped: report.collection_dropped,
            partial_success: report.outcome == lifecycle::DeleteOutcome::PartiallyDeleted,
        }),
    )
}
