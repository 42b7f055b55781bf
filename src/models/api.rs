use serde::{Deserialize, Serialize};

use super::scenario::ScenarioDraft;
use super::turn::ScoredTurn;
use crate::completion::Message;
use crate::lifecycle::DeleteOutcome;

// ──────────────────────────── Scenarios ────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScenarioResponse {
    pub scenario_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListScenariosQuery {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_list_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteScenarioResponse {
    pub message: String,
    pub outcome: DeleteOutcome,
    pub document_deleted: bool,
    pub collection_dropped: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial_success: bool,
}

// ──────────────────────────── Chat ────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub selected_model: Option<String>,
}

/// Outcome of one AI character within an exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterReply {
    pub reply: String,
    pub character_name: String,
    pub character_id: String,
    pub message_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub replies: Vec<CharacterReply>,
    pub user_message_id: String,
    pub ai_message_ids: Vec<String>,
    pub timestamp: i64,
    pub turn_number: i64,
    pub character_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A stored turn shaped for the chat view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: String,
    pub text: String,
    /// `user` for the player, `bot` for AI characters.
    pub sender: &'static str,
    pub timestamp: i64,
    pub character_id: String,
    pub character_name: String,
    pub message_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SimilarRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub results: Vec<ScoredTurn>,
}

// ──────────────────────────── Generation ────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PromptCharacter {
    pub name: Option<String>,
    pub personality: Option<String>,
    pub background: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PromptScenario {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponseRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub character: Option<PromptCharacter>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub scenario: Option<PromptScenario>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponseResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// Either a fresh plot idea, or an existing draft plus refinement instructions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftRequest {
    pub plot_idea: Option<String>,
    pub scenario: Option<ScenarioDraft>,
    pub instructions: Option<String>,
}

// ──────────────────────────── Uploads / health ────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
}
