pub mod prompt;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::completion::{ChatModel, CompletionError, CompletionModel, CompletionRequest};
use crate::database::ScenarioStore;
use crate::embedding::{EmbeddingError, EmbeddingModel};
use crate::models::api::{CharacterReply, HistoryMessage, SendMessageResponse};
use crate::models::scenario::{Character, Scenario};
use crate::models::turn::{
    generate_message_id, ScoredTurn, Turn, MAX_DIALOGUE_TARGETS, MAX_PRESENT_CHARACTERS,
};
use crate::vector_store::{TurnStore, TurnStoreError};

/// Sender id used for player turns when the scenario has no player character.
pub const DEFAULT_PLAYER_ID: &str = "player";
const DEFAULT_AI_ID: &str = "ai";
const UNKNOWN_VENUE: &str = "Unknown Venue";
const UNKNOWN_LOCATION: &str = "Unknown Location";
const MESSAGE_TYPE_DIALOGUE: &str = "dialogue";
const MAX_VENUE_LEN: usize = 256;
const MAX_DATETIME_LEN: usize = 35;
const MAX_SIMILAR_RESULTS: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// Error taxonomy surfaced to callers of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    UpstreamFailure,
    ValidationFailure,
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Scenario {0} not found")]
    ScenarioNotFound(String),
    #[error("No AI characters found in scenario {0}")]
    NoAiCharacters(String),
    #[error("{0}")]
    Validation(String),
    #[error("Embedding failed: {0}")]
    Embedding(#[source] EmbeddingError),
    #[error("Completion failed: {0}")]
    Completion(#[source] CompletionError),
    #[error("Failed to store turn: {0}")]
    StoreWrite(#[source] TurnStoreError),
    #[error("Failed to read turns: {0}")]
    StoreRead(#[source] TurnStoreError),
    #[error("Scenario store error: {0}")]
    DocumentStore(String),
    #[error("Exchange cancelled")]
    Cancelled,
    #[error("{operation} timed out")]
    TimedOut { operation: &'static str },
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::ScenarioNotFound(_) => ErrorKind::NotFound,
            ExchangeError::StoreRead(TurnStoreError::CollectionMissing(_)) => ErrorKind::NotFound,
            ExchangeError::NoAiCharacters(_) | ExchangeError::Validation(_) => ErrorKind::ValidationFailure,
            ExchangeError::StoreRead(TurnStoreError::InvalidScenarioId(_))
            | ExchangeError::StoreWrite(TurnStoreError::InvalidScenarioId(_)) => ErrorKind::ValidationFailure,
            _ => ErrorKind::UpstreamFailure,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match (self, self.kind()) {
            (ExchangeError::Cancelled, _) => StatusCode::SERVICE_UNAVAILABLE,
            (ExchangeError::TimedOut { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
            (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
            (_, ErrorKind::ValidationFailure) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::UpstreamFailure) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Tunables for one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    pub context_window: usize,
    pub history_limit: usize,
    pub reply_max_tokens: u32,
    pub reply_temperature: f64,
    pub upstream_timeout: Duration,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            context_window: 10,
            history_limit: 50,
            reply_max_tokens: 150,
            reply_temperature: 0.75,
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a completed exchange.
#[derive(Debug)]
pub struct ExchangeResult {
    pub user_message_id: String,
    pub user_timestamp: i64,
    pub turn_number: i64,
    /// One entry per AI character, in character-list order.
    pub replies: Vec<CharacterReply>,
}

impl From<ExchangeResult> for SendMessageResponse {
    fn from(result: ExchangeResult) -> Self {
        let ai_message_ids = result
            .replies
            .iter()
            .filter(|r| !r.error)
            .map(|r| r.message_id.clone())
            .collect();
        SendMessageResponse {
            success: true,
            character_count: result.replies.len(),
            replies: result.replies,
            user_message_id: result.user_message_id,
            ai_message_ids,
            timestamp: result.user_timestamp,
            turn_number: result.turn_number,
        }
    }
}

/// Per-character result of the generation fold.
enum CharacterOutcome {
    Replied { turn: Turn },
    Failed { error: String },
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn clip(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Turn orchestration over the scenario and turn stores and the model clients.
#[derive(Clone)]
pub struct ChatService {
    scenarios: Arc<dyn ScenarioStore>,
    turns: Arc<dyn TurnStore>,
    embedder: Arc<dyn EmbeddingModel>,
    completer: Arc<dyn CompletionModel>,
    options: ExchangeOptions,
}

/// Scenario-level values copied onto every turn of an exchange.
struct TurnTemplate {
    scenario_id: String,
    turn_number: i64,
    venue_name: String,
    fictional_datetime_iso: String,
    fictional_total_time_elapsed_seconds: i64,
    player_id: String,
    present: Vec<String>,
}

impl TurnTemplate {
    fn new(scenario: &Scenario, turn_number: i64) -> Self {
        let cast = scenario.cast();
        let player_id = cast
            .player
            .map(|c| c.id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_PLAYER_ID.to_string());

        let mut present = vec![player_id.clone()];
        present.extend(cast.ai.iter().map(|c| c.id.clone()).filter(|id| !id.is_empty()));
        present.truncate(MAX_PRESENT_CHARACTERS);

        let venue = if scenario.venue.trim().is_empty() {
            UNKNOWN_VENUE
        } else {
            scenario.venue.as_str()
        };
        let fictional_datetime_iso = if scenario.current_fictional_date_time.trim().is_empty() {
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        } else {
            clip(&scenario.current_fictional_date_time, MAX_DATETIME_LEN)
        };

        Self {
            scenario_id: scenario.id.clone(),
            turn_number,
            venue_name: clip(venue, MAX_VENUE_LEN),
            fictional_datetime_iso,
            fictional_total_time_elapsed_seconds: scenario.fictional_total_time_elapsed_seconds,
            player_id,
            present,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        message_id: String,
        sender_character_id: String,
        sender_is_player: bool,
        content: String,
        timestamp: i64,
        dialogue_target_ids: Vec<String>,
        references: Vec<String>,
        embedding: Vec<f32>,
    ) -> Turn {
        Turn {
            message_id,
            scenario_id: self.scenario_id.clone(),
            turn_number: self.turn_number,
            real_timestamp_utc_ms: timestamp,
            sender_character_id,
            sender_is_player,
            venue_name: self.venue_name.clone(),
            sub_location_in_venue: UNKNOWN_LOCATION.to_string(),
            present_character_ids_at_location: self.present.clone(),
            fictional_datetime_iso: self.fictional_datetime_iso.clone(),
            fictional_total_time_elapsed_seconds: self.fictional_total_time_elapsed_seconds,
            message_content_text: content,
            message_type: MESSAGE_TYPE_DIALOGUE.to_string(),
            action_details: String::new(),
            dialogue_target_ids,
            mentioned_character_ids_in_content: Vec::new(),
            key_topics_or_entities: Vec::new(),
            sender_expressed_emotion: String::new(),
            references_previous_message_ids: references,
            plot_relevance_score: 0.0,
            message_embedding: embedding,
        }
    }
}

impl ChatService {
    pub fn new(
        scenarios: Arc<dyn ScenarioStore>,
        turns: Arc<dyn TurnStore>,
        embedder: Arc<dyn EmbeddingModel>,
        completer: Arc<dyn CompletionModel>,
        options: ExchangeOptions,
    ) -> Self {
        Self {
            scenarios,
            turns,
            embedder,
            completer,
            options,
        }
    }

    /// Race an upstream call against the exchange deadline and cancellation.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, ExchangeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExchangeError::Cancelled),
            res = tokio::time::timeout(self.options.upstream_timeout, fut) => {
                res.map_err(|_| ExchangeError::TimedOut { operation })
            }
        }
    }

    async fn load_scenario(&self, scenario_id: &str, cancel: &CancellationToken) -> Result<Scenario, ExchangeError> {
        self.guarded(cancel, "scenario load", self.scenarios.get_scenario(scenario_id))
            .await?
            .map_err(|e| ExchangeError::DocumentStore(e.to_string()))?
            .ok_or_else(|| ExchangeError::ScenarioNotFound(scenario_id.to_string()))
    }

    async fn ensure_collection(&self, scenario_id: &str, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let dimensions = self.embedder.dimensions();
        self.guarded(cancel, "collection ensure", self.turns.ensure_collection(scenario_id, dimensions))
            .await?
            .map_err(ExchangeError::StoreWrite)?;
        Ok(())
    }

    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, ExchangeError> {
        self.guarded(cancel, "embedding", self.embedder.embed(text))
            .await?
            .map_err(ExchangeError::Embedding)
    }

    /// Run one player message through every AI character of the scenario.
    pub async fn send_message(
        &self,
        scenario_id: &str,
        message: &str,
        model: ChatModel,
        cancel: &CancellationToken,
    ) -> Result<ExchangeResult, ExchangeError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ExchangeError::Validation("Message cannot be empty".to_string()));
        }

        let scenario = self.load_scenario(scenario_id, cancel).await?;
        info!("Scenario loaded: {}", scenario.title);

        let cast = scenario.cast();
        if cast.ai.is_empty() {
            warn!("No AI characters found in scenario {scenario_id}");
            return Err(ExchangeError::NoAiCharacters(scenario_id.to_string()));
        }
        info!("Found {} AI characters", cast.ai.len());

        // Reads before any write.
        self.ensure_collection(&scenario.id, cancel).await?;
        let history = match self
            .guarded(cancel, "history fetch", self.turns.history(&scenario.id, self.options.history_limit))
            .await
        {
            Ok(history) => history,
            Err(ExchangeError::Cancelled) => return Err(ExchangeError::Cancelled),
            Err(e) => {
                warn!("History unavailable for scenario {scenario_id}: {e}");
                Vec::new()
            }
        };
        let turn_number = match self
            .guarded(cancel, "turn number lookup", self.turns.next_turn_number(&scenario.id))
            .await
        {
            Ok(n) => n,
            Err(ExchangeError::Cancelled) => return Err(ExchangeError::Cancelled),
            Err(e) => {
                warn!("Turn number unavailable for scenario {scenario_id}: {e}");
                1
            }
        };

        let template = TurnTemplate::new(&scenario, turn_number);

        // User turn: any failure aborts before generation.
        let user_embedding = self.embed(message, cancel).await?;
        let user_message_id = generate_message_id();
        let user_timestamp = now_ms();
        let mut user_targets: Vec<String> = cast
            .ai
            .iter()
            .map(|c| c.id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        user_targets.truncate(MAX_DIALOGUE_TARGETS);
        let user_turn = template.build(
            user_message_id.clone(),
            template.player_id.clone(),
            true,
            message.to_string(),
            user_timestamp,
            user_targets,
            Vec::new(),
            user_embedding,
        );
        self.guarded(cancel, "user turn write", self.turns.insert(&user_turn))
            .await?
            .map_err(ExchangeError::StoreWrite)?;
        info!("Stored user message {user_message_id} (turn {turn_number})");

        let mut running_history = history;
        running_history.push(user_turn);

        let mut writes = JoinSet::new();
        let mut outcomes = Vec::with_capacity(cast.ai.len());
        let mut last_timestamp = user_timestamp;

        for (index, character) in cast.ai.iter().enumerate() {
            let outcome = match self
                .generate_reply(&scenario, character, &running_history, message, model, cancel)
                .await
            {
                Ok((content, embedding)) => {
                    let timestamp = now_ms().max(last_timestamp + 1);
                    last_timestamp = timestamp;
                    let sender = if character.id.is_empty() {
                        DEFAULT_AI_ID.to_string()
                    } else {
                        character.id.clone()
                    };
                    let turn = template.build(
                        generate_message_id(),
                        sender,
                        false,
                        content,
                        timestamp,
                        vec![template.player_id.clone()],
                        vec![user_message_id.clone()],
                        embedding,
                    );

                    let store = self.turns.clone();
                    let pending = turn.clone();
                    let timeout = self.options.upstream_timeout;
                    writes.spawn(async move {
                        let result = match tokio::time::timeout(timeout, store.insert(&pending)).await {
                            Ok(result) => result.map_err(|e| e.to_string()),
                            Err(_) => Err("turn write timed out".to_string()),
                        };
                        (index, result)
                    });

                    running_history.push(turn.clone());
                    CharacterOutcome::Replied { turn }
                }
                Err(e) => {
                    error!("Error processing AI character {}: {e}", character.name);
                    CharacterOutcome::Failed { error: e.to_string() }
                }
            };
            outcomes.push(outcome);
        }

        info!("Waiting for {} turn writes to settle", writes.len());
        let mut write_errors: Vec<Option<String>> = outcomes
            .iter()
            .map(|o| match o {
                CharacterOutcome::Replied { .. } => Some("turn write did not complete".to_string()),
                CharacterOutcome::Failed { .. } => None,
            })
            .collect();
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((index, Ok(()))) => write_errors[index] = None,
                Ok((index, Err(e))) => {
                    error!("Failed to store reply from AI character {index} in scenario {scenario_id}: {e}");
                    write_errors[index] = Some(e);
                }
                Err(e) => error!("Turn write task failed: {e}"),
            }
        }

        let replies = outcomes
            .into_iter()
            .zip(write_errors)
            .zip(cast.ai.iter())
            .map(|((outcome, write_error), character)| fold_reply(character, outcome, write_error))
            .collect::<Vec<_>>();

        info!(
            "Exchange complete for scenario {scenario_id}: {} replies, {} failed",
            replies.len(),
            replies.iter().filter(|r| r.error).count()
        );

        Ok(ExchangeResult {
            user_message_id,
            user_timestamp,
            turn_number,
            replies,
        })
    }

    /// Generate and embed one character's reply.
    async fn generate_reply(
        &self,
        scenario: &Scenario,
        character: &Character,
        history: &[Turn],
        message: &str,
        model: ChatModel,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<f32>), ExchangeError> {
        let conversation = prompt::context_window(scenario, history, self.options.context_window);
        let system_prompt = prompt::character_system_prompt(scenario, character, &conversation, message);

        let mut request = CompletionRequest::new(system_prompt, message, model);
        request.max_tokens = Some(self.options.reply_max_tokens);
        request.temperature = Some(self.options.reply_temperature);

        let reply = self
            .guarded(cancel, "completion", self.completer.complete(&request))
            .await?
            .map_err(ExchangeError::Completion)?;

        let embedding = self.embed(&reply, cancel).await?;
        Ok((reply, embedding))
    }

    /// Stored history of a scenario shaped for the chat view.
    ///
    /// Provisions the collection first, so opening a chat on a fresh
    /// scenario yields an empty list rather than an error.
    pub async fn conversation(
        &self,
        scenario_id: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<HistoryMessage>, ExchangeError> {
        let scenario = self.load_scenario(scenario_id, cancel).await?;
        self.ensure_collection(&scenario.id, cancel).await?;

        let limit = limit
            .unwrap_or(self.options.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);
        let history = self
            .guarded(cancel, "history fetch", self.turns.history(&scenario.id, limit))
            .await?;

        Ok(history
            .iter()
            .map(|turn| HistoryMessage {
                id: turn.message_id.clone(),
                text: turn.message_content_text.clone(),
                sender: if turn.sender_is_player { "user" } else { "bot" },
                timestamp: turn.real_timestamp_utc_ms,
                character_id: turn.sender_character_id.clone(),
                character_name: prompt::speaker_name(&scenario, turn).to_string(),
                message_type: turn.message_type.clone(),
            })
            .collect())
    }

    /// Nearest stored turns to `query`, best first.
    pub async fn similar_turns(
        &self,
        scenario_id: &str,
        query: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredTurn>, ExchangeError> {
        if query.trim().is_empty() {
            return Err(ExchangeError::Validation("Query cannot be empty".to_string()));
        }
        if k == 0 || k > MAX_SIMILAR_RESULTS {
            return Err(ExchangeError::Validation(format!(
                "k must be within 1..={MAX_SIMILAR_RESULTS}"
            )));
        }
        let scenario = self.load_scenario(scenario_id, cancel).await?;
        let vector = self.embed(query, cancel).await?;
        self.guarded(cancel, "similarity search", self.turns.similarity_search(&scenario.id, &vector, k))
            .await?
            .map_err(ExchangeError::StoreRead)
    }
}

/// Collapse a character's generation outcome and write result into its reply.
fn fold_reply(character: &Character, outcome: CharacterOutcome, write_error: Option<String>) -> CharacterReply {
    let character_name = if character.name.is_empty() {
        prompt::AI_FALLBACK_NAME.to_string()
    } else {
        character.name.clone()
    };
    match outcome {
        CharacterOutcome::Replied { turn } => CharacterReply {
            reply: turn.message_content_text,
            character_name,
            character_id: turn.sender_character_id,
            message_id: turn.message_id,
            timestamp: turn.real_timestamp_utc_ms,
            error: write_error.is_some(),
            error_message: write_error.map(|e| format!("Reply was generated but could not be stored: {e}")),
        },
        CharacterOutcome::Failed { error } => {
            let timestamp = now_ms();
            CharacterReply {
                reply: format!("Error: Could not generate response for {character_name}"),
                character_name,
                character_id: character.id.clone(),
                message_id: format!("error_{timestamp}"),
                timestamp,
                error: true,
                error_message: Some(error),
            }
        }
    }
}
