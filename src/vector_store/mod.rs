pub mod pgvector;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::turn::{ScoredTurn, Turn};

/// Prefix of every per-scenario turn collection.
pub const COLLECTION_PREFIX: &str = "scenario_messages_";

#[derive(Debug, Error)]
pub enum TurnStoreError {
    #[error("Scenario id '{0}' cannot name a turn collection")]
    InvalidScenarioId(String),
    #[error("Turn collection {0} does not exist")]
    CollectionMissing(String),
    #[error("Turn collection {collection} stores {actual}-dim vectors, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },
    #[error("Turn rejected by collection schema: {0}")]
    InvalidTurn(String),
    #[error("Vector store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-scenario storage of chat turns and their embeddings.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Prepare the backing store (extensions etc.).
    async fn initialize(&self) -> Result<(), TurnStoreError>;

    /// Create the scenario's collection with the turn schema and similarity
    /// index if missing, then confirm it is queryable. Idempotent.
    async fn ensure_collection(&self, scenario_id: &str, dimensions: usize) -> Result<String, TurnStoreError>;

    /// Persist one turn into its scenario's collection.
    async fn insert(&self, turn: &Turn) -> Result<(), TurnStoreError>;

    /// Fetch up to `limit` of the most recent turns, in no particular order.
    async fn fetch_turns(&self, scenario_id: &str, limit: usize) -> Result<Vec<Turn>, TurnStoreError>;

    /// Fetch the turn numbers present in the collection.
    async fn fetch_turn_numbers(&self, scenario_id: &str) -> Result<Vec<i64>, TurnStoreError>;

    /// Return the `k` turns closest to `query`, best first.
    async fn similarity_search(
        &self,
        scenario_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredTurn>, TurnStoreError>;

    /// Drop the scenario's collection. Returns whether it existed.
    async fn drop_collection(&self, scenario_id: &str) -> Result<bool, TurnStoreError>;

    /// Release connections.
    async fn close(&self);

    /// Conversation history ascending by wall-clock timestamp.
    ///
    /// Query failures are logged and yield an empty history.
    async fn history(&self, scenario_id: &str, limit: usize) -> Vec<Turn> {
        match self.fetch_turns(scenario_id, limit).await {
            Ok(turns) => {
                info!("Fetched {} turns for scenario {scenario_id}", turns.len());
                sort_chronologically(turns)
            }
            Err(e) => {
                warn!("History query failed for scenario {scenario_id}: {e}");
                Vec::new()
            }
        }
    }

    /// Next turn number for the scenario; `1` when empty or on query failure.
    async fn next_turn_number(&self, scenario_id: &str) -> i64 {
        match self.fetch_turn_numbers(scenario_id).await {
            Ok(numbers) => {
                let next = next_turn_after(&numbers);
                info!("Next turn number for scenario {scenario_id} is {next}");
                next
            }
            Err(e) => {
                warn!("Turn number query failed for scenario {scenario_id}: {e}");
                1
            }
        }
    }
}

/// Derive the collection name for a scenario.
///
/// Ids are lower-cased and `-` becomes `_`; anything outside `[a-z0-9_]`
/// is rejected so the name can be used as an SQL identifier.
pub fn collection_name(scenario_id: &str) -> Result<String, TurnStoreError> {
    let normalized = scenario_id.trim().to_ascii_lowercase().replace('-', "_");
    let valid = !normalized.is_empty()
        && normalized.len() + COLLECTION_PREFIX.len() <= 63
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(TurnStoreError::InvalidScenarioId(scenario_id.to_string()));
    }
    Ok(format!("{COLLECTION_PREFIX}{normalized}"))
}

/// Stable ascending sort by `real_timestamp_utc_ms`.
pub fn sort_chronologically(mut turns: Vec<Turn>) -> Vec<Turn> {
    turns.sort_by_key(|t| t.real_timestamp_utc_ms);
    turns
}

/// `max(existing, 0) + 1`.
pub fn next_turn_after(existing: &[i64]) -> i64 {
    existing.iter().copied().fold(0, i64::max) + 1
}
