//! In-memory stand-ins for the external services, used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::chat::{ChatService, ExchangeOptions};
use crate::completion::{CompletionError, CompletionModel, CompletionRequest};
use crate::database::ScenarioStore;
use crate::embedding::{EmbeddingError, EmbeddingModel};
use crate::models::scenario::{Character, NewScenario, Scenario, ScenarioSummary};
use crate::models::turn::{ScoredTurn, Turn};
use crate::vector_store::{collection_name, TurnStore, TurnStoreError};

pub fn character(id: &str, name: &str, is_player: bool) -> Character {
    Character {
        id: id.to_string(),
        name: name.to_string(),
        is_player,
        description: format!("{name} from the harbor"),
        ..Default::default()
    }
}

/// A scenario without an id; the fake store assigns one on insert.
pub fn scenario_with(characters: Vec<Character>) -> Scenario {
    Scenario {
        id: String::new(),
        title: "Harbor at Dusk".to_string(),
        description: "A foggy harbor at dusk.".to_string(),
        venue: "Old Pier".to_string(),
        current_fictional_date_time: "2077-10-23T18:35:00Z".to_string(),
        fictional_total_time_elapsed_seconds: 0,
        characters,
        scenes: vec![],
        created_at: None,
        updated_at: None,
    }
}

fn unavailable() -> TurnStoreError {
    TurnStoreError::Database(sqlx::Error::PoolTimedOut)
}

// ──────────────────────────── Embedding ────────────────────────────

pub struct FakeEmbedding {
    dimensions: usize,
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl FakeEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Fail every embedding request for exactly this text.
    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Deterministic vector: equal texts embed identically.
pub fn fake_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let seed: u64 = text.bytes().map(u64::from).sum();
    (0..dimensions)
        .map(|i| ((seed * (i as u64 + 1)) % 97) as f32 / 97.0)
        .collect()
}

#[async_trait]
impl EmbeddingModel for FakeEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(text) {
            return Err(EmbeddingError::Api {
                status: 503,
                body: "embedding service unavailable".to_string(),
            });
        }
        Ok(fake_vector(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ──────────────────────────── Completion ────────────────────────────

#[derive(Default)]
pub struct FakeCompletion {
    scripted: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    failing: Mutex<Vec<String>>,
    stalling: Mutex<Vec<String>>,
}

impl FakeCompletion {
    /// Answer every request with `reply`.
    pub fn scripted(reply: &str) -> Self {
        Self {
            scripted: Some(reply.to_string()),
            ..Default::default()
        }
    }

    /// Fail requests whose system prompt contains `pattern`.
    pub fn fail_for(&self, pattern: &str) {
        self.failing.lock().unwrap().push(pattern.to_string());
    }

    /// Never answer requests whose system prompt contains `pattern`.
    pub fn stall_for(&self, pattern: &str) {
        self.stalling.lock().unwrap().push(pattern.to_string());
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// System prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.system_prompt).collect()
    }

    fn matches(list: &Mutex<Vec<String>>, prompt: &str) -> bool {
        list.lock().unwrap().iter().any(|p| prompt.contains(p.as_str()))
    }
}

#[async_trait]
impl CompletionModel for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if Self::matches(&self.failing, &request.system_prompt) {
            return Err(CompletionError::Api {
                status: 500,
                body: "model overloaded".to_string(),
            });
        }
        if Self::matches(&self.stalling, &request.system_prompt) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self
            .scripted
            .clone()
            .unwrap_or_else(|| format!("(*looks up*) (\"Reply number {n}.\")")))
    }
}

// ──────────────────────────── Scenario store ────────────────────────────

#[derive(Default)]
pub struct FakeScenarioStore {
    scenarios: Mutex<HashMap<String, Scenario>>,
    fail_deletes: AtomicBool,
}

impl FakeScenarioStore {
    /// Store a scenario as-is, assigning an id when it has none.
    pub async fn insert(&self, mut scenario: Scenario) -> String {
        if scenario.id.is_empty() {
            scenario.id = uuid::Uuid::new_v4().to_string();
        }
        let id = scenario.id.clone();
        self.scenarios.lock().unwrap().insert(id.clone(), scenario);
        id
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ScenarioStore for FakeScenarioStore {
    async fn create_scenario(&self, scenario: &NewScenario) -> anyhow::Result<String> {
        let now = chrono::Utc::now().to_rfc3339();
        let stored = Scenario {
            id: String::new(),
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            venue: scenario.venue.clone(),
            current_fictional_date_time: scenario.current_fictional_date_time.clone(),
            fictional_total_time_elapsed_seconds: scenario.fictional_total_time_elapsed_seconds,
            characters: scenario.characters.clone(),
            scenes: scenario.scenes.clone(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        Ok(self.insert(stored).await)
    }

    async fn get_scenario(&self, scenario_id: &str) -> anyhow::Result<Option<Scenario>> {
        Ok(self.scenarios.lock().unwrap().get(scenario_id).cloned())
    }

    async fn list_scenarios(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<ScenarioSummary>> {
        let scenarios = self.scenarios.lock().unwrap();
        Ok(scenarios
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(Scenario::summary)
            .collect())
    }

    async fn delete_scenario(&self, scenario_id: &str) -> anyhow::Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("document store unavailable");
        }
        Ok(self.scenarios.lock().unwrap().remove(scenario_id).is_some())
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

// ──────────────────────────── Turn store ────────────────────────────

pub struct FakeTurnStore {
    dimensions: usize,
    collections: Mutex<HashMap<String, Vec<Turn>>>,
    fail_ensure: AtomicBool,
    fail_drop: AtomicBool,
    fail_reads: AtomicBool,
    failing_senders: Mutex<HashSet<String>>,
}

impl FakeTurnStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            collections: Mutex::new(HashMap::new()),
            fail_ensure: AtomicBool::new(false),
            fail_drop: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            failing_senders: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_ensure(&self) {
        self.fail_ensure.store(true, Ordering::SeqCst);
    }

    pub fn fail_drop(&self) {
        self.fail_drop.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Reject inserts of turns sent by this character id.
    pub fn fail_inserts_from(&self, sender_character_id: &str) {
        self.failing_senders
            .lock()
            .unwrap()
            .insert(sender_character_id.to_string());
    }

    pub fn has_collection(&self, scenario_id: &str) -> bool {
        collection_name(scenario_id)
            .map(|name| self.collections.lock().unwrap().contains_key(&name))
            .unwrap_or(false)
    }

    /// Stored turns in insertion order.
    pub fn stored(&self, scenario_id: &str) -> Vec<Turn> {
        collection_name(scenario_id)
            .ok()
            .and_then(|name| self.collections.lock().unwrap().get(&name).cloned())
            .unwrap_or_default()
    }
}

fn l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[async_trait]
impl TurnStore for FakeTurnStore {
    async fn initialize(&self) -> Result<(), TurnStoreError> {
        Ok(())
    }

    async fn ensure_collection(&self, scenario_id: &str, dimensions: usize) -> Result<String, TurnStoreError> {
        let name = collection_name(scenario_id)?;
        if self.fail_ensure.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if dimensions != self.dimensions {
            return Err(TurnStoreError::DimensionMismatch {
                collection: name,
                expected: dimensions,
                actual: self.dimensions,
            });
        }
        self.collections.lock().unwrap().entry(name.clone()).or_default();
        Ok(name)
    }

    async fn insert(&self, turn: &Turn) -> Result<(), TurnStoreError> {
        let name = collection_name(&turn.scenario_id)?;
        if self.failing_senders.lock().unwrap().contains(&turn.sender_character_id) {
            return Err(unavailable());
        }
        turn.validate(self.dimensions).map_err(TurnStoreError::InvalidTurn)?;

        let mut collections = self.collections.lock().unwrap();
        let turns = collections
            .get_mut(&name)
            .ok_or_else(|| TurnStoreError::CollectionMissing(name.clone()))?;
        if turns.iter().any(|t| t.message_id == turn.message_id) {
            return Err(TurnStoreError::InvalidTurn(format!("duplicate message_id {}", turn.message_id)));
        }
        turns.push(turn.clone());
        Ok(())
    }

    async fn fetch_turns(&self, scenario_id: &str, limit: usize) -> Result<Vec<Turn>, TurnStoreError> {
        let name = collection_name(scenario_id)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let collections = self.collections.lock().unwrap();
        let mut turns = collections
            .get(&name)
            .cloned()
            .ok_or(TurnStoreError::CollectionMissing(name))?;
        // Newest first, like the SQL store.
        turns.sort_by_key(|t| std::cmp::Reverse(t.real_timestamp_utc_ms));
        turns.truncate(limit);
        Ok(turns)
    }

    async fn fetch_turn_numbers(&self, scenario_id: &str) -> Result<Vec<i64>, TurnStoreError> {
        let name = collection_name(scenario_id)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let collections = self.collections.lock().unwrap();
        let turns = collections
            .get(&name)
            .ok_or(TurnStoreError::CollectionMissing(name.clone()))?;
        Ok(turns.iter().map(|t| t.turn_number).collect())
    }

    async fn similarity_search(
        &self,
        scenario_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredTurn>, TurnStoreError> {
        let name = collection_name(scenario_id)?;
        let collections = self.collections.lock().unwrap();
        let turns = collections
            .get(&name)
            .ok_or(TurnStoreError::CollectionMissing(name.clone()))?;
        let mut scored: Vec<ScoredTurn> = turns
            .iter()
            .map(|t| ScoredTurn {
                distance: l2(&t.message_embedding, query),
                turn: t.clone(),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn drop_collection(&self, scenario_id: &str) -> Result<bool, TurnStoreError> {
        let name = collection_name(scenario_id)?;
        if self.fail_drop.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.collections.lock().unwrap().remove(&name).is_some())
    }

    async fn close(&self) {}
}

// ──────────────────────────── Bundle ────────────────────────────

/// One of each fake, wired the way the application wires the real services.
pub struct Fakes {
    pub scenarios: Arc<FakeScenarioStore>,
    pub turns: Arc<FakeTurnStore>,
    pub embedding: Arc<FakeEmbedding>,
    pub completion: Arc<FakeCompletion>,
}

impl Fakes {
    pub fn new(dimensions: usize) -> Self {
        Self {
            scenarios: Arc::new(FakeScenarioStore::default()),
            turns: Arc::new(FakeTurnStore::new(dimensions)),
            embedding: Arc::new(FakeEmbedding::new(dimensions)),
            completion: Arc::new(FakeCompletion::default()),
        }
    }

    pub async fn add_scenario(&self, scenario: Scenario) -> String {
        self.scenarios.insert(scenario).await
    }

    pub fn chat(&self, options: ExchangeOptions) -> ChatService {
        ChatService::new(
            self.scenarios.clone(),
            self.turns.clone(),
            self.embedding.clone(),
            self.completion.clone(),
            options,
        )
    }
}
