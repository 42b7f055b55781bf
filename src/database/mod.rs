pub mod postgres;

use async_trait::async_trait;

use crate::models::scenario::{NewScenario, Scenario, ScenarioSummary};

/// Abstract document store for scenario records.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    /// Persist a canonicalized scenario and return its generated id.
    async fn create_scenario(&self, scenario: &NewScenario) -> anyhow::Result<String>;

    /// Get a scenario by id.
    async fn get_scenario(&self, scenario_id: &str) -> anyhow::Result<Option<Scenario>>;

    /// List scenarios, newest first.
    async fn list_scenarios(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<ScenarioSummary>>;

    /// Delete a scenario. Returns whether a record was removed.
    async fn delete_scenario(&self, scenario_id: &str) -> anyhow::Result<bool>;

    /// Initialize database tables.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Release connections.
    async fn close(&self);
}
