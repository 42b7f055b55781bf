use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;

use super::ScenarioStore;
use crate::models::scenario::{Character, NewScenario, Scenario, Scene, ScenarioSummary};

/// PostgreSQL document store for scenarios.
pub struct PostgresScenarioStore {
    pool: PgPool,
}

impl PostgresScenarioStore {
    pub async fn new(uri: &str, pool_size: u32) -> anyhow::Result<Self> {
        let clean_uri = uri.replace("postgresql+asyncpg://", "postgresql://");
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(&clean_uri)
            .await?;

        info!("Connected to PostgreSQL (pool_size={pool_size})");
        Ok(Self { pool })
    }
}

fn timestamp(row: &PgRow, column: &str) -> Option<String> {
    row.get::<Option<chrono::DateTime<chrono::Utc>>, _>(column)
        .map(|dt| dt.to_rfc3339())
}

fn scenario_from_row(row: &PgRow) -> Scenario {
    Scenario {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        venue: row.get("venue"),
        current_fictional_date_time: row.get("current_fictional_datetime"),
        fictional_total_time_elapsed_seconds: row.get("fictional_total_time_elapsed_seconds"),
        characters: row.get::<Json<Vec<Character>>, _>("characters").0,
        scenes: row.get::<Json<Vec<Scene>>, _>("scenes").0,
        created_at: timestamp(row, "created_at"),
        updated_at: timestamp(row, "updated_at"),
    }
}

#[async_trait]
impl ScenarioStore for PostgresScenarioStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scenarios (
                id VARCHAR(64) PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                venue TEXT NOT NULL DEFAULT '',
                current_fictional_datetime VARCHAR(64) NOT NULL DEFAULT '',
                fictional_total_time_elapsed_seconds BIGINT NOT NULL DEFAULT 0,
                characters JSONB NOT NULL DEFAULT '[]',
                scenes JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scenarios_created_at ON scenarios(created_at)")
            .execute(&self.pool)
            .await?;

        info!("Scenario tables initialized");
        Ok(())
    }

    async fn create_scenario(&self, scenario: &NewScenario) -> anyhow::Result<String> {
        let scenario_id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO scenarios (id, title, description, venue, current_fictional_datetime,
                                    fictional_total_time_elapsed_seconds, characters, scenes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&scenario_id)
        .bind(&scenario.title)
        .bind(&scenario.description)
        .bind(&scenario.venue)
        .bind(&scenario.current_fictional_date_time)
        .bind(scenario.fictional_total_time_elapsed_seconds)
        .bind(Json(&scenario.characters))
        .bind(Json(&scenario.scenes))
        .execute(&self.pool)
        .await?;

        info!("Created scenario {scenario_id} ({})", scenario.title);
        Ok(scenario_id)
    }

    async fn get_scenario(&self, scenario_id: &str) -> anyhow::Result<Option<Scenario>> {
        let row = sqlx::query(
            "SELECT id, title, description, venue, current_fictional_datetime,
                    fictional_total_time_elapsed_seconds, characters, scenes, created_at, updated_at
             FROM scenarios
             WHERE id = $1",
        )
        .bind(scenario_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(scenario_from_row))
    }

    async fn list_scenarios(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<ScenarioSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, description, venue, current_fictional_datetime,
                    fictional_total_time_elapsed_seconds, characters, scenes, created_at, updated_at
             FROM scenarios
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| scenario_from_row(r).summary()).collect())
    }

    async fn delete_scenario(&self, scenario_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM scenarios WHERE id = $1")
            .bind(scenario_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Scenario store connection pool closed");
    }
}
