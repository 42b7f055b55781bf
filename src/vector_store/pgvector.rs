use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::schema::{insert_sql, provisioning_sql, select_columns, vector_literal, COLLECTION_EXISTS_SQL};
use super::{collection_name, TurnStore, TurnStoreError};
use crate::models::turn::{ScoredTurn, Turn};

/// PostgreSQL + pgvector backed turn store: one table per scenario.
pub struct PgVectorTurnStore {
    pool: PgPool,
    dimensions: usize,
    hnsw_m: u32,
    hnsw_ef_construction: u32,
    ef_search: u32,
}

impl PgVectorTurnStore {
    pub async fn new(
        uri: &str,
        pool_size: u32,
        dimensions: usize,
        hnsw_m: u32,
        hnsw_ef_construction: u32,
        ef_search: u32,
    ) -> anyhow::Result<Self> {
        let clean_uri = uri.replace("postgresql+asyncpg://", "postgresql://");
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&clean_uri)
            .await?;

        info!("Created turn store connection pool (size={pool_size})");

        Ok(Self {
            pool,
            dimensions,
            hnsw_m,
            hnsw_ef_construction,
            ef_search,
        })
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, TurnStoreError> {
        let exists: bool = sqlx::query_scalar(COLLECTION_EXISTS_SQL)
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Confirm the collection is queryable and holds vectors of the expected size.
    async fn check_loaded(&self, collection: &str, dimensions: usize) -> Result<(), TurnStoreError> {
        let typmod: Option<i32> = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute
             WHERE attrelid = to_regclass($1) AND attname = 'message_embedding' AND NOT attisdropped",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await?;

        let actual = typmod.ok_or_else(|| TurnStoreError::CollectionMissing(collection.to_string()))?;
        if actual as usize != dimensions {
            return Err(TurnStoreError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dimensions,
                actual: actual.max(0) as usize,
            });
        }
        Ok(())
    }
}

/// Concurrent `CREATE ... IF NOT EXISTS` can still lose a catalog race.
fn is_already_exists(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|e| e.code()).as_deref(),
        Some("42P07") | Some("23505") | Some("42710")
    )
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    err.as_database_error().and_then(|e| e.code()).as_deref() == Some("42P01")
}

fn map_missing(err: sqlx::Error, collection: &str) -> TurnStoreError {
    if is_undefined_table(&err) {
        TurnStoreError::CollectionMissing(collection.to_string())
    } else {
        TurnStoreError::Database(err)
    }
}

fn turn_from_row(row: &PgRow) -> Result<Turn, sqlx::Error> {
    Ok(Turn {
        message_id: row.try_get("message_id")?,
        scenario_id: row.try_get("scenario_id")?,
        turn_number: row.try_get("turn_number")?,
        real_timestamp_utc_ms: row.try_get("real_timestamp_utc_ms")?,
        sender_character_id: row.try_get("sender_character_id")?,
        sender_is_player: row.try_get("sender_is_player")?,
        venue_name: row.try_get("venue_name")?,
        sub_location_in_venue: row.try_get("sub_location_in_venue")?,
        present_character_ids_at_location: row
            .try_get::<Json<Vec<String>>, _>("present_character_ids_at_location")?
            .0,
        fictional_datetime_iso: row.try_get("fictional_datetime_iso")?,
        fictional_total_time_elapsed_seconds: row.try_get("fictional_total_time_elapsed_seconds")?,
        message_content_text: row.try_get("message_content_text")?,
        message_type: row.try_get("message_type")?,
        action_details: row.try_get("action_details")?,
        dialogue_target_ids: row.try_get::<Json<Vec<String>>, _>("dialogue_target_ids")?.0,
        mentioned_character_ids_in_content: row
            .try_get::<Json<Vec<String>>, _>("mentioned_character_ids_in_content")?
            .0,
        key_topics_or_entities: row.try_get::<Json<Vec<String>>, _>("key_topics_or_entities")?.0,
        sender_expressed_emotion: row.try_get("sender_expressed_emotion")?,
        references_previous_message_ids: row
            .try_get::<Json<Vec<String>>, _>("references_previous_message_ids")?
            .0,
        plot_relevance_score: row.try_get("plot_relevance_score")?,
        message_embedding: vec![],
    })
}

#[async_trait]
impl TurnStore for PgVectorTurnStore {
    async fn initialize(&self) -> Result<(), TurnStoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        info!("Enabled pgvector extension");
        Ok(())
    }

    async fn ensure_collection(&self, scenario_id: &str, dimensions: usize) -> Result<String, TurnStoreError> {
        let collection = collection_name(scenario_id)?;

        let table_exists = self.collection_exists(&collection).await?;
        if table_exists {
            debug!("Collection {collection} already exists, checking it is loaded");
        } else {
            info!("Creating collection {collection} with vector({dimensions})");
        }

        let statements = provisioning_sql(
            &collection,
            dimensions,
            self.hnsw_m,
            self.hnsw_ef_construction,
            table_exists,
        );
        for statement in statements {
            if let Err(e) = sqlx::query(&statement).execute(&self.pool).await {
                if !is_already_exists(&e) {
                    return Err(e.into());
                }
                debug!("Collection {collection} was provisioned concurrently");
            }
        }

        self.check_loaded(&collection, dimensions).await?;
        debug!("Collection {collection} setup complete");
        Ok(collection)
    }

    async fn insert(&self, turn: &Turn) -> Result<(), TurnStoreError> {
        let collection = collection_name(&turn.scenario_id)?;
        turn.validate(self.dimensions).map_err(TurnStoreError::InvalidTurn)?;

        let start = Instant::now();
        sqlx::query(&insert_sql(&collection))
            .bind(&turn.message_id)
            .bind(&turn.scenario_id)
            .bind(turn.turn_number)
            .bind(turn.real_timestamp_utc_ms)
            .bind(&turn.sender_character_id)
            .bind(turn.sender_is_player)
            .bind(&turn.venue_name)
            .bind(&turn.sub_location_in_venue)
            .bind(Json(&turn.present_character_ids_at_location))
            .bind(&turn.fictional_datetime_iso)
            .bind(turn.fictional_total_time_elapsed_seconds)
            .bind(&turn.message_content_text)
            .bind(&turn.message_type)
            .bind(&turn.action_details)
            .bind(Json(&turn.dialogue_target_ids))
            .bind(Json(&turn.mentioned_character_ids_in_content))
            .bind(Json(&turn.key_topics_or_entities))
            .bind(&turn.sender_expressed_emotion)
            .bind(Json(&turn.references_previous_message_ids))
            .bind(turn.plot_relevance_score)
            .bind(vector_literal(&turn.message_embedding))
            .execute(&self.pool)
            .await
            .map_err(|e| map_missing(e, &collection))?;

        info!(
            "Stored message {} in {collection} ({:.3}s)",
            turn.message_id,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    async fn fetch_turns(&self, scenario_id: &str, limit: usize) -> Result<Vec<Turn>, TurnStoreError> {
        let collection = collection_name(scenario_id)?;
        let sql = format!(
            "SELECT {} FROM {collection}
             WHERE scenario_id = $1
             ORDER BY real_timestamp_utc_ms DESC
             LIMIT $2",
            select_columns()
        );
        let rows = sqlx::query(&sql)
            .bind(scenario_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_missing(e, &collection))?;

        rows.iter()
            .map(|row| turn_from_row(row).map_err(TurnStoreError::from))
            .collect()
    }

    async fn fetch_turn_numbers(&self, scenario_id: &str) -> Result<Vec<i64>, TurnStoreError> {
        let collection = collection_name(scenario_id)?;
        let max: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(turn_number) FROM {collection} WHERE scenario_id = $1"
        ))
        .bind(scenario_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_missing(e, &collection))?;
        Ok(max.into_iter().collect())
    }

    async fn similarity_search(
        &self,
        scenario_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredTurn>, TurnStoreError> {
        let collection = collection_name(scenario_id)?;
        if k == 0 {
            return Ok(vec![]);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("SET LOCAL hnsw.ef_search = {}", self.ef_search))
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT {}, message_embedding <-> $1::vector AS distance
             FROM {collection}
             WHERE scenario_id = $2
             ORDER BY distance
             LIMIT $3",
            select_columns()
        );
        let rows = sqlx::query(&sql)
            .bind(vector_literal(query))
            .bind(scenario_id)
            .bind(k as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_missing(e, &collection))?;
        tx.commit().await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(ScoredTurn {
                turn: turn_from_row(row)?,
                distance: row.try_get("distance")?,
            });
        }
        debug!("Similarity search in {collection} returned {} turns", results.len());
        Ok(results)
    }

    async fn drop_collection(&self, scenario_id: &str) -> Result<bool, TurnStoreError> {
        let collection = collection_name(scenario_id)?;
        if !self.collection_exists(&collection).await? {
            info!("Collection {collection} does not exist, nothing to drop");
            return Ok(false);
        }
        sqlx::query(&format!("DROP TABLE IF EXISTS {collection}"))
            .execute(&self.pool)
            .await?;
        info!("Dropped collection {collection}");
        Ok(true)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Turn store connection pool closed");
    }
}
