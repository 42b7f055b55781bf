//! Scenario creation and deletion across the document and turn stores.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::database::ScenarioStore;
use crate::models::canonical::{canonicalize_scenario, CanonicalError};
use crate::vector_store::{TurnStore, TurnStoreError};

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("Invalid scenario data: {0}")]
    Invalid(#[from] CanonicalError),
    #[error("Failed to save scenario: {0}")]
    DocumentStore(String),
    #[error("Scenario {scenario_id} saved but its message storage could not be prepared: {source}")]
    Provisioning {
        scenario_id: String,
        #[source]
        source: TurnStoreError,
    },
}

impl CreateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CreateError::Invalid(_) => StatusCode::BAD_REQUEST,
            CreateError::DocumentStore(_) | CreateError::Provisioning { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Canonicalize and persist a scenario, then provision its turn collection.
///
/// If provisioning fails the document is removed again so no scenario is
/// left without message storage.
pub async fn create_scenario(
    scenarios: &dyn ScenarioStore,
    turns: &dyn TurnStore,
    raw: Value,
    dimensions: usize,
) -> Result<String, CreateError> {
    let scenario = canonicalize_scenario(raw)?;

    let scenario_id = scenarios
        .create_scenario(&scenario)
        .await
        .map_err(|e| CreateError::DocumentStore(e.to_string()))?;
    info!("Scenario saved with id {scenario_id}");

    match turns.ensure_collection(&scenario_id, dimensions).await {
        Ok(collection) => {
            info!("Message storage {collection} ready for scenario {scenario_id}");
            Ok(scenario_id)
        }
        Err(source) => {
            error!("Provisioning message storage for scenario {scenario_id} failed: {source}");
            match scenarios.delete_scenario(&scenario_id).await {
                Ok(_) => info!("Rolled back scenario {scenario_id}"),
                Err(e) => error!("Rollback of scenario {scenario_id} failed: {e}"),
            }
            Err(CreateError::Provisioning { scenario_id, source })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Document and turn collection are both gone.
    Deleted,
    /// Document removed, turn collection still present.
    PartiallyDeleted,
    Failed,
}

impl DeleteOutcome {
    pub fn status_code(self) -> StatusCode {
        match self {
            DeleteOutcome::Deleted => StatusCode::OK,
            DeleteOutcome::PartiallyDeleted => StatusCode::MULTI_STATUS,
            DeleteOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub outcome: DeleteOutcome,
    pub document_deleted: bool,
    pub collection_dropped: bool,
    pub message: String,
}

/// Delete a scenario document and drop its turn collection.
///
/// Missing data on either side counts as already deleted.
pub async fn delete_scenario(
    scenarios: &dyn ScenarioStore,
    turns: &dyn TurnStore,
    scenario_id: &str,
) -> DeleteReport {
    let document_deleted = match scenarios.delete_scenario(scenario_id).await {
        Ok(true) => {
            info!("Deleted scenario {scenario_id} from the document store");
            true
        }
        Ok(false) => {
            warn!("Scenario {scenario_id} not found in the document store, treating as deleted");
            true
        }
        Err(e) => {
            error!("Failed to delete scenario {scenario_id}: {e}");
            return DeleteReport {
                outcome: DeleteOutcome::Failed,
                document_deleted: false,
                collection_dropped: false,
                message: format!("Failed to delete scenario: {e}"),
            };
        }
    };

    let collection_dropped = match turns.drop_collection(scenario_id).await {
        Ok(existed) => {
            if !existed {
                info!("Message storage for scenario {scenario_id} already absent");
            }
            true
        }
        Err(TurnStoreError::InvalidScenarioId(_)) => {
            info!("Scenario id {scenario_id} cannot name message storage, nothing to drop");
            true
        }
        Err(e) => {
            error!("Failed to drop message storage for scenario {scenario_id}: {e}");
            false
        }
    };

    if collection_dropped {
        DeleteReport {
            outcome: DeleteOutcome::Deleted,
            document_deleted,
            collection_dropped,
            message: format!("Scenario {scenario_id} and its message storage deleted successfully."),
        }
    } else {
        DeleteReport {
            outcome: DeleteOutcome::PartiallyDeleted,
            document_deleted,
            collection_dropped,
            message: format!(
                "Scenario {scenario_id} was deleted, but its message storage could not be removed. Please check server logs."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{character, scenario_with, FakeScenarioStore, FakeTurnStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_provisions_collection() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);

        let raw = json!({
            "title": "Harbor at Dusk",
            "characters": [{"name": "Alex", "isPlayer": true}, {"name": "Mira", "backstory": null}]
        });
        let id = create_scenario(&scenarios, &turns, raw, 8).await.unwrap();

        assert!(turns.has_collection(&id));
        let stored = scenarios.get_scenario(&id).await.unwrap().unwrap();
        assert_eq!(stored.characters.len(), 2);
        assert!(stored.characters.iter().all(|c| !c.id.is_empty()));
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_provisioning_failure() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);
        turns.fail_ensure();

        let err = create_scenario(&scenarios, &turns, json!({"title": "x"}), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::Provisioning { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(scenarios.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);

        let err = create_scenario(&scenarios, &turns, json!("nope"), 8).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(scenarios.is_empty());
    }

    #[tokio::test]
    async fn test_delete_full_success() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);
        let id = scenarios
            .insert(scenario_with(vec![character("m", "Mira", false)]))
            .await;
        turns.ensure_collection(&id, 8).await.unwrap();

        let report = delete_scenario(&scenarios, &turns, &id).await;
        assert_eq!(report.outcome, DeleteOutcome::Deleted);
        assert_eq!(report.outcome.status_code(), StatusCode::OK);
        assert!(!turns.has_collection(&id));
        assert!(scenarios.is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_missing_collection_is_full_success() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);
        let id = scenarios
            .insert(scenario_with(vec![character("m", "Mira", false)]))
            .await;

        let report = delete_scenario(&scenarios, &turns, &id).await;
        assert_eq!(report.outcome, DeleteOutcome::Deleted);
        assert!(report.collection_dropped);
    }

    #[tokio::test]
    async fn test_delete_partial_when_drop_fails() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);
        let id = scenarios
            .insert(scenario_with(vec![character("m", "Mira", false)]))
            .await;
        turns.ensure_collection(&id, 8).await.unwrap();
        turns.fail_drop();

        let report = delete_scenario(&scenarios, &turns, &id).await;
        assert_eq!(report.outcome, DeleteOutcome::PartiallyDeleted);
        assert_eq!(report.outcome.status_code(), StatusCode::MULTI_STATUS);
        assert!(report.document_deleted);
        assert!(!report.collection_dropped);
    }

    #[tokio::test]
    async fn test_delete_fails_when_document_store_fails() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);
        let id = scenarios
            .insert(scenario_with(vec![character("m", "Mira", false)]))
            .await;
        turns.ensure_collection(&id, 8).await.unwrap();
        scenarios.fail_deletes();

        let report = delete_scenario(&scenarios, &turns, &id).await;
        assert_eq!(report.outcome, DeleteOutcome::Failed);
        assert_eq!(report.outcome.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        // Collection left alone so the scenario stays usable.
        assert!(turns.has_collection(&id));
    }

    #[tokio::test]
    async fn test_delete_unknown_scenario_is_idempotent() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);

        let report = delete_scenario(&scenarios, &turns, "gone").await;
        assert_eq!(report.outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_delete_id_without_possible_collection_is_full_success() {
        let scenarios = FakeScenarioStore::default();
        let turns = FakeTurnStore::new(8);

        let report = delete_scenario(&scenarios, &turns, "no such scenario").await;
        assert_eq!(report.outcome, DeleteOutcome::Deleted);
        assert_eq!(report.outcome.status_code(), StatusCode::OK);
        assert!(report.collection_dropped);
    }
}
