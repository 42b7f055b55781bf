use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::{ChatService, ExchangeOptions};
use crate::completion::CompletionModel;
use crate::config::Settings;
use crate::database::ScenarioStore;
use crate::drafting::ScenarioDrafter;
use crate::embedding::EmbeddingModel;
use crate::storage::Storage;
use crate::vector_store::TurnStore;

/// Shared application state passed to all route handlers.
pub struct AppState {
    pub settings: Settings,
    pub scenario_store: Arc<dyn ScenarioStore>,
    pub turn_store: Arc<dyn TurnStore>,
    pub embedding_model: Arc<dyn EmbeddingModel>,
    pub completion_model: Arc<dyn CompletionModel>,
    pub storage: Arc<dyn Storage>,
    pub chat: ChatService,
    pub drafter: ScenarioDrafter,
    /// Cancelled on process shutdown; exchanges run on child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        settings: Settings,
        scenario_store: Arc<dyn ScenarioStore>,
        turn_store: Arc<dyn TurnStore>,
        embedding_model: Arc<dyn EmbeddingModel>,
        completion_model: Arc<dyn CompletionModel>,
        storage: Arc<dyn Storage>,
        shutdown: CancellationToken,
    ) -> Self {
        let chat = ChatService::new(
            scenario_store.clone(),
            turn_store.clone(),
            embedding_model.clone(),
            completion_model.clone(),
            ExchangeOptions {
                context_window: settings.context_window,
                history_limit: settings.history_limit,
                reply_max_tokens: settings.reply_max_tokens,
                reply_temperature: settings.reply_temperature,
                upstream_timeout: settings.upstream_timeout,
            },
        );
        let drafter = ScenarioDrafter::new(
            completion_model.clone(),
            settings.default_model,
            settings.draft_max_tokens,
            settings.draft_temperature,
        );

        Self {
            settings,
            scenario_store,
            turn_store,
            embedding_model,
            completion_model,
            storage,
            chat,
            drafter,
            shutdown,
        }
    }

    /// Release database pools. Call once the server has stopped.
    pub async fn close(&self) {
        self.turn_store.close().await;
        self.scenario_store.close().await;
        info!("Application state closed");
    }
}
