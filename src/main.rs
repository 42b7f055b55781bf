mod app;
mod chat;
mod completion;
mod config;
mod database;
mod drafting;
mod embedding;
mod lifecycle;
mod models;
mod routes;
mod storage;
#[cfg(test)]
mod testing;
mod vector_store;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use app::AppState;
use completion::openai::OpenAICompletionModel;
use config::load_settings_from_path;
use database::postgres::PostgresScenarioStore;
use database::ScenarioStore;
use embedding::openai::OpenAIEmbeddingModel;
use storage::local::LocalStorage;
use storage::s3::S3Storage;
use vector_store::pgvector::PgVectorTurnStore;
use vector_store::TurnStore;

/// Cancel `token` on Ctrl+C or SIGTERM.
fn spawn_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
        }
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting roleplay server...");

    // Load configuration.
    let settings = load_settings_from_path("roleplay.toml")?;
    info!(
        "Configuration loaded: environment={}, host={}, port={}",
        settings.environment, settings.host, settings.port
    );
    if settings.completion_api_key.is_empty() {
        warn!("COMPLETION_API_KEY is not set; reply generation will fail");
    }
    if settings.embedding_api_key.is_empty() {
        warn!("EMBEDDING_API_KEY is not set; embedding will fail");
    }

    let shutdown = CancellationToken::new();
    spawn_shutdown_signal(shutdown.clone());

    // Initialize scenario store.
    let scenario_store: Arc<dyn ScenarioStore> = Arc::new(
        PostgresScenarioStore::new(&settings.postgres_uri, settings.db_pool_size).await?,
    );
    scenario_store.initialize().await?;
    info!("Scenario store initialized");

    // Initialize turn store.
    let turn_store: Arc<dyn TurnStore> = Arc::new(
        PgVectorTurnStore::new(
            &settings.postgres_uri,
            settings.db_pool_size,
            settings.vector_dimensions,
            settings.hnsw_m,
            settings.hnsw_ef_construction,
            settings.ef_search,
        )
        .await?,
    );
    turn_store.initialize().await?;
    info!("Turn store initialized");

    // Initialize storage.
    let storage: Arc<dyn storage::Storage> = match settings.storage_provider.as_str() {
        "aws-s3" => Arc::new(S3Storage::new(
            settings.aws_access_key.as_deref().unwrap_or(""),
            settings.aws_secret_access_key.as_deref().unwrap_or(""),
            settings.aws_region.as_deref().unwrap_or("us-east-2"),
            settings.s3_bucket.as_deref().unwrap_or("roleplay-uploads"),
            settings.public_base_url.as_deref(),
        )),
        _ => Arc::new(LocalStorage::new(
            &settings.storage_path,
            settings.public_base_url.as_deref().unwrap_or("/files"),
        )),
    };
    info!("Storage initialized: {}", storage.provider_name());

    // Initialize embedding model.
    let embedding_model: Arc<dyn embedding::EmbeddingModel> = Arc::new(OpenAIEmbeddingModel::new(
        &settings.embedding_base_url,
        &settings.embedding_model,
        &settings.embedding_api_key,
        settings.vector_dimensions,
        settings.upstream_timeout,
    )?);
    info!(
        "Embedding model initialized: {} ({} dims)",
        settings.embedding_model, settings.vector_dimensions
    );

    // Initialize completion model.
    let completion_model: Arc<dyn completion::CompletionModel> = Arc::new(OpenAICompletionModel::new(
        &settings.completion_base_url,
        &settings.completion_api_key,
        settings.reply_max_tokens,
        settings.reply_temperature,
        settings.upstream_timeout,
    )?);
    info!(
        "Completion model initialized: default {}",
        settings.default_model.as_str()
    );

    // Build application state.
    let state = Arc::new(AppState::new(
        settings.clone(),
        scenario_store,
        turn_store,
        embedding_model,
        completion_model,
        storage,
        shutdown.clone(),
    ));

    // Build router.
    let app = routes::build_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server.
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
        info!("HTTP server received shutdown signal");
    });
    if let Err(e) = server.await {
        error!("Server error: {e}");
    }

    state.close().await;
    info!("Shutdown complete");
    Ok(())
}
