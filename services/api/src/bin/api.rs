//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{JsonAccountStore, LopdfExtractor, OpenAiEmbeddingAdapter, OpenAiQaAdapter},
    config::Config,
    error::ApiError,
    library::{LibraryRegistry, PipelineServices},
    sessions::SessionManager,
    web::{self, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use std::sync::Arc;
use study_assistant_core::ports::AccountStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Account Store ---
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let users_file = config.data_dir.join("users.json");
    let accounts = Arc::new(JsonAccountStore::open(&users_file).await?);
    info!("Account store opened at {}", users_file.display());

    // --- 3. Initialize Service Adapters ---
    let llm_client = Client::with_config(
        OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.llm_api_base.clone()),
    );
    let embedding_client = Client::with_config(
        OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.embedding_api_base.clone()),
    );

    let services = PipelineServices {
        embedder: Arc::new(OpenAiEmbeddingAdapter::new(
            embedding_client,
            config.embed_model.clone(),
        )),
        answerer: Arc::new(OpenAiQaAdapter::new(llm_client, config.qa_model.clone())),
        extractor: Arc::new(LopdfExtractor::new()),
    };

    // --- 4. Restore Every User's Library ---
    let libraries = Arc::new(LibraryRegistry::new(config.data_dir.clone(), services));
    let usernames = accounts.list_usernames().await?;
    let loaded = libraries.load_users(&usernames).await?;
    info!(
        "Restored {} user(s), {} with a vector index.",
        usernames.len(),
        loaded
    );

    // --- 5. Build the Shared AppState ---
    let sessions = Arc::new(SessionManager::new(
        accounts.clone(),
        config.session_timeout,
    ));
    let app_state = Arc::new(AppState {
        config: config.clone(),
        sessions,
        libraries,
    });

    // --- 6. Create the Web Router ---
    let app = web::router(app_state);

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // --- 8. Flush State ---
    if let Err(e) = accounts.flush().await {
        error!("Failed to flush account store on shutdown: {}", e);
        return Err(e.into());
    }
    info!("Server stopped.");
    Ok(())
}

/// Cancels `token` on Ctrl-C or, on Unix, SIGTERM.
async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received. Draining connections...");
    token.cancel();
}
