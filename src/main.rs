//! chat-relay - conversational AI backend
//!
//! Persists chat sessions as JSON files and answers each message through a
//! fallback chain of model backends, streaming the reply over WebSocket.

mod api;
mod config;
mod llm;
mod orchestrator;
mod store;

use api::{create_router, AppState};
use config::AppConfig;
use llm::ProviderRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use store::FileStore;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    let store = Arc::new(FileStore::open(&config.data_dir)?);
    tracing::info!(path = %store.dir().display(), "Conversation store opened");

    let registry = Arc::new(ProviderRegistry::new(&config.llm));
    if registry.has_hosted() || registry.has_local() {
        tracing::info!(
            hosted = registry.has_hosted(),
            local = registry.has_local(),
            default = %registry.default_model(),
            "Provider registry initialized"
        );
    } else {
        tracing::warn!(
            "No model backends configured. Set OPENAI_API_KEY or LOCAL_MODEL_URL; replying with canned responses."
        );
    }

    let state = AppState::new(store, registry);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    if let Some(dir) = &config.static_dir {
        tracing::info!(path = %dir.display(), "Serving frontend");
    }

    let app = create_router(state, config.static_dir.clone())
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("chat-relay server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
