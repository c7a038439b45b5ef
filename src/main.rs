use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use course_rag::config::Settings;
use course_rag::rag::RagService;
use course_rag::server;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load()?;

    tracing::info!("Vector store: {:?} at {}", settings.store.backend, settings.store.qdrant_url);
    tracing::info!("Embedding model: {}", settings.embedding.model);
    tracing::info!(
        "Generator: {:?} {} at {}",
        settings.generation.provider,
        settings.generation.model,
        settings.generation.base_url
    );

    let service = Arc::new(RagService::from_settings(&settings)?);
    match service.warm_up().await {
        Ok(()) => tracing::info!("Embedding model {} loaded", service.embedding_model()),
        Err(e) => tracing::warn!("Embedding model load failed (will retry on first request): {}", e),
    }
    let app = server::router(service);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    tracing::info!("Course RAG server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
