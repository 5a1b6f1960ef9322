use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use course_rag::core::config::{AppPaths, ConfigService};
use course_rag::core::logging;
use course_rag::server;
use course_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    let config = ConfigService::new(paths.clone());
    let settings = AppState::load_settings(&config)?;
    logging::init(&paths, settings.logging.filter.as_deref());

    let state = AppState::initialize(paths.clone(), settings).await?;

    let documents = &state.settings.documents;
    if documents.load_on_startup {
        let docs_path = paths.resolve(&documents.path);
        tracing::info!("Loading initial documents from {}", docs_path.display());
        match state
            .rag
            .add_course_folder(&docs_path, documents.clear_existing)
            .await
        {
            Ok((courses, chunks)) => {
                tracing::info!("Loaded {} courses with {} chunks", courses, chunks)
            }
            Err(err) => tracing::warn!("Error loading documents: {}", err),
        }
    }

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
