use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use lisa_backend::core;
use lisa_backend::server;
use lisa_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    core::logging::init(&state.paths);

    match state.llm.health_check().await {
        Ok(true) => tracing::info!("Provider {} is reachable", state.llm.provider_name()),
        Ok(false) => tracing::warn!(
            "Provider {} is not reachable yet; requests will retry",
            state.llm.provider_name()
        ),
        Err(err) => tracing::warn!("Provider health check failed: {}", err),
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.config.server.port);
    let bind_addr = format!("{}:{}", state.config.server.host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
