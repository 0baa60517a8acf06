use clap::Parser;
use lesion_service::{build_router, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lesion_service=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();
    let state = AppState::from_config(&config).await?;
    tracing::info!(upload_dir = %state.store.root().display(), "upload directory ready");

    let app = build_router(state, config.body_limit_bytes());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
