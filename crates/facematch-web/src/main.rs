use anyhow::{Context, Result};
use facematch_core::{Config, FaceVerifier};
use tracing_subscriber::EnvFilter;

mod engine;
mod page;
mod routes;
mod upload;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facematch-web starting");

    let config = Config::load(None).context("loading configuration")?;

    // Load models up front so a missing file fails at startup, not on first upload.
    let verifier = FaceVerifier::load(&config).context("loading face models")?;
    let engine = engine::spawn_engine(verifier)?;

    let app = routes::router(routes::AppState::new(engine, &config), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, database = %config.database_dir.display(), "facematch-web ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facematch-web shutting down");
        })
        .await?;

    Ok(())
}
