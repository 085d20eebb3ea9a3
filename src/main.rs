use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use video_insights::{config::Config, handlers, models::AppState, scratch, system_info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("video_insights=debug,tower_http=debug")),
        )
        .init();

    // Load configuration
    let config = Config::from_env();

    tokio::fs::create_dir_all(&config.scratch_dir).await?;

    system_info::print_startup_info(&config);
    if config.model.api_key.is_none() {
        warn!("GOOGLE_API_KEY is not set; every analysis request will fail");
    }

    // Leftovers from a previous run
    match scratch::sweep_stale(&config.scratch_dir, config.scratch.max_age).await {
        Ok(stats) if stats.deleted > 0 => {
            info!("🧹 Removed {} stale scratch files", stats.deleted)
        }
        Ok(_) => {}
        Err(e) => warn!("Initial scratch sweep failed: {}", e),
    }
    scratch::start_sweep_task(
        config.scratch_dir.clone(),
        config.scratch.max_age,
        config.scratch.sweep_interval,
    );

    let port = config.port;
    let app = handlers::router(Arc::new(AppState::from_config(config)));

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
