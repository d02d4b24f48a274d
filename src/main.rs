//! personfinder service entry point

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use personfinder::config::Config;
use personfinder::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting personfinder");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Optional TOML config file, path overridable via ENV
    let config_path = std::env::var("PERSONFINDER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("personfinder.toml"));
    let config = Config::load(Some(&config_path))?;

    std::fs::create_dir_all(&config.photo_dir)?;

    info!("Database: {}", config.database_path.display());
    let db_pool = personfinder::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    let bind = format!("{}:{}", config.bind_address, config.port);
    let state = AppState::new(db_pool, config);
    let app = personfinder::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
