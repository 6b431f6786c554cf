mod config;
mod constants;
mod db;
mod error;
mod facebook;
mod models;
mod oauth;
mod rate_limit;
mod retry;
mod server;
mod sync;

use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize database connection
    let db = Arc::new(db::Database::new(&config.database_url).await?);

    let state = server::AppState {
        db,
        exchanger: Arc::new(oauth::TokenExchanger::new(
            config.meta_app_id.clone(),
            config.meta_app_secret.clone(),
        )),
        limiter: Arc::new(rate_limit::ExchangeRateLimiter::new()),
    };

    info!(addr = %config.bind_addr, "starting meta-sync-service");
    server::serve(config.bind_addr, state).await?;

    Ok(())
}
