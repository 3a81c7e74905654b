use actix_web::HttpServer;
use anyhow::Context;
use env_logger::Env;
use pollbox::app_config::AppConfig;
use pollbox::store::{DbStore, MemoryStore, Store};
use pollbox::web::{self, AppState};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_lib_mods();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    pollbox::error::expose_internal_errors(config.server.is_development());

    if config.auth.secret_key.is_empty() {
        let random_string: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(128)
            .map(char::from)
            .collect();
        log::warn!("SECRET_KEY is not set.\r\nThis means every issued token will be invalidated when the application is restarted.");
        config.auth.secret_key = random_string;
    }

    let store = open_store(&config).await?;
    let state = AppState::new(store, config.clone());

    // Spawn rate limiter cleanup task
    let limiter = state.limiter.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            limiter.cleanup_old_entries();
            log::debug!(
                "Rate limiter cleanup completed, {} keys tracked",
                limiter.tracked_keys_count()
            );
        }
    });

    let bind = config.server.bind_addr();
    log::info!(
        "Starting pollbox on {}:{} ({})",
        bind.0,
        bind.1,
        config.server.environment
    );

    HttpServer::new(move || web::app(state.clone()))
        .bind(bind)?
        .run()
        .await?;

    Ok(())
}

/// PostgreSQL when a database URL is configured, otherwise the in-memory store.
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    if config.database.url.is_empty() {
        log::warn!("No database URL configured; polls and votes are kept in memory only.");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = DbStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to the database")?;
    store
        .init_schema()
        .await
        .context("Failed to apply the database schema")?;
    Ok(Arc::new(store))
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    // A missing .env is fine; the environment may already carry everything.
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
