#![allow(dead_code)]

pub mod database;
pub mod fixtures;

use actix_web::http::header;
use pollbox::app_config::AppConfig;
use pollbox::store::{MemoryStore, Store};
use pollbox::web::AppState;
use std::sync::Arc;

/// Defaults plus a fixed signing secret.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.secret_key = "integration test secret".to_owned();
    config
}

/// App state over a fresh in-memory store. The store is returned as well so
/// tests can arrange data without going through the API.
pub fn test_state_with(config: AppConfig) -> (AppState, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory.clone();
    (AppState::new(store, config), memory)
}

pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    test_state_with(test_config())
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}
