//! Test database setup and management
#![allow(dead_code)]

use pollbox::store::DbStore;
use sea_orm::{ConnectionTrait, Database, DbErr, Statement};
use std::env;

/// `TEST_DATABASE_URL`, else `DATABASE_URL`. Database tests are skipped when
/// neither is set.
pub fn test_database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
        .filter(|url| !url.is_empty())
}

/// Connects, applies the schema and empties every table.
pub async fn setup_test_store() -> Option<DbStore> {
    let url = match test_database_url() {
        Some(url) => url,
        None => {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return None;
        }
    };

    let store = DbStore::connect(&url, 2)
        .await
        .expect("Failed to connect to test database");
    store.init_schema().await.expect("Failed to apply schema");
    cleanup_test_data(&url)
        .await
        .expect("Failed to clean test database");
    Some(store)
}

/// Truncates in dependency order and resets id sequences.
pub async fn cleanup_test_data(url: &str) -> Result<(), DbErr> {
    let db = Database::connect(url).await?;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "TRUNCATE TABLE votes, polls, users RESTART IDENTITY CASCADE;".to_string(),
    ))
    .await?;
    Ok(())
}
