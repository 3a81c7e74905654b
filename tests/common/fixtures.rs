//! Test fixtures for creating test data
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use pollbox::poll::{NewPoll, Poll};
use pollbox::store::{MemoryStore, Store};
use pollbox::user::{NewUser, Role, User};
use pollbox::web::AppState;

pub const TEST_PASSWORD: &str = "Passw0rd";

/// Test user fixture
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> i32 {
        self.user.id
    }
}

/// Create a user with [`TEST_PASSWORD`] and a valid bearer token.
pub async fn create_test_user(state: &AppState, store: &MemoryStore, name: &str, role: Role) -> TestUser {
    let user = store
        .insert_user(NewUser {
            name: name.to_owned(),
            email: format!("{}@test.com", name),
            password: pollbox::session::hash_password(TEST_PASSWORD).unwrap(),
            role,
        })
        .await
        .expect("Failed to insert test user");
    let token = state.tokens.issue(user.id, Utc::now());

    TestUser { user, token }
}

pub async fn create_test_admin(state: &AppState, store: &MemoryStore, name: &str) -> TestUser {
    create_test_user(state, store, name, Role::Admin).await
}

/// Inserts a poll directly, bypassing the closing date check so expired polls
/// can be arranged.
pub async fn create_test_poll(
    store: &MemoryStore,
    owner: &TestUser,
    options: &[&str],
    closing_date: DateTime<Utc>,
) -> Poll {
    store
        .insert_poll(NewPoll {
            title: "Favourite colour".to_owned(),
            description: Some("Pick one".to_owned()),
            options: options.iter().map(|o| o.to_string()).collect(),
            closing_date,
            is_anonymous: false,
            allow_multiple_votes: false,
            created_by: owner.id(),
        })
        .await
        .expect("Failed to insert test poll")
}

/// An open poll closing in a day.
pub async fn create_open_poll(store: &MemoryStore, owner: &TestUser, options: &[&str]) -> Poll {
    create_test_poll(store, owner, options, Utc::now() + Duration::days(1)).await
}
