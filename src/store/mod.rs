//! Persistence abstraction.
//!
//! Supports multiple backends:
//! - `db`: PostgreSQL through sea-orm
//! - `memory`: in-process maps, for development without a database and for tests
//!
//! Business logic receives an `&dyn Store` explicitly instead of reaching for a
//! global connection.

pub mod db;
pub mod memory;

pub use db::DbStore;
pub use memory::MemoryStore;

use crate::poll::{NewPoll, NewVote, OptionCount, Poll, PollFilter, Vote};
use crate::user::{NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;

/// Storage operation errors.
#[derive(Debug, Display)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. Carries what was duplicated.
    #[display(fmt = "Unique constraint violated: {}", _0)]
    UniqueViolation(String),
    /// The record to update or delete does not exist.
    #[display(fmt = "Not found: {}", _0)]
    NotFound(String),
    #[display(fmt = "Database error: {}", _0)]
    Database(String),
}

impl std::error::Error for StoreError {}

impl From<sea_orm::DbErr> for StoreError {
    fn from(e: sea_orm::DbErr) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Highest page number a listing accepts.
pub const MAX_PAGE: u64 = 100_000;

/// One page of a listing, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    /// Clamps `page` to `1..=MAX_PAGE` and `limit` to `1..=max_limit`.
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64, max_limit: u64) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// A page of records plus the size of the whole result set.
#[derive(Clone, Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Trait for storage backends.
///
/// Implementations must enforce uniqueness of user names, user emails, and of
/// votes per (poll, user), reporting violations as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError>;

    /// Emails are stored lower-cased; callers pass them normalized.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;

    /// Writes name, email, role and active flag.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError>;

    async fn find_poll(&self, id: i32) -> Result<Option<Poll>, StoreError>;

    /// Writes every mutable column and bumps `updated_at`.
    async fn update_poll(&self, poll: &Poll) -> Result<Poll, StoreError>;

    /// Removes the poll together with its votes.
    async fn delete_poll(&self, id: i32) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_polls(&self, filter: &PollFilter, page: Page) -> Result<Paginated<Poll>, StoreError>;

    /// Marks every open poll whose closing date has been reached as closed.
    /// Idempotent; returns how many polls changed.
    async fn close_expired_polls(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError>;

    async fn find_vote(&self, id: i32) -> Result<Option<Vote>, StoreError>;

    async fn find_user_vote(&self, poll_id: i32, user_id: i32) -> Result<Option<Vote>, StoreError>;

    async fn delete_vote(&self, id: i32) -> Result<(), StoreError>;

    async fn count_votes(&self, poll_id: i32) -> Result<u64, StoreError>;

    /// Vote rows grouped by selected option. Options without votes are absent.
    async fn count_votes_by_option(&self, poll_id: i32) -> Result<Vec<OptionCount>, StoreError>;

    /// Every vote on a poll with its voter, oldest first.
    async fn list_poll_votes(&self, poll_id: i32) -> Result<Vec<(Vote, Option<User>)>, StoreError>;

    /// A user's votes, newest first.
    async fn list_user_votes(&self, user_id: i32, page: Page) -> Result<Paginated<Vote>, StoreError>;
}
