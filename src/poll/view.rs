use super::lifecycle::is_effectively_closed;
use super::Poll;
use crate::error::AppError;
use crate::store::Store;
use crate::user::{CreatorSummary, User};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A poll as listed to clients.
#[derive(Clone, Debug, Serialize)]
pub struct PollView {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub closing_date: DateTime<Utc>,
    /// Effective status: explicitly closed or past the closing date.
    pub is_closed: bool,
    pub is_anonymous: bool,
    pub allow_multiple_votes: bool,
    pub created_by: Option<CreatorSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_votes: u64,
    /// Only present for an authenticated viewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<String>,
}

impl PollView {
    pub async fn build(
        store: &dyn Store,
        poll: Poll,
        viewer: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let creator = store
            .find_user(poll.created_by)
            .await?
            .map(|u| u.creator_summary());
        let total_votes = store.count_votes(poll.id).await?;

        let (has_voted, user_vote) = match viewer {
            Some(user) => {
                let vote = store.find_user_vote(poll.id, user.id).await?;
                (Some(vote.is_some()), vote.map(|v| v.selected_option))
            }
            None => (None, None),
        };

        Ok(Self {
            is_closed: is_effectively_closed(&poll, now),
            id: poll.id,
            title: poll.title,
            description: poll.description,
            options: poll.options,
            closing_date: poll.closing_date,
            is_anonymous: poll.is_anonymous,
            allow_multiple_votes: poll.allow_multiple_votes,
            created_by: creator,
            created_at: poll.created_at,
            updated_at: poll.updated_at,
            total_votes,
            has_voted,
            user_vote,
        })
    }
}
