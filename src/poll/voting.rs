//! Casting and withdrawing votes. One vote per user per poll.

use super::lifecycle::is_effectively_closed;
use super::{NewVote, Vote, VoteMetadata};
use crate::error::AppError;
use crate::permission::is_owner_admin;
use crate::response::Pagination;
use crate::store::{Page, Store, StoreError};
use crate::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CastVoteRequest {
    #[validate(range(min = 1, message = "Invalid poll ID"))]
    pub poll_id: i32,
    #[validate(length(min = 1, message = "Selected option is required"))]
    pub selected_option: String,
}

impl CastVoteRequest {
    pub fn normalize(mut self) -> Self {
        self.selected_option = self.selected_option.trim().to_owned();
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VoteView {
    pub id: i32,
    pub poll_id: i32,
    pub selected_option: String,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteView {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id,
            poll_id: vote.poll_id,
            selected_option: vote.selected_option,
            created_at: vote.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VotedPoll {
    pub id: i32,
    pub title: String,
    pub closing_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VoteHistoryEntry {
    pub id: i32,
    pub poll: VotedPoll,
    pub selected_option: String,
    pub created_at: DateTime<Utc>,
}

pub async fn cast_vote(
    store: &dyn Store,
    user: &User,
    req: CastVoteRequest,
    metadata: VoteMetadata,
    now: DateTime<Utc>,
) -> Result<Vote, AppError> {
    let req = req.normalize();
    req.validate()?;

    let poll = store
        .find_poll(req.poll_id)
        .await?
        .ok_or_else(|| AppError::not_found("Poll"))?;

    if is_effectively_closed(&poll, now) {
        return Err(AppError::PollClosed(
            "Cannot vote on a closed poll".to_owned(),
        ));
    }
    if store.find_user_vote(poll.id, user.id).await?.is_some() {
        return Err(AppError::DuplicateVote);
    }
    if !poll.has_option(&req.selected_option) {
        return Err(AppError::InvalidOption);
    }

    let vote = store
        .insert_vote(NewVote {
            poll_id: poll.id,
            user_id: user.id,
            selected_option: req.selected_option,
            ip_address: metadata.ip_address,
            user_agent: metadata.user_agent,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent vote by the same user.
            StoreError::UniqueViolation(_) => AppError::DuplicateVote,
            other => other.into(),
        })?;

    log::debug!("User {} voted on poll {}", user.id, poll.id);
    Ok(vote)
}

pub async fn my_vote(store: &dyn Store, user: &User, poll_id: i32) -> Result<Vote, AppError> {
    if store.find_poll(poll_id).await?.is_none() {
        return Err(AppError::not_found("Poll"));
    }
    store
        .find_user_vote(poll_id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Vote".to_owned()))
}

pub async fn vote_history(
    store: &dyn Store,
    user: &User,
    page: Page,
) -> Result<(Vec<VoteHistoryEntry>, Pagination), AppError> {
    let found = store.list_user_votes(user.id, page).await?;

    let mut entries = Vec::with_capacity(found.items.len());
    for vote in found.items {
        // Votes are removed with their poll; a miss here is a concurrent delete.
        let poll = match store.find_poll(vote.poll_id).await? {
            Some(poll) => poll,
            None => continue,
        };
        entries.push(VoteHistoryEntry {
            id: vote.id,
            poll: VotedPoll {
                id: poll.id,
                title: poll.title,
                closing_date: poll.closing_date,
            },
            selected_option: vote.selected_option,
            created_at: vote.created_at,
        });
    }

    Ok((entries, Pagination::new(page.page, page.limit, found.total)))
}

/// Withdraws a vote. The voter and the poll's owner-admin may do so while the
/// poll is open; anyone else is told the vote does not exist.
pub async fn delete_vote(
    store: &dyn Store,
    actor: &User,
    vote_id: i32,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let vote = store
        .find_vote(vote_id)
        .await?
        .ok_or_else(|| AppError::not_found("Vote"))?;
    let poll = store
        .find_poll(vote.poll_id)
        .await?
        .ok_or_else(|| AppError::not_found("Vote"))?;

    if vote.user_id != actor.id && !is_owner_admin(actor, &poll) {
        return Err(AppError::not_found("Vote"));
    }
    if is_effectively_closed(&poll, now) {
        return Err(AppError::PollClosed(
            "Cannot remove a vote from a closed poll".to_owned(),
        ));
    }

    store.delete_vote(vote.id).await?;
    log::info!("Vote {} on poll {} deleted by user {}", vote.id, poll.id, actor.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::NewPoll;
    use crate::store::MemoryStore;
    use crate::user::{NewUser, Role};
    use chrono::Duration;

    async fn user(store: &MemoryStore, name: &str, role: Role) -> User {
        store
            .insert_user(NewUser {
                name: name.to_owned(),
                email: format!("{}@example.com", name),
                password: String::new(),
                role,
            })
            .await
            .unwrap()
    }

    async fn poll(store: &MemoryStore, owner: &User, closing_date: DateTime<Utc>) -> i32 {
        store
            .insert_poll(NewPoll {
                title: "Lunch".to_owned(),
                description: None,
                options: vec!["Pizza".to_owned(), "Sushi".to_owned()],
                closing_date,
                is_anonymous: false,
                allow_multiple_votes: false,
                created_by: owner.id,
            })
            .await
            .unwrap()
            .id
    }

    fn ballot(poll_id: i32, option: &str) -> CastVoteRequest {
        CastVoteRequest {
            poll_id,
            selected_option: option.to_owned(),
        }
    }

    #[actix_rt::test]
    async fn test_cast_vote_records_choice_and_metadata() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let now = Utc::now();
        let poll_id = poll(&store, &owner, now + Duration::days(1)).await;

        let vote = cast_vote(
            &store,
            &voter,
            ballot(poll_id, " Pizza "),
            VoteMetadata {
                ip_address: Some("10.0.0.1".to_owned()),
                user_agent: Some("test".to_owned()),
            },
            now,
        )
        .await
        .unwrap();

        assert_eq!(vote.selected_option, "Pizza");
        assert_eq!(vote.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(my_vote(&store, &voter, poll_id).await.unwrap().id, vote.id);
    }

    #[actix_rt::test]
    async fn test_second_vote_is_duplicate_and_first_kept() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let now = Utc::now();
        let poll_id = poll(&store, &owner, now + Duration::days(1)).await;

        cast_vote(&store, &voter, ballot(poll_id, "Pizza"), VoteMetadata::default(), now)
            .await
            .unwrap();
        let err = cast_vote(&store, &voter, ballot(poll_id, "Sushi"), VoteMetadata::default(), now)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DuplicateVote));
        let kept = my_vote(&store, &voter, poll_id).await.unwrap();
        assert_eq!(kept.selected_option, "Pizza");
    }

    #[actix_rt::test]
    async fn test_vote_rejections() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let now = Utc::now();
        let open = poll(&store, &owner, now + Duration::days(1)).await;
        let expired = poll(&store, &owner, now - Duration::minutes(1)).await;

        let err = cast_vote(&store, &voter, ballot(999, "Pizza"), VoteMetadata::default(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = cast_vote(&store, &voter, ballot(expired, "Pizza"), VoteMetadata::default(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PollClosed(_)));

        let err = cast_vote(&store, &voter, ballot(open, "pizza"), VoteMetadata::default(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOption));

        let err = cast_vote(&store, &voter, ballot(open, "   "), VoteMetadata::default(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        assert_eq!(store.count_votes(open).await.unwrap(), 0);
    }

    #[actix_rt::test]
    async fn test_my_vote_when_not_voted() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let poll_id = poll(&store, &owner, Utc::now() + Duration::days(1)).await;

        let err = my_vote(&store, &voter, poll_id).await.unwrap_err();
        assert_eq!(err.to_string(), "Vote not found");
        let err = my_vote(&store, &voter, 999).await.unwrap_err();
        assert_eq!(err.to_string(), "Poll not found");
    }

    #[actix_rt::test]
    async fn test_vote_history_newest_first() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let now = Utc::now();
        let first = poll(&store, &owner, now + Duration::days(1)).await;
        let second = poll(&store, &owner, now + Duration::days(2)).await;

        for id in [first, second] {
            cast_vote(&store, &voter, ballot(id, "Sushi"), VoteMetadata::default(), now)
                .await
                .unwrap();
        }

        let (entries, pagination) = vote_history(&store, &voter, Page { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(pagination.total, 2);
        assert_eq!(entries[0].poll.id, second);
        assert_eq!(entries[1].poll.id, first);
        assert_eq!(entries[0].poll.title, "Lunch");
    }

    #[actix_rt::test]
    async fn test_delete_vote_permissions() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let other_admin = user(&store, "other", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let bystander = user(&store, "bystander", Role::User).await;
        let now = Utc::now();
        let poll_id = poll(&store, &owner, now + Duration::days(1)).await;

        let vote = cast_vote(&store, &voter, ballot(poll_id, "Pizza"), VoteMetadata::default(), now)
            .await
            .unwrap();

        for outsider in [&bystander, &other_admin] {
            let err = delete_vote(&store, outsider, vote.id, now).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }

        delete_vote(&store, &owner, vote.id, now).await.unwrap();
        assert_eq!(store.count_votes(poll_id).await.unwrap(), 0);

        // Withdrawn, so the voter may vote again.
        let vote = cast_vote(&store, &voter, ballot(poll_id, "Sushi"), VoteMetadata::default(), now)
            .await
            .unwrap();
        delete_vote(&store, &voter, vote.id, now).await.unwrap();
    }

    #[actix_rt::test]
    async fn test_delete_vote_on_closed_poll() {
        let store = MemoryStore::new();
        let owner = user(&store, "admin", Role::Admin).await;
        let voter = user(&store, "voter", Role::User).await;
        let now = Utc::now();
        let poll_id = poll(&store, &owner, now + Duration::days(1)).await;
        let vote = cast_vote(&store, &voter, ballot(poll_id, "Pizza"), VoteMetadata::default(), now)
            .await
            .unwrap();

        let later = now + Duration::days(2);
        let err = delete_vote(&store, &voter, vote.id, later).await.unwrap_err();
        assert!(matches!(err, AppError::PollClosed(_)));
    }

    /// Memory store whose vote lookup always misses, so duplicates are only
    /// caught by the insert, as with two requests racing each other.
    struct StaleVoteLookup(MemoryStore);

    #[async_trait::async_trait]
    impl Store for StaleVoteLookup {
        async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
            self.0.insert_user(user).await
        }
        async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError> {
            self.0.find_user(id).await
        }
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_email(email).await
        }
        async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_name(name).await
        }
        async fn update_user(&self, user: &User) -> Result<User, StoreError> {
            self.0.update_user(user).await
        }
        async fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.0.list_users().await
        }
        async fn insert_poll(&self, poll: NewPoll) -> Result<crate::poll::Poll, StoreError> {
            self.0.insert_poll(poll).await
        }
        async fn find_poll(&self, id: i32) -> Result<Option<crate::poll::Poll>, StoreError> {
            self.0.find_poll(id).await
        }
        async fn update_poll(&self, poll: &crate::poll::Poll) -> Result<crate::poll::Poll, StoreError> {
            self.0.update_poll(poll).await
        }
        async fn delete_poll(&self, id: i32) -> Result<(), StoreError> {
            self.0.delete_poll(id).await
        }
        async fn list_polls(
            &self,
            filter: &crate::poll::PollFilter,
            page: Page,
        ) -> Result<crate::store::Paginated<crate::poll::Poll>, StoreError> {
            self.0.list_polls(filter, page).await
        }
        async fn close_expired_polls(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.0.close_expired_polls(now).await
        }
        async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError> {
            self.0.insert_vote(vote).await
        }
        async fn find_vote(&self, id: i32) -> Result<Option<Vote>, StoreError> {
            self.0.find_vote(id).await
        }
        async fn find_user_vote(&self, _poll_id: i32, _user_id: i32) -> Result<Option<Vote>, StoreError> {
            Ok(None)
        }
        async fn delete_vote(&self, id: i32) -> Result<(), StoreError> {
            self.0.delete_vote(id).await
        }
        async fn count_votes(&self, poll_id: i32) -> Result<u64, StoreError> {
            self.0.count_votes(poll_id).await
        }
        async fn count_votes_by_option(
            &self,
            poll_id: i32,
        ) -> Result<Vec<crate::poll::OptionCount>, StoreError> {
            self.0.count_votes_by_option(poll_id).await
        }
        async fn list_poll_votes(&self, poll_id: i32) -> Result<Vec<(Vote, Option<User>)>, StoreError> {
            self.0.list_poll_votes(poll_id).await
        }
        async fn list_user_votes(
            &self,
            user_id: i32,
            page: Page,
        ) -> Result<crate::store::Paginated<Vote>, StoreError> {
            self.0.list_user_votes(user_id, page).await
        }
    }

    #[actix_rt::test]
    async fn test_racing_votes_leave_one_row() {
        let store = StaleVoteLookup(MemoryStore::new());
        let owner = user(&store.0, "admin", Role::Admin).await;
        let voter = user(&store.0, "voter", Role::User).await;
        let now = Utc::now();
        let poll_id = poll(&store.0, &owner, now + Duration::days(1)).await;

        let (first, second) = futures::join!(
            cast_vote(&store, &voter, ballot(poll_id, "Pizza"), VoteMetadata::default(), now),
            cast_vote(&store, &voter, ballot(poll_id, "Sushi"), VoteMetadata::default(), now),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::DuplicateVote))));
        assert_eq!(store.count_votes(poll_id).await.unwrap(), 1);
    }
}
