//! In-process store.
//!
//! Every operation takes one lock over the whole state, so check-then-write
//! sequences (uniqueness, conditional updates) are atomic just like the
//! constraints and conditional `UPDATE`s of the database backend.

use super::{Page, Paginated, Store, StoreError};
use crate::poll::{NewPoll, NewVote, OptionCount, Poll, PollFilter, Vote};
use crate::user::{NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct State {
    users: BTreeMap<i32, User>,
    polls: BTreeMap<i32, Poll>,
    votes: BTreeMap<i32, Vote>,
    next_user_id: i32,
    next_poll_id: i32,
    next_vote_id: i32,
}

impl State {
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_owned()))
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Paginated<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    Paginated { items, total }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.name == user.name) {
            return Err(StoreError::UniqueViolation("User name".to_owned()));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("User email".to_owned()));
        }

        let now = Utc::now();
        let id = State::next_id(&mut state.next_user_id);
        let record = User {
            id,
            name: user.name,
            email: user.email,
            password: user.password,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, record.clone());
        Ok(record)
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.values().find(|u| u.name == name).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state
            .users
            .values()
            .any(|u| u.id != user.id && (u.name == user.name || u.email == user.email))
        {
            return Err(StoreError::UniqueViolation("User".to_owned()));
        }

        let record = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::NotFound("User".to_owned()))?;
        record.name = user.name.clone();
        record.email = user.email.clone();
        record.role = user.role;
        record.is_active = user.is_active;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        let mut state = self.write()?;
        let now = Utc::now();
        let id = State::next_id(&mut state.next_poll_id);
        let record = Poll {
            id,
            title: poll.title,
            description: poll.description,
            options: poll.options,
            closing_date: poll.closing_date,
            is_closed: false,
            is_anonymous: poll.is_anonymous,
            allow_multiple_votes: poll.allow_multiple_votes,
            created_by: poll.created_by,
            created_at: now,
            updated_at: now,
        };
        state.polls.insert(id, record.clone());
        Ok(record)
    }

    async fn find_poll(&self, id: i32) -> Result<Option<Poll>, StoreError> {
        Ok(self.read()?.polls.get(&id).cloned())
    }

    async fn update_poll(&self, poll: &Poll) -> Result<Poll, StoreError> {
        let mut state = self.write()?;
        let record = state
            .polls
            .get_mut(&poll.id)
            .ok_or_else(|| StoreError::NotFound("Poll".to_owned()))?;
        *record = Poll {
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: Utc::now(),
            ..poll.clone()
        };
        Ok(record.clone())
    }

    async fn delete_poll(&self, id: i32) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.polls.remove(&id).is_none() {
            return Err(StoreError::NotFound("Poll".to_owned()));
        }
        state.votes.retain(|_, v| v.poll_id != id);
        Ok(())
    }

    async fn list_polls(&self, filter: &PollFilter, page: Page) -> Result<Paginated<Poll>, StoreError> {
        let state = self.read()?;
        let mut polls: Vec<Poll> = state
            .polls
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(polls, page))
    }

    async fn close_expired_polls(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let mut closed = 0;
        for poll in state.polls.values_mut() {
            if !poll.is_closed && poll.closing_date <= now {
                poll.is_closed = true;
                poll.updated_at = now;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError> {
        let mut state = self.write()?;
        if !state.polls.contains_key(&vote.poll_id) {
            return Err(StoreError::NotFound("Poll".to_owned()));
        }
        if state
            .votes
            .values()
            .any(|v| v.poll_id == vote.poll_id && v.user_id == vote.user_id)
        {
            return Err(StoreError::UniqueViolation("Vote".to_owned()));
        }

        let id = State::next_id(&mut state.next_vote_id);
        let record = Vote {
            id,
            poll_id: vote.poll_id,
            user_id: vote.user_id,
            selected_option: vote.selected_option,
            ip_address: vote.ip_address,
            user_agent: vote.user_agent,
            created_at: Utc::now(),
        };
        state.votes.insert(id, record.clone());
        Ok(record)
    }

    async fn find_vote(&self, id: i32) -> Result<Option<Vote>, StoreError> {
        Ok(self.read()?.votes.get(&id).cloned())
    }

    async fn find_user_vote(&self, poll_id: i32, user_id: i32) -> Result<Option<Vote>, StoreError> {
        Ok(self
            .read()?
            .votes
            .values()
            .find(|v| v.poll_id == poll_id && v.user_id == user_id)
            .cloned())
    }

    async fn delete_vote(&self, id: i32) -> Result<(), StoreError> {
        match self.write()?.votes.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound("Vote".to_owned())),
        }
    }

    async fn count_votes(&self, poll_id: i32) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .votes
            .values()
            .filter(|v| v.poll_id == poll_id)
            .count() as u64)
    }

    async fn count_votes_by_option(&self, poll_id: i32) -> Result<Vec<OptionCount>, StoreError> {
        let state = self.read()?;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for vote in state.votes.values().filter(|v| v.poll_id == poll_id) {
            *counts.entry(vote.selected_option.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(option, count)| OptionCount {
                option: option.to_owned(),
                count,
            })
            .collect())
    }

    async fn list_poll_votes(&self, poll_id: i32) -> Result<Vec<(Vote, Option<User>)>, StoreError> {
        let state = self.read()?;
        let mut votes: Vec<(Vote, Option<User>)> = state
            .votes
            .values()
            .filter(|v| v.poll_id == poll_id)
            .map(|v| (v.clone(), state.users.get(&v.user_id).cloned()))
            .collect();
        votes.sort_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(votes)
    }

    async fn list_user_votes(&self, user_id: i32, page: Page) -> Result<Paginated<Vote>, StoreError> {
        let state = self.read()?;
        let mut votes: Vec<Vote> = state
            .votes
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(votes, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::StatusFilter;
    use crate::user::Role;
    use chrono::Duration;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_owned(),
            email: format!("{}@example.com", name),
            password: "hash".to_owned(),
            role: Role::Admin,
        }
    }

    fn new_poll(owner: i32, closing_date: DateTime<Utc>) -> NewPoll {
        NewPoll {
            title: "Lunch".to_owned(),
            description: None,
            options: vec!["Pizza".to_owned(), "Sushi".to_owned()],
            closing_date,
            is_anonymous: false,
            allow_multiple_votes: false,
            created_by: owner,
        }
    }

    #[actix_rt::test]
    async fn test_user_name_and_email_are_unique() {
        let store = MemoryStore::new();
        store.insert_user(new_user("alice")).await.unwrap();

        let same_name = store.insert_user(new_user("alice")).await;
        assert!(matches!(same_name, Err(StoreError::UniqueViolation(_))));

        let mut other = new_user("bob");
        other.email = "alice@example.com".to_owned();
        let same_email = store.insert_user(other).await;
        assert!(matches!(same_email, Err(StoreError::UniqueViolation(_))));
    }

    #[actix_rt::test]
    async fn test_second_vote_for_same_poll_and_user_rejected() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice")).await.unwrap();
        let poll = store
            .insert_poll(new_poll(user.id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let vote = |option: &str| NewVote {
            poll_id: poll.id,
            user_id: user.id,
            selected_option: option.to_owned(),
            ip_address: None,
            user_agent: None,
        };

        store.insert_vote(vote("Pizza")).await.unwrap();
        let second = store.insert_vote(vote("Sushi")).await;
        assert!(matches!(second, Err(StoreError::UniqueViolation(_))));
        assert_eq!(store.count_votes(poll.id).await.unwrap(), 1);
    }

    #[actix_rt::test]
    async fn test_close_expired_polls_is_conditional_and_idempotent() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice")).await.unwrap();
        let now = Utc::now();
        let past = store
            .insert_poll(new_poll(user.id, now - Duration::hours(1)))
            .await
            .unwrap();
        let future = store
            .insert_poll(new_poll(user.id, now + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.close_expired_polls(now).await.unwrap(), 1);
        assert_eq!(store.close_expired_polls(now).await.unwrap(), 0);
        assert!(store.find_poll(past.id).await.unwrap().unwrap().is_closed);
        assert!(!store.find_poll(future.id).await.unwrap().unwrap().is_closed);
    }

    #[actix_rt::test]
    async fn test_list_polls_filters_and_paginates_newest_first() {
        let store = MemoryStore::new();
        let alice = store.insert_user(new_user("alice")).await.unwrap();
        let bob = store.insert_user(new_user("bob")).await.unwrap();
        let now = Utc::now();
        for _ in 0..3 {
            store
                .insert_poll(new_poll(alice.id, now + Duration::days(1)))
                .await
                .unwrap();
        }
        store
            .insert_poll(new_poll(bob.id, now - Duration::days(1)))
            .await
            .unwrap();

        let filter = PollFilter {
            status: Some(StatusFilter::Open),
            created_by: None,
            now,
        };
        let page = store
            .list_polls(&filter, Page { page: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].id > page.items[1].id);

        let filter = PollFilter {
            status: Some(StatusFilter::Closed),
            created_by: Some(bob.id),
            now,
        };
        let page = store
            .list_polls(&filter, Page { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].created_by, bob.id);
    }

    #[actix_rt::test]
    async fn test_delete_poll_removes_its_votes() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice")).await.unwrap();
        let poll = store
            .insert_poll(new_poll(user.id, Utc::now() + Duration::days(1)))
            .await
            .unwrap();
        let vote = store
            .insert_vote(NewVote {
                poll_id: poll.id,
                user_id: user.id,
                selected_option: "Pizza".to_owned(),
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();

        store.delete_poll(poll.id).await.unwrap();
        assert!(store.find_vote(vote.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_poll(poll.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
