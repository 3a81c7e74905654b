//! PostgreSQL store integration tests. Skipped without a test database.

mod common;

use chrono::{Duration, Utc};
use common::database::setup_test_store;
use pollbox::poll::{NewPoll, NewVote, OptionCount, PollFilter, StatusFilter};
use pollbox::store::{DbStore, Page, Store, StoreError};
use pollbox::user::{NewUser, Role, User};
use serial_test::serial;

async fn insert_user(store: &DbStore, name: &str) -> User {
    store
        .insert_user(NewUser {
            name: name.to_owned(),
            email: format!("{}@test.com", name),
            password: "hash".to_owned(),
            role: Role::Admin,
        })
        .await
        .expect("Failed to insert user")
}

fn new_poll(owner: &User, closing_in: Duration) -> NewPoll {
    NewPoll {
        title: "Favourite colour".to_owned(),
        description: None,
        options: vec!["Red".to_owned(), "Green".to_owned(), "Blue".to_owned()],
        closing_date: Utc::now() + closing_in,
        is_anonymous: false,
        allow_multiple_votes: false,
        created_by: owner.id,
    }
}

fn new_vote(poll_id: i32, user: &User, option: &str) -> NewVote {
    NewVote {
        poll_id,
        user_id: user.id,
        selected_option: option.to_owned(),
        ip_address: Some("203.0.113.9".to_owned()),
        user_agent: None,
    }
}

#[actix_rt::test]
#[serial]
async fn test_unique_constraints_surface_as_violations() {
    let store = match setup_test_store().await {
        Some(store) => store,
        None => return,
    };

    let owner = insert_user(&store, "maya").await;
    let err = store
        .insert_user(NewUser {
            name: "maya".to_owned(),
            email: "other@test.com".to_owned(),
            password: "hash".to_owned(),
            role: Role::User,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)), "{:?}", err);

    let poll = store
        .insert_poll(new_poll(&owner, Duration::days(1)))
        .await
        .unwrap();
    store.insert_vote(new_vote(poll.id, &owner, "Red")).await.unwrap();
    let err = store
        .insert_vote(new_vote(poll.id, &owner, "Blue"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)), "{:?}", err);
    assert_eq!(store.count_votes(poll.id).await.unwrap(), 1);
}

#[actix_rt::test]
#[serial]
async fn test_vote_counts_grouped_by_option() {
    let store = match setup_test_store().await {
        Some(store) => store,
        None => return,
    };

    let owner = insert_user(&store, "maya").await;
    let poll = store
        .insert_poll(new_poll(&owner, Duration::days(1)))
        .await
        .unwrap();
    assert_eq!(poll.options, vec!["Red", "Green", "Blue"]);

    for (name, option) in [("ana", "Red"), ("ben", "Blue"), ("cy", "Red")] {
        let voter = insert_user(&store, name).await;
        store.insert_vote(new_vote(poll.id, &voter, option)).await.unwrap();
    }

    let mut counts = store.count_votes_by_option(poll.id).await.unwrap();
    counts.sort_by(|a, b| a.option.cmp(&b.option));
    assert_eq!(
        counts,
        vec![
            OptionCount {
                option: "Blue".to_owned(),
                count: 1
            },
            OptionCount {
                option: "Red".to_owned(),
                count: 2
            },
        ]
    );

    let votes = store.list_poll_votes(poll.id).await.unwrap();
    assert_eq!(votes.len(), 3);
    assert_eq!(votes[0].1.as_ref().map(|u| u.name.as_str()), Some("ana"));
}

#[actix_rt::test]
#[serial]
async fn test_expiry_sweep_is_idempotent() {
    let store = match setup_test_store().await {
        Some(store) => store,
        None => return,
    };

    let owner = insert_user(&store, "maya").await;
    let expired = store
        .insert_poll(new_poll(&owner, -Duration::minutes(5)))
        .await
        .unwrap();
    let open = store
        .insert_poll(new_poll(&owner, Duration::days(1)))
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(store.close_expired_polls(now).await.unwrap(), 1);
    assert_eq!(store.close_expired_polls(now).await.unwrap(), 0);
    assert!(store.find_poll(expired.id).await.unwrap().unwrap().is_closed);
    assert!(!store.find_poll(open.id).await.unwrap().unwrap().is_closed);

    let filter = PollFilter {
        status: Some(StatusFilter::Open),
        created_by: None,
        now,
    };
    let listed = store
        .list_polls(&filter, Page::new(None, None, 10, 100))
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, open.id);
}

#[actix_rt::test]
#[serial]
async fn test_delete_poll_removes_its_votes() {
    let store = match setup_test_store().await {
        Some(store) => store,
        None => return,
    };

    let owner = insert_user(&store, "maya").await;
    let poll = store
        .insert_poll(new_poll(&owner, Duration::days(1)))
        .await
        .unwrap();
    let vote = store.insert_vote(new_vote(poll.id, &owner, "Green")).await.unwrap();

    store.delete_poll(poll.id).await.unwrap();
    assert!(store.find_poll(poll.id).await.unwrap().is_none());
    assert!(store.find_vote(vote.id).await.unwrap().is_none());
    assert!(matches!(
        store.delete_poll(poll.id).await,
        Err(StoreError::NotFound(_))
    ));
}
