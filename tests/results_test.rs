//! Result visibility and tally integration tests

mod common;

use actix_web::{http::StatusCode, test};
use chrono::{Duration, Utc};
use common::fixtures::{create_open_poll, create_test_admin, create_test_poll, create_test_user};
use pollbox::poll::NewVote;
use pollbox::store::{MemoryStore, Store};
use pollbox::user::Role;
use serde_json::{json, Value};

async fn cast(store: &MemoryStore, poll_id: i32, user_id: i32, option: &str) {
    store
        .insert_vote(NewVote {
            poll_id,
            user_id,
            selected_option: option.to_owned(),
            ip_address: None,
            user_agent: None,
        })
        .await
        .unwrap();
}

fn results_request(token: &str, path: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(path)
        .insert_header(common::bearer(token))
}

#[actix_rt::test]
async fn test_participant_sees_results_only_after_close() {
    let (state, store) = common::test_state();
    let admin = create_test_admin(&state, &store, "maya").await;
    let voter = create_test_user(&state, &store, "rita", Role::User).await;
    let bystander = create_test_user(&state, &store, "sam", Role::User).await;
    let poll = create_open_poll(&store, &admin, &["A", "B"]).await;
    cast(&store, poll.id, voter.id(), "A").await;
    let app = test::init_service(pollbox::web::app(state)).await;
    let path = format!("/api/polls/{}/results", poll.id);

    let resp = test::call_service(&app, results_request(&bystander.token, &path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "You must vote before viewing results");

    let resp = test::call_service(&app, results_request(&voter.token, &path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Results are only available after poll closes");

    let req = test::TestRequest::post()
        .uri(&format!("/api/polls/{}/close", poll.id))
        .insert_header(common::bearer(&admin.token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let resp = test::call_service(&app, results_request(&voter.token, &path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let results = &body["data"]["results"];
    assert_eq!(results["total_votes"], 1);
    assert_eq!(results["winners"], json!(["A"]));
    assert!(results.get("individual_votes").is_none());

    let req = test::TestRequest::get().uri(&path).to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_rt::test]
async fn test_even_split_reports_both_winners() {
    let (state, store) = common::test_state();
    let admin = create_test_admin(&state, &store, "maya").await;
    let first = create_test_user(&state, &store, "rita", Role::User).await;
    let second = create_test_user(&state, &store, "sam", Role::User).await;
    let poll = create_test_poll(&store, &admin, &["A", "B", "C"], Utc::now() + Duration::hours(1)).await;
    cast(&store, poll.id, first.id(), "A").await;
    cast(&store, poll.id, second.id(), "B").await;
    let app = test::init_service(pollbox::web::app(state)).await;

    let path = format!("/api/polls/{}/admin-results", poll.id);
    let resp = test::call_service(&app, results_request(&admin.token, &path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let results = &body["data"]["results"];

    assert_eq!(results["total_votes"], 2);
    assert_eq!(
        results["option_results"],
        json!([
            { "option": "A", "votes": 1, "percentage": 50 },
            { "option": "B", "votes": 1, "percentage": 50 },
            { "option": "C", "votes": 0, "percentage": 0 },
        ])
    );
    assert_eq!(results["winners"], json!(["A", "B"]));

    let voters = results["individual_votes"].as_array().unwrap();
    assert_eq!(voters.len(), 2);
    assert_eq!(voters[0]["voter"]["username"], "rita");
    assert_eq!(voters[0]["selected_option"], "A");
}

#[actix_rt::test]
async fn test_owner_views_without_voting_and_stats_route_matches() {
    let (state, store) = common::test_state();
    let admin = create_test_admin(&state, &store, "maya").await;
    let other = create_test_admin(&state, &store, "otto").await;
    let voter = create_test_user(&state, &store, "rita", Role::User).await;
    let poll = create_open_poll(&store, &admin, &["A", "B"]).await;
    cast(&store, poll.id, voter.id(), "B").await;
    let app = test::init_service(pollbox::web::app(state)).await;

    // Owner sees the open poll's results through the participant route as well.
    let path = format!("/api/polls/{}/results", poll.id);
    let resp = test::call_service(&app, results_request(&admin.token, &path).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stats = format!("/api/votes/poll/{}/stats", poll.id);
    let resp = test::call_service(&app, results_request(&admin.token, &stats).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["results"]["winners"], json!(["B"]));

    let resp = test::call_service(&app, results_request(&other.token, &stats).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, results_request(&voter.token, &stats).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn test_anonymous_poll_hides_voters() {
    let (state, store) = common::test_state();
    let admin = create_test_admin(&state, &store, "maya").await;
    let voter = create_test_user(&state, &store, "rita", Role::User).await;
    let mut poll = create_open_poll(&store, &admin, &["A", "B"]).await;
    poll.is_anonymous = true;
    store.update_poll(&poll).await.unwrap();
    cast(&store, poll.id, voter.id(), "A").await;
    let app = test::init_service(pollbox::web::app(state)).await;

    let path = format!("/api/polls/{}/admin-results", poll.id);
    let resp = test::call_service(&app, results_request(&admin.token, &path).to_request()).await;
    let body: Value = test::read_body_json(resp).await;
    let results = &body["data"]["results"];
    assert_eq!(results["total_votes"], 1);
    assert!(results.get("individual_votes").is_none());
}
