//! Poll endpoints

use super::StoreData;
use crate::app_config::AppConfig;
use crate::middleware::ClientCtx;
use crate::poll::lifecycle::{self, CreatePollRequest, ListPollsQuery, UpdatePollRequest};
use crate::poll::tally;
use crate::poll::view::PollView;
use crate::response;
use actix_web::{delete, get, post, put, web, Error, Responder};
use chrono::Utc;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Literal segments ahead of `{poll_id}` matches.
    conf.service(view_poll_results)
        .service(view_admin_results)
        .service(close_poll)
        .service(reopen_poll)
        .service(create_poll)
        .service(view_polls)
        .service(view_poll)
        .service(update_poll)
        .service(delete_poll);
}

#[post("/api/polls")]
pub async fn create_poll(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    form: web::Json<CreatePollRequest>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    let store = store.get_ref().as_ref();
    let now = Utc::now();

    let poll = lifecycle::create_poll(store, user, form.into_inner(), &config.polls, now).await?;
    let poll = PollView::build(store, poll, Some(user), now).await?;

    Ok(response::created("Poll created successfully", json!({ "poll": poll })))
}

#[get("/api/polls")]
pub async fn view_polls(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    query: web::Query<ListPollsQuery>,
) -> Result<impl Responder, Error> {
    let (polls, pagination) = lifecycle::list_polls(
        store.get_ref().as_ref(),
        client.get_user(),
        &query,
        &config.polls,
        Utc::now(),
    )
    .await?;

    Ok(response::ok(
        "Polls retrieved successfully",
        json!({ "polls": polls, "pagination": pagination }),
    ))
}

#[get("/api/polls/{poll_id}")]
pub async fn view_poll(
    client: ClientCtx,
    store: StoreData,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let poll = lifecycle::get_poll(
        store.get_ref().as_ref(),
        client.get_user(),
        path.into_inner(),
        Utc::now(),
    )
    .await?;

    Ok(response::ok("Poll retrieved successfully", json!({ "poll": poll })))
}

#[put("/api/polls/{poll_id}")]
pub async fn update_poll(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
    form: web::Json<UpdatePollRequest>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    let store = store.get_ref().as_ref();
    let now = Utc::now();

    let poll = lifecycle::update_poll(
        store,
        user,
        path.into_inner(),
        form.into_inner(),
        &config.polls,
        config.auth.ownership_mismatch,
        now,
    )
    .await?;
    let poll = PollView::build(store, poll, Some(user), now).await?;

    Ok(response::ok("Poll updated successfully", json!({ "poll": poll })))
}

#[delete("/api/polls/{poll_id}")]
pub async fn delete_poll(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    lifecycle::delete_poll(
        store.get_ref().as_ref(),
        user,
        path.into_inner(),
        config.auth.ownership_mismatch,
        Utc::now(),
    )
    .await?;

    Ok(response::ok_message("Poll deleted successfully"))
}

#[post("/api/polls/{poll_id}/close")]
pub async fn close_poll(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    let store = store.get_ref().as_ref();

    let poll =
        lifecycle::close_poll(store, user, path.into_inner(), config.auth.ownership_mismatch)
            .await?;
    let poll = PollView::build(store, poll, Some(user), Utc::now()).await?;

    Ok(response::ok("Poll closed successfully", json!({ "poll": poll })))
}

#[post("/api/polls/{poll_id}/reopen")]
pub async fn reopen_poll(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    let store = store.get_ref().as_ref();
    let now = Utc::now();

    let poll = lifecycle::reopen_poll(
        store,
        user,
        path.into_inner(),
        config.auth.ownership_mismatch,
        now,
    )
    .await?;
    let poll = PollView::build(store, poll, Some(user), now).await?;

    Ok(response::ok("Poll reopened successfully", json!({ "poll": poll })))
}

#[get("/api/polls/{poll_id}/results")]
pub async fn view_poll_results(
    client: ClientCtx,
    store: StoreData,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    let results =
        tally::poll_results(store.get_ref().as_ref(), user, path.into_inner(), Utc::now()).await?;

    Ok(response::ok(
        "Poll results retrieved successfully",
        json!({ "results": results }),
    ))
}

#[get("/api/polls/{poll_id}/admin-results")]
pub async fn view_admin_results(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_admin()?;
    let results = tally::admin_results(
        store.get_ref().as_ref(),
        user,
        path.into_inner(),
        config.auth.ownership_mismatch,
        Utc::now(),
    )
    .await?;

    Ok(response::ok(
        "Admin poll results retrieved successfully",
        json!({ "results": results }),
    ))
}
