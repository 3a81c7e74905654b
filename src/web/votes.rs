//! Vote endpoints

use super::StoreData;
use crate::app_config::AppConfig;
use crate::error::AppError;
use crate::ip::vote_metadata;
use crate::middleware::ClientCtx;
use crate::poll::tally;
use crate::poll::voting::{self, CastVoteRequest, VoteView};
use crate::rate_limit::RateLimiter;
use crate::response;
use crate::store::Page;
use actix_web::{delete, get, post, web, Error, HttpRequest, Responder};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(cast_vote)
        .service(view_my_votes)
        .service(view_poll_stats)
        .service(view_my_vote)
        .service(delete_vote);
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[post("/api/votes")]
pub async fn cast_vote(
    req: HttpRequest,
    client: ClientCtx,
    store: StoreData,
    limiter: web::Data<RateLimiter>,
    form: web::Json<CastVoteRequest>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    limiter
        .check_vote_rate_limit(user.id)
        .map_err(AppError::from)?;

    let vote = voting::cast_vote(
        store.get_ref().as_ref(),
        user,
        form.into_inner(),
        vote_metadata(&req),
        Utc::now(),
    )
    .await?;

    Ok(response::created(
        "Vote cast successfully",
        json!({ "vote": VoteView::from(vote) }),
    ))
}

#[get("/api/votes/user")]
pub async fn view_my_votes(
    client: ClientCtx,
    store: StoreData,
    config: web::Data<AppConfig>,
    query: web::Query<HistoryQuery>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    let page = Page::new(
        query.page,
        query.limit,
        config.polls.default_page_size,
        config.polls.max_page_size,
    );

    let (votes, pagination) = voting::vote_history(store.get_ref().as_ref(), user, page).await?;

    Ok(response::ok(
        "User votes retrieved successfully",
        json!({ "votes": votes, "pagination": pagination }),
    ))
}

#[get("/api/votes/poll/{poll_id}/stats")]
pub async fn view_poll_stats(
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
        "Vote statistics retrieved successfully",
        json!({ "results": results }),
    ))
}

#[get("/api/votes/poll/{poll_id}")]
pub async fn view_my_vote(
    client: ClientCtx,
    store: StoreData,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    let vote = voting::my_vote(store.get_ref().as_ref(), user, path.into_inner()).await?;

    Ok(response::ok(
        "Vote retrieved successfully",
        json!({ "vote": VoteView::from(vote) }),
    ))
}

#[delete("/api/votes/{vote_id}")]
pub async fn delete_vote(
    client: ClientCtx,
    store: StoreData,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    voting::delete_vote(store.get_ref().as_ref(), user, path.into_inner(), Utc::now()).await?;

    Ok(response::ok_message("Vote deleted successfully"))
}
