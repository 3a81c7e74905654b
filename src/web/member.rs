use super::StoreData;
use crate::error::AppError;
use crate::middleware::ClientCtx;
use crate::permission::require_self_or_admin;
use crate::response;
use crate::store::Store;
use actix_web::{get, web, Error, Responder};
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_member).service(view_members);
}

#[get("/api/auth/users/{user_id}")]
pub async fn view_member(
    client: ClientCtx,
    store: StoreData,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let viewer = client.require_login()?;
    let user_id = path.into_inner();
    require_self_or_admin(viewer, user_id)?;

    let user = store
        .find_user(user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(response::ok(
        "User retrieved successfully",
        json!({ "user": user.public_profile() }),
    ))
}

#[get("/api/auth/users")]
pub async fn view_members(client: ClientCtx, store: StoreData) -> Result<impl Responder, Error> {
    client.require_admin()?;

    let users: Vec<_> = store
        .list_users()
        .await
        .map_err(AppError::from)?
        .iter()
        .map(|u| u.public_profile())
        .collect();

    Ok(response::ok(
        "Users retrieved successfully",
        json!({ "count": users.len(), "users": users }),
    ))
}
