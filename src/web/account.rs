use super::StoreData;
use crate::create_user::USERNAME_RE;
use crate::error::AppError;
use crate::middleware::ClientCtx;
use crate::response;
use crate::store::{Store, StoreError};
use crate::user::User;
use actix_web::{get, put, web, Error, Responder};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(update_profile).service(view_me);
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(
            path = "USERNAME_RE",
            message = "Username can only contain letters, numbers, and underscores"
        )
    )]
    pub username: Option<String>,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: Option<String>,
}

impl UpdateProfileRequest {
    fn normalize(mut self) -> Self {
        self.username = self.username.map(|u| u.trim().to_owned());
        self.email = self.email.map(|e| e.trim().to_lowercase());
        self
    }
}

fn taken(message: &str) -> AppError {
    AppError::Validation {
        message: message.to_owned(),
        errors: Vec::new(),
    }
}

/// Applies the changed fields. Returns the user as stored and whether anything
/// was written.
pub async fn apply_profile_update(
    store: &dyn Store,
    user: &User,
    req: UpdateProfileRequest,
) -> Result<(User, bool), AppError> {
    let req = req.normalize();
    req.validate()?;

    let mut updated = user.clone();
    let mut changed = false;

    if let Some(name) = req.username.filter(|n| *n != user.name) {
        if store.find_user_by_name(&name).await?.is_some() {
            return Err(taken("Username already taken"));
        }
        updated.name = name;
        changed = true;
    }

    if let Some(email) = req.email.filter(|e| *e != user.email) {
        if store.find_user_by_email(&email).await?.is_some() {
            return Err(taken("Email already registered"));
        }
        updated.email = email;
        changed = true;
    }

    if !changed {
        return Ok((updated, false));
    }

    let saved = store.update_user(&updated).await.map_err(|e| match e {
        StoreError::UniqueViolation(what) => taken(&format!("{} already taken", what)),
        other => other.into(),
    })?;
    log::info!("User {} updated their profile", saved.id);
    Ok((saved, true))
}

#[get("/api/auth/me")]
pub async fn view_me(client: ClientCtx) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    Ok(response::ok(
        "Profile retrieved successfully",
        json!({ "user": user.public_profile() }),
    ))
}

#[put("/api/auth/profile")]
pub async fn update_profile(
    client: ClientCtx,
    store: StoreData,
    form: web::Json<UpdateProfileRequest>,
) -> Result<impl Responder, Error> {
    let user = client.require_login()?;
    let (user, changed) =
        apply_profile_update(store.get_ref().as_ref(), user, form.into_inner()).await?;

    let message = if changed {
        "Profile updated successfully"
    } else {
        "No changes to update"
    };
    Ok(response::ok(message, json!({ "user": user.public_profile() })))
}
