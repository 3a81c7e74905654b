use super::StoreData;
use crate::create_user::AuthPayload;
use crate::error::AppError;
use crate::ip::rate_limit_key;
use crate::rate_limit::RateLimiter;
use crate::response;
use crate::session::{verify_password, TokenIssuer};
use crate::store::{Store, StoreError};
use crate::user::User;
use actix_web::{post, web, Error, HttpRequest, Responder};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(post_login);
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Debug)]
pub enum LoginResultStatus {
    Success,
    BadEmail,
    BadPassword,
    Deactivated,
}

pub struct LoginResult {
    result: LoginResultStatus,
    user: Option<User>,
}

impl LoginResult {
    fn success(user: User) -> Self {
        Self {
            result: LoginResultStatus::Success,
            user: Some(user),
        }
    }
    fn fail(result: LoginResultStatus) -> Self {
        Self { result, user: None }
    }
}

/// Checks credentials. The password is verified before the active flag so a
/// deactivated account is only reported to someone who knows its password.
pub async fn login(store: &dyn Store, email: &str, pass: &str) -> Result<LoginResult, StoreError> {
    let user = match store.find_user_by_email(email).await? {
        Some(user) => user,
        None => return Ok(LoginResult::fail(LoginResultStatus::BadEmail)),
    };

    if !verify_password(pass, &user.password) {
        return Ok(LoginResult::fail(LoginResultStatus::BadPassword));
    }

    if !user.is_active {
        return Ok(LoginResult::fail(LoginResultStatus::Deactivated));
    }

    Ok(LoginResult::success(user))
}

#[post("/api/auth/login")]
pub async fn post_login(
    req: HttpRequest,
    store: StoreData,
    tokens: web::Data<TokenIssuer>,
    limiter: web::Data<RateLimiter>,
    form: web::Json<LoginRequest>,
) -> Result<impl Responder, Error> {
    limiter
        .check_auth_rate_limit(&rate_limit_key(&req))
        .map_err(AppError::from)?;

    let mut form = form.into_inner();
    form.email = form.email.trim().to_lowercase();
    form.validate().map_err(AppError::from)?;

    let outcome = login(store.get_ref().as_ref(), &form.email, &form.password)
        .await
        .map_err(AppError::from)?;

    let user = match (outcome.result, outcome.user) {
        (LoginResultStatus::Success, Some(user)) => user,
        (LoginResultStatus::Deactivated, _) => {
            log::info!("Login attempt on deactivated account: {}", form.email);
            return Err(AppError::unauthenticated("Account is deactivated").into());
        }
        (status, _) => {
            log::debug!("login failure: {:?} for {}", status, form.email);
            // Same message for both, so emails cannot be enumerated.
            return Err(AppError::unauthenticated("Invalid credentials").into());
        }
    };

    Ok(response::ok(
        "Login successful",
        AuthPayload::new(&user, &tokens, Utc::now()),
    ))
}
