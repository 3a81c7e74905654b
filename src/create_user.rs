use crate::app_config::AppConfig;
use crate::error::AppError;
use crate::ip::rate_limit_key;
use crate::rate_limit::RateLimiter;
use crate::response;
use crate::session::{hash_password, TokenIssuer};
use crate::store::{Store, StoreError};
use crate::user::{NewUser, PublicProfile, Role, User};
use crate::web::StoreData;
use actix_web::{post, web, Error, HttpRequest, Responder};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

pub(crate) static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("Invalid username regex"));

const ALREADY_EXISTS: &str = "User with this email or username already exists";

/// Requires a lower-case letter, an upper-case letter and a digit.
pub(crate) fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());

    if lower && upper && digit {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(Cow::Borrowed(
            "Password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
        Err(err)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        regex(
            path = "USERNAME_RE",
            message = "Username can only contain letters, numbers, and underscores"
        )
    )]
    pub username: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[validate(
        length(min = 6, message = "Password must be at least 6 characters long"),
        custom = "validate_password_strength"
    )]
    pub password: String,
}

impl RegisterRequest {
    pub fn normalize(mut self) -> Self {
        self.username = self.username.trim().to_owned();
        self.email = self.email.trim().to_lowercase();
        self
    }
}

/// What a successful registration or login hands back.
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: PublicProfile,
    pub token: String,
}

impl AuthPayload {
    pub fn new(user: &User, tokens: &TokenIssuer, now: DateTime<Utc>) -> Self {
        Self {
            user: user.public_profile(),
            token: tokens.issue(user.id, now),
        }
    }
}

fn already_exists() -> AppError {
    AppError::Validation {
        message: ALREADY_EXISTS.to_owned(),
        errors: Vec::new(),
    }
}

async fn insert_new_user(store: &dyn Store, req: RegisterRequest, role: Role) -> Result<User, AppError> {
    let req = req.normalize();
    req.validate()?;

    if store.find_user_by_email(&req.email).await?.is_some()
        || store.find_user_by_name(&req.username).await?.is_some()
    {
        return Err(already_exists());
    }

    let password = hash_password(&req.password).map_err(|e| {
        log::error!("Failed to hash password: {}", e);
        AppError::internal("Failed to hash password")
    })?;

    store
        .insert_user(NewUser {
            name: req.username,
            email: req.email,
            password,
            role,
        })
        .await
        .map_err(|e| match e {
            // Raced with another registration for the same name or email.
            StoreError::UniqueViolation(_) => already_exists(),
            other => other.into(),
        })
}

/// Creates the account and signs it in.
pub async fn register(
    store: &dyn Store,
    tokens: &TokenIssuer,
    req: RegisterRequest,
    role: Role,
    now: DateTime<Utc>,
) -> Result<AuthPayload, AppError> {
    let user = insert_new_user(store, req, role).await?;
    log::info!(
        "New {} registered: {} (user_id: {})",
        user.role.as_str(),
        user.name,
        user.id
    );
    Ok(AuthPayload::new(&user, tokens, now))
}

#[post("/api/auth/register")]
pub async fn post_register(
    req: HttpRequest,
    store: StoreData,
    tokens: web::Data<TokenIssuer>,
    limiter: web::Data<RateLimiter>,
    form: web::Json<RegisterRequest>,
) -> Result<impl Responder, Error> {
    limiter
        .check_auth_rate_limit(&rate_limit_key(&req))
        .map_err(AppError::from)?;

    let payload = register(
        store.get_ref().as_ref(),
        &tokens,
        form.into_inner(),
        Role::User,
        Utc::now(),
    )
    .await?;

    Ok(response::created("User registered successfully", payload))
}

#[post("/api/auth/register/admin")]
pub async fn post_register_admin(
    req: HttpRequest,
    store: StoreData,
    tokens: web::Data<TokenIssuer>,
    limiter: web::Data<RateLimiter>,
    config: web::Data<AppConfig>,
    form: web::Json<RegisterRequest>,
) -> Result<impl Responder, Error> {
    if !config.auth.allow_admin_registration {
        return Err(AppError::forbidden("Admin registration is disabled").into());
    }
    limiter
        .check_auth_rate_limit(&rate_limit_key(&req))
        .map_err(AppError::from)?;

    let payload = register(
        store.get_ref().as_ref(),
        &tokens,
        form.into_inner(),
        Role::Admin,
        Utc::now(),
    )
    .await?;

    Ok(response::created("Admin registered successfully", payload))
}
