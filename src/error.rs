//! Request-level error type.
//!
//! Every failure a handler can produce ends up as an [`AppError`], which renders
//! itself into the JSON envelope with the matching status code.

use crate::response::Envelope;
use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Internal error details are only written into responses in development.
static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

pub fn expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

/// A single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Display)]
pub enum AppError {
    /// Malformed input; field errors are surfaced verbatim.
    #[display(fmt = "{}", message)]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    #[display(fmt = "{}", _0)]
    Unauthenticated(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{} not found", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    PollClosed(String),
    #[display(fmt = "You have already voted on this poll")]
    DuplicateVote,
    #[display(fmt = "Invalid option selected")]
    InvalidOption,
    #[display(fmt = "{}", _0)]
    InvalidState(String),
    #[display(fmt = "Too many requests, please try again in {} seconds", retry_after_seconds)]
    TooManyRequests { retry_after_seconds: u64 },
    /// Unexpected failure. The detail is logged, not shown in production.
    #[display(fmt = "Internal server error")]
    Internal(String),
}

impl AppError {
    /// A validation failure on one field, whose message doubles as the summary.
    pub fn invalid(field: &str, message: &str) -> Self {
        AppError::Validation {
            message: message.to_owned(),
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(resource.to_owned())
    }

    pub fn unauthenticated(message: &str) -> Self {
        AppError::Unauthenticated(message.to_owned())
    }

    pub fn forbidden(message: &str) -> Self {
        AppError::Forbidden(message.to_owned())
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        AppError::Internal(detail.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(what) => AppError::Validation {
                message: format!("{} already exists", what),
                errors: Vec::new(),
            },
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Database(_) => AppError::internal(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errs: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errs.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        let errors = fields
            .into_iter()
            .flat_map(|(field, list)| {
                list.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    FieldError::new(field, message)
                })
            })
            .collect();

        AppError::Validation {
            message: "Validation failed".to_owned(),
            errors,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::PollClosed(_)
            | AppError::DuplicateVote
            | AppError::InvalidOption
            | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = Envelope::<()>::failure(self.to_string());

        match self {
            AppError::Validation { errors, .. } if !errors.is_empty() => {
                body.errors = Some(errors.clone());
            }
            AppError::Internal(detail) => {
                log::error!("internal error: {}", detail);
                if EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                    body.error = Some(detail.clone());
                }
            }
            _ => {}
        }

        let mut res = HttpResponse::build(self.status_code());
        if let AppError::TooManyRequests {
            retry_after_seconds,
        } = self
        {
            res.insert_header(("Retry-After", retry_after_seconds.to_string()));
        }
        res.json(body)
    }
}
