//! Extractor failures and unknown routes, answered in the JSON envelope.

use crate::error::AppError;
use crate::response::Envelope;
use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::web::{JsonConfig, PathConfig, QueryConfig};
use actix_web::{HttpRequest, HttpResponse};

/// Largest accepted JSON body.
const JSON_LIMIT: usize = 64 * 1024;

fn bad_request(message: String) -> actix_web::Error {
    AppError::Validation {
        message,
        errors: Vec::new(),
    }
    .into()
}

pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            log::debug!("Rejected JSON body: {}", err);
            let message = match &err {
                JsonPayloadError::ContentType => "Expected a JSON body".to_owned(),
                JsonPayloadError::Deserialize(e) => format!("Invalid request body: {}", e),
                JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
                    "Request body too large".to_owned()
                }
                _ => "Invalid request body".to_owned(),
            };
            bad_request(message)
        })
}

pub fn path_config() -> PathConfig {
    PathConfig::default().error_handler(|err: PathError, req: &HttpRequest| {
        log::debug!("Rejected path {}: {}", req.path(), err);
        bad_request("Invalid ID".to_owned())
    })
}

pub fn query_config() -> QueryConfig {
    QueryConfig::default().error_handler(|err: QueryPayloadError, _req: &HttpRequest| {
        bad_request(format!("Invalid query string: {}", err))
    })
}

pub async fn route_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(Envelope::<()>::failure("Route not found"))
}
