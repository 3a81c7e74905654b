use crate::response;
use actix_web::{get, Responder};
use chrono::Utc;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_health);
}

#[get("/api/health")]
pub async fn view_health() -> impl Responder {
    response::ok(
        "Server is running",
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now(),
        }),
    )
}
