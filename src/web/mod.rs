pub mod account;
pub mod error;
pub mod health;
pub mod login;
pub mod member;
pub mod polls;
pub mod votes;

use crate::app_config::AppConfig;
use crate::middleware::ClientCtx;
use crate::rate_limit::RateLimiter;
use crate::session::TokenIssuer;
use crate::store::Store;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::App;
use std::sync::Arc;

/// The store as handlers extract it.
pub type StoreData = Data<Arc<dyn Store>>;

/// Everything the app shares between workers.
#[derive(Clone)]
pub struct AppState {
    pub store: StoreData,
    pub tokens: Data<TokenIssuer>,
    pub limiter: Data<RateLimiter>,
    pub config: Data<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            store: Data::new(store),
            tokens: Data::new(TokenIssuer::new(
                &config.auth.secret_key,
                config.auth.token_ttl(),
            )),
            limiter: Data::new(RateLimiter::new(config.rate_limit.clone())),
            config: Data::new(config),
        }
    }
}

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Route resolution will stop at the first match.
    health::configure(conf);
    login::configure(conf);
    account::configure(conf);
    member::configure(conf);
    polls::configure(conf);
    votes::configure(conf);

    conf.service(crate::create_user::post_register_admin)
        .service(crate::create_user::post_register);
}

/// Builds the application around `state`. Used by the server and by tests.
pub fn app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
    App::new()
        .app_data(state.store)
        .app_data(state.tokens)
        .app_data(state.limiter)
        .app_data(state.config)
        .app_data(error::json_config())
        .app_data(error::path_config())
        .app_data(error::query_config())
        // Security headers - applied to all responses
        .wrap(
            DefaultHeaders::new()
                .add((header::X_FRAME_OPTIONS, "DENY"))
                .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                .add(("X-XSS-Protection", "0"))
                .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
        )
        .wrap(ClientCtx::default())
        .wrap(Logger::new("%a %r %s %Dms"))
        .configure(configure)
        .default_service(actix_web::web::route().to(error::route_not_found))
}
