use crate::error::AppError;
use crate::permission;
use crate::session::TokenIssuer;
use crate::store::Store;
use crate::user::User;
use actix_web::dev::{self, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use chrono::Utc;
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

const NOT_AUTHORIZED: &str = "Not authorized to access this route";

/// Outcome of reading the request's bearer token.
#[derive(Clone, Debug)]
pub enum Identity {
    /// No credentials presented.
    Guest,
    /// Credentials presented but refused; carries the reason given to the client.
    Rejected(&'static str),
    /// The store could not be reached while resolving the user.
    Unavailable(String),
    User(User),
}

/// Client data stored for a single request cycle.
/// Distinct from ClientCtx because it is defined through request data.
#[derive(Clone, Debug)]
pub struct ClientCtxInner {
    pub identity: Identity,
}

impl Default for ClientCtxInner {
    fn default() -> Self {
        Self {
            identity: Identity::Guest,
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<Result<String, ()>> {
    let value = req.headers().get(header::AUTHORIZATION)?;
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());
    Some(token.ok_or(()))
}

impl ClientCtxInner {
    /// Resolves the caller: token signature and expiry, then the user record and
    /// its active flag.
    pub async fn from_request(req: &HttpRequest, store: &dyn Store, tokens: &TokenIssuer) -> Self {
        let identity = match bearer_token(req) {
            None => Identity::Guest,
            Some(Err(())) => Identity::Rejected(NOT_AUTHORIZED),
            Some(Ok(token)) => match tokens.verify(&token, Utc::now()) {
                Err(e) => {
                    log::debug!("Rejected bearer token: {}", e);
                    Identity::Rejected(NOT_AUTHORIZED)
                }
                Ok(user_id) => match store.find_user(user_id).await {
                    Ok(Some(user)) if user.is_active => Identity::User(user),
                    Ok(Some(_)) => Identity::Rejected("Account is deactivated"),
                    Ok(None) => Identity::Rejected("User not found"),
                    Err(e) => Identity::Unavailable(e.to_string()),
                },
            },
        };

        ClientCtxInner { identity }
    }
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is set at the beginning of the request.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    pub fn get_or_default_from_extensions(req: &HttpRequest) -> Self {
        let mut extensions = req.extensions_mut();
        match extensions.get::<Data<ClientCtxInner>>() {
            // Existing record in extensions; pull it and return clone.
            Some(cbox) => Self(cbox.clone()),
            // No existing record; create and insert it.
            None => {
                let cbox = Data::new(ClientCtxInner::default());
                extensions.insert(cbox.clone());
                Self(cbox)
            }
        }
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.get_user().map(|u| u.id)
    }

    /// The authenticated user. Refused credentials count as a guest here, so
    /// public routes keep working with a stale token.
    pub fn get_user(&self) -> Option<&User> {
        match &self.0.identity {
            Identity::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_user(&self) -> bool {
        self.get_user().is_some()
    }

    /// Require user to be logged in.
    pub fn require_login(&self) -> Result<&User, AppError> {
        match &self.0.identity {
            Identity::User(user) => Ok(user),
            Identity::Guest => Err(AppError::unauthenticated(NOT_AUTHORIZED)),
            Identity::Rejected(reason) => Err(AppError::unauthenticated(reason)),
            Identity::Unavailable(detail) => Err(AppError::internal(detail)),
        }
    }

    /// Require a logged in admin.
    pub fn require_admin(&self) -> Result<&User, AppError> {
        let user = self.require_login()?;
        permission::require_admin(user)?;
        Ok(user)
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    /// The associated error which can be returned.
    type Error = Error;
    /// Future that resolves to a Self.
    type Future = Ready<Result<Self, Self::Error>>;

    /// Create a Self from request parts asynchronously.
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientCtx::get_or_default_from_extensions(req)))
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Client context middleware
pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        Box::pin(async move {
            let store = req.app_data::<Data<Arc<dyn Store>>>().cloned();
            let tokens = req.app_data::<Data<TokenIssuer>>().cloned();

            // Without a store or token issuer there is nobody to resolve; handlers see a guest.
            if let (Some(store), Some(tokens)) = (store, tokens) {
                let store: &dyn Store = store.get_ref().as_ref();
                let inner = ClientCtxInner::from_request(req.request(), store, &tokens).await;
                req.extensions_mut().insert(Data::new(inner));
            } else {
                log::error!("Client context middleware is missing its store or token issuer");
            }

            svc.call(req).await
        })
    }
}
