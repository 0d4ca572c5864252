use actix::fut::{ready, Ready};
use actix_session::Session;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::ContentType,
    web::Data,
    FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use anyhow::{anyhow, Context};
use askama::Template;
use derive_more::{Display, Error};
use futures_util::future::LocalBoxFuture;
use log_error::LogError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use shop_types::access::repository::UserCredentialsRepository;
use shop_types::access::{Login, UserCredentials};
use std::sync::Arc;

pub mod import;
pub mod product;

pub type Response = Result<HttpResponse, ControllerError>;

const LOGIN_KEY: &str = "login";
const CSRF_KEY: &str = "csrf_token";
const CSRF_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Display, Error)]
pub enum ControllerError {
    NotFound,
    Unauthorized,
    Forbidden,
    #[error(ignore)]
    InternalServerError(anyhow::Error),
    #[error(ignore)]
    #[display("Invalid field {field}")]
    InvalidInput { field: String, msg: String },
}

/// Rejection of an administrative request. The import does not run.
#[derive(Debug, Display, Error)]
pub enum PermissionError {
    #[display("Security check failed. Please try again.")]
    InvalidToken,
    #[display("Security check failed. Please try again.")]
    MissingCapability,
}

impl From<PermissionError> for ControllerError {
    fn from(err: PermissionError) -> Self {
        log::warn!("Permission denied: {err:?}");
        Self::Forbidden
    }
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<actix::MailboxError> for ControllerError {
    fn from(err: actix::MailboxError) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl actix_web::error::ResponseError for ControllerError {
    fn error_response(&self) -> HttpResponse {
        log::warn!("{self:?}");
        use ControllerError::*;
        match self {
            NotFound => NotFoundPage { user: None }
                .render()
                .log_error("Unable to render error template")
                .map(|res| {
                    HttpResponse::NotFound()
                        .content_type(ContentType::html())
                        .body(res)
                })
                .unwrap_or_else(|| HttpResponse::NotFound().body(())),
            Unauthorized => HttpResponse::SeeOther()
                .insert_header(("Location", "/login"))
                .body(()),
            Forbidden => ForbiddenPage {
                user: None,
                message: PermissionError::InvalidToken.to_string(),
            }
            .render()
            .log_error("Unable to render error template")
            .map(|res| {
                HttpResponse::Forbidden()
                    .content_type(ContentType::html())
                    .body(res)
            })
            .unwrap_or_else(|| HttpResponse::Forbidden().body(())),
            InternalServerError(err) => InternalServerErrorPage {
                error: format!("{err:?}"),
                user: None,
            }
            .render()
            .log_error("Unable to render error template")
            .map(|res| {
                HttpResponse::InternalServerError()
                    .content_type(ContentType::html())
                    .body(res)
            })
            .unwrap_or_else(|| HttpResponse::InternalServerError().body(err.to_string())),
            InvalidInput { field, msg } => {
                HttpResponse::BadRequest().body(format!("{field}\n{msg}"))
            }
        }
    }
}

#[derive(Template)]
#[template(path = "500.html")]
pub struct InternalServerErrorPage {
    error: String,
    user: Option<UserCredentials>,
}

#[derive(Template)]
#[template(path = "404.html")]
pub struct NotFoundPage {
    user: Option<UserCredentials>,
}

pub async fn not_found(user: Option<CurrentUser>) -> Response {
    render_template(NotFoundPage {
        user: user.map(|u| u.user),
    })
}

#[derive(Template)]
#[template(path = "403.html")]
pub struct ForbiddenPage {
    user: Option<UserCredentials>,
    message: String,
}

#[derive(Clone)]
pub struct Identity {
    pub login: String,
}

impl FromRequest for Identity {
    type Error = ControllerError;
    type Future = Ready<Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(ControllerError::Unauthorized),
        )
    }
}

/// Logged in user loaded from the user store
pub struct CurrentUser {
    pub user: UserCredentials,
}

impl FromRequest for CurrentUser {
    type Error = ControllerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let login = Login(Identity::extract(&req).await?.login);
            let repo = Data::<dyn UserCredentialsRepository>::extract(&req)
                .await
                .map_err(|_err| anyhow!("Unable to extract UserCredentialsRepository from request"))?;
            let user = repo
                .get_one(&login)
                .await?
                .ok_or(ControllerError::Unauthorized)?;
            Ok(Self { user })
        })
    }
}

/// User allowed to manage options and run imports
pub struct ControlPanelAccess {
    pub user: UserCredentials,
}

impl FromRequest for ControlPanelAccess {
    type Error = ControllerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = CurrentUser::extract(&req).await?.user;
            if user.can_manage_options() {
                Ok(Self { user })
            } else {
                Err(PermissionError::MissingCapability.into())
            }
        })
    }
}

pub struct SessionMiddlewareFactory {}

impl<S, B: 'static> Transform<S, ServiceRequest> for SessionMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = SessionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddleware {
            service: Arc::new(service),
        }))
    }
}

/// Puts the [`Identity`] stored in the session into request extensions
pub struct SessionMiddleware<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        Box::pin(async move {
            let session = req.extract::<Session>().await?;
            match session.get::<String>(LOGIN_KEY) {
                Ok(Some(login)) => {
                    req.extensions_mut().insert(Identity { login });
                }
                Err(err) => {
                    log::error!("Unable to extract login from session:\n{err:?}");
                }
                _ => (),
            }
            service.call(req).await
        })
    }
}

pub fn remember_login(session: &Session, login: &Login) -> Result<(), ControllerError> {
    session
        .insert(LOGIN_KEY, &login.0)
        .context("Unable to insert login into session")?;
    Ok(())
}

/// Stores a fresh form token in the session and returns it
pub fn issue_csrf_token(session: &Session) -> Result<String, ControllerError> {
    let token = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect::<String>();
    session
        .insert(CSRF_KEY, &token)
        .context("Unable to insert CSRF token into session")?;
    Ok(token)
}

pub fn verify_csrf_token(session: &Session, token: &str) -> Result<(), PermissionError> {
    match session.get::<String>(CSRF_KEY) {
        Ok(Some(expected)) if !token.is_empty() && expected == token => Ok(()),
        Ok(_) => Err(PermissionError::InvalidToken),
        Err(err) => {
            log::error!("Unable to read CSRF token from session: {err:?}");
            Err(PermissionError::InvalidToken)
        }
    }
}

pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header(("Location", location))
        .finish()
}

pub fn render_template(t: impl Template) -> Result<HttpResponse, ControllerError> {
    let result = t
        .render()
        .map_err(|x| ControllerError::InternalServerError(anyhow!(x)))?;
    Ok(HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(result))
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::access::repository::SqliteUserCredentialsRepository;
    use crate::access::tests::FAST_ARGON;
    use actix_web::cookie::Cookie;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::header::LOCATION;
    use shop_types::access::repository::UserCredentialsRepository;
    use shop_types::access::{generate_salt, Access, Login, Password, UserCredentials};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tokio_rusqlite::Connection;
    use typesafe_repository::async_ops::Save;

    pub const ADMIN_PASSWORD: &str = "admin-pass";
    pub const SESSION_KEY: [u8; 64] = [7; 64];

    /// User store holding `admin` with control panel access and `viewer` with none
    pub async fn users() -> Arc<dyn UserCredentialsRepository> {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = SqliteUserCredentialsRepository::init(conn).await.expect("init");
        for (login, access) in [
            ("admin", BTreeSet::from([Access::ControlPanel])),
            ("viewer", BTreeSet::new()),
        ] {
            repo.save(UserCredentials {
                login: Login(login.to_string()),
                password: Password::generate_with(
                    ADMIN_PASSWORD.to_string(),
                    generate_salt(),
                    &FAST_ARGON,
                )
                .expect("password"),
                access,
            })
            .await
            .expect("save");
        }
        Arc::new(repo)
    }

    pub fn session_cookie<B>(res: &ServiceResponse<B>) -> Option<Cookie<'static>> {
        res.response()
            .cookies()
            .find(|c| c.name() == "id")
            .map(Cookie::into_owned)
    }

    pub fn location<B>(res: &ServiceResponse<B>) -> Option<String> {
        res.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    }
}
