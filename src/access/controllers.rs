use crate::control::{remember_login, render_template, see_other, Response};
use actix_session::Session;
use actix_web::{
    get, post,
    web::{Data, Form, Query},
};
use anyhow::Context as AnyhowContext;
use askama::Template;
use serde::Deserialize;
use shop_types::access::repository::UserCredentialsRepository;
use shop_types::access::{Login, UserCredentials};

#[derive(Deserialize)]
pub struct LoginDto {
    pub login: Login,
    pub password: String,
}

#[post("/login")]
pub async fn log_in(
    form: Form<LoginDto>,
    session: Session,
    repo: Data<dyn UserCredentialsRepository>,
) -> Response {
    let creds = match repo.get_one(&form.login).await? {
        Some(c) => c,
        None => {
            log::info!("Creds not found for {}", form.login);
            return Ok(see_other("/login?invalid"));
        }
    };
    if creds
        .password
        .check(&form.password)
        .context("Unable to verify password")?
    {
        remember_login(&session, &creds.login)?;
        Ok(see_other("/import"))
    } else {
        Ok(see_other("/login?invalid"))
    }
}

#[get("/logout")]
pub async fn log_out(session: Session) -> Response {
    session.clear();
    Ok(see_other("/login"))
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage {
    err: bool,
    user: Option<UserCredentials>,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    invalid: Option<String>,
}

#[get("/login")]
pub async fn login_page(q: Query<LoginQuery>) -> Response {
    render_template(LoginPage {
        err: q.invalid.is_some(),
        user: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::{location, session_cookie, users, ADMIN_PASSWORD, SESSION_KEY};
    use crate::control::{CurrentUser, SessionMiddlewareFactory};
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::Key;
    use actix_web::http::StatusCode;
    use actix_web::{test, App, HttpResponse};

    #[get("/whoami")]
    async fn whoami(CurrentUser { user }: CurrentUser) -> HttpResponse {
        HttpResponse::Ok().body(user.login.0)
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(SessionMiddlewareFactory {})
                    .wrap(
                        SessionMiddleware::builder(
                            CookieSessionStore::default(),
                            Key::from(&SESSION_KEY[..]),
                        )
                        .cookie_secure(false)
                        .build(),
                    )
                    .app_data(Data::from(users().await))
                    .service(log_in)
                    .service(log_out)
                    .service(login_page)
                    .service(whoami),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn valid_credentials_open_a_session() {
        let app = app!();
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&res).expect("session");
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/whoami")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(test::read_body(res).await, "admin");
    }

    #[actix_rt::test]
    async fn wrong_password_is_sent_back() {
        let app = app!();
        for (login, password) in [("admin", "wrong-pass"), ("nobody", ADMIN_PASSWORD)] {
            let res = test::call_service(
                &app,
                test::TestRequest::post()
                    .uri("/login")
                    .set_form([("login", login), ("password", password)])
                    .to_request(),
            )
            .await;
            assert_eq!(location(&res).as_deref(), Some("/login?invalid"));
        }
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/login?invalid").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn anonymous_requests_are_redirected() {
        let app = app!();
        let res = test::call_service(&app, test::TestRequest::get().uri("/whoami").to_request()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res).as_deref(), Some("/login"));
    }
}
