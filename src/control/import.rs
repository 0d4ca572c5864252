use crate::control::{
    issue_csrf_token, render_template, see_other, verify_csrf_token, ControlPanelAccess,
    CurrentUser, PermissionError, Response,
};
use crate::import::{ImportError, ImportService, RunImport};
use actix::Addr;
use actix_session::Session;
use actix_web::{
    get, post,
    web::{Data, Form},
};
use askama::Template;
use serde::Deserialize;
use shop_types::access::UserCredentials;
use shop_types::import::ImportReport;
use shop_types::settings::{ImportSettings, SettingRepository};

/// What the administrator sees after a run
pub struct ImportResult {
    pub messages: Vec<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl From<ImportReport> for ImportResult {
    fn from(report: ImportReport) -> Self {
        Self {
            messages: report.messages(),
            summary: Some(report.summary()),
            error: None,
        }
    }
}

impl From<ImportError> for ImportResult {
    fn from(err: ImportError) -> Self {
        Self {
            messages: vec![],
            summary: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Template)]
#[template(path = "import.html")]
struct ImportPage {
    user: Option<UserCredentials>,
    fetch_images: bool,
    csrf_token: String,
    result: Option<ImportResult>,
}

#[get("/import")]
pub async fn import_page(
    ControlPanelAccess { user }: ControlPanelAccess,
    session: Session,
    settings: Data<dyn SettingRepository>,
) -> Response {
    let settings = ImportSettings::load(settings.get_ref()).await?;
    render_template(ImportPage {
        user: Some(user),
        fetch_images: settings.fetch_images,
        csrf_token: issue_csrf_token(&session)?,
        result: None,
    })
}

#[derive(Deserialize)]
pub struct ImportForm {
    #[serde(rename = "_token", default)]
    token: String,
    fetch_images: Option<String>,
    submit: Option<String>,
}

#[post("/import")]
pub async fn run_import(
    CurrentUser { user }: CurrentUser,
    session: Session,
    Form(form): Form<ImportForm>,
    settings: Data<dyn SettingRepository>,
    service: Data<Addr<ImportService>>,
) -> Response {
    verify_csrf_token(&session, &form.token)?;
    if !user.can_manage_options() {
        return Err(PermissionError::MissingCapability.into());
    }
    if form.submit.is_none() {
        return Ok(see_other("/import"));
    }
    let import_settings = ImportSettings::from_flag(form.fetch_images.as_deref());
    import_settings.store(settings.get_ref()).await?;
    log::info!(
        "{} started an import, fetch_images = {}",
        user.login,
        import_settings.fetch_images
    );
    let result = match service.send(RunImport(import_settings)).await? {
        Ok(report) => ImportResult::from(report),
        Err(err) => {
            log::error!("Import aborted: {err}");
            ImportResult::from(err)
        }
    };
    render_template(ImportPage {
        user: Some(user),
        fetch_images: import_settings.fetch_images,
        csrf_token: issue_csrf_token(&session)?,
        result: Some(result),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::{location, session_cookie, users, ADMIN_PASSWORD, SESSION_KEY};
    use crate::control::SessionMiddlewareFactory;
    use crate::feed::HttpFeedClient;
    use crate::import::Importer;
    use crate::media::{Sideload, SideloadError};
    use crate::product::SqliteProductRepository;
    use crate::settings::SqliteSettingRepository;
    use crate::taxonomy::{SqliteTermRepository, TaxonomyResolver};
    use actix::Actor;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::{Cookie, Key};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use lazy_regex::regex_captures;
    use shop_types::media::MediaAsset;
    use shop_types::Url;
    use std::sync::Arc;
    use tokio_rusqlite::Connection;
    use typesafe_repository::async_ops::List;
    use typesafe_repository::IdentityOf;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"{"products":[{"title":"Shirt","price":10,"stock":5,"category":"Apparel","brand":"Acme","thumbnail":"http://x/a.jpg","images":["http://x/b.jpg"]},{"title":"Mug","price":4,"category":"Kitchen"}]}"#;

    struct NoopSideloader;

    #[async_trait]
    impl Sideload for NoopSideloader {
        async fn sideload(&self, _url: &Url) -> Result<IdentityOf<MediaAsset>, SideloadError> {
            Ok(Uuid::new_v4())
        }
    }

    struct Backends {
        settings: Arc<SqliteSettingRepository>,
        products: Arc<SqliteProductRepository>,
        service: Addr<ImportService>,
    }

    async fn backends(feed: &MockServer) -> Backends {
        let conn = Connection::open_in_memory().await.expect("conn");
        let settings = Arc::new(SqliteSettingRepository::init(conn.clone()).await.expect("init"));
        let products = Arc::new(SqliteProductRepository::init(conn.clone()).await.expect("init"));
        let terms = Arc::new(SqliteTermRepository::init(conn).await.expect("init"));
        let importer = Importer::new(
            products.clone(),
            TaxonomyResolver::new(terms),
            Arc::new(NoopSideloader),
        );
        let url = format!("{}/products", feed.uri()).parse().expect("url");
        let client = Arc::new(HttpFeedClient::new(reqwest::Client::new(), url));
        Backends {
            settings,
            products,
            service: ImportService::new(client, importer).start(),
        }
    }

    async fn feed(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    macro_rules! app {
        ($backends:expr) => {
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
                    .app_data(Data::from(
                        $backends.settings.clone() as Arc<dyn SettingRepository>
                    ))
                    .app_data(Data::new($backends.service.clone()))
                    .service(crate::access::controllers::log_in)
                    .service(import_page)
                    .service(run_import),
            )
            .await
        };
    }

    fn token(body: &str) -> String {
        regex_captures!(r#"name="_token" value="([A-Za-z0-9]+)""#, body)
            .map(|(_, token)| token.to_string())
            .expect("token in form")
    }

    #[actix_rt::test]
    async fn admin_runs_import_from_the_form() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        let app = app!(backends);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/import"));
        let cookie = session_cookie(&res).expect("session");

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/import")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = session_cookie(&res).expect("session");
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(!body.contains("checked"));
        let token = token(&body);

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/import")
                .cookie(cookie)
                .set_form([
                    ("_token", token.as_str()),
                    ("fetch_images", "1"),
                    ("submit", "Fetch Products"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(body.contains("Product created successfully: 2 of 2 records imported"));
        assert!(body.contains("Failed to assign brand: "));
        assert!(body.contains("checked"));
        assert_eq!(backends.products.list().await.expect("list").len(), 2);
        assert!(
            ImportSettings::load(backends.settings.as_ref())
                .await
                .expect("load")
                .fetch_images
        );
    }

    #[actix_rt::test]
    async fn broken_feed_reports_the_abort_reason() {
        let server = feed(200, "<html>").await;
        let backends = backends(&server).await;
        let app = app!(backends);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/import")
                .cookie(session_cookie(&res).expect("session"))
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&res).expect("session");
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/import")
                .cookie(cookie)
                .set_form([("_token", token(&body).as_str()), ("submit", "1")])
                .to_request(),
        )
        .await;
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(body.contains("Invalid or missing data structure."));
        assert!(backends.products.list().await.expect("list").is_empty());
    }

    #[actix_rt::test]
    async fn forged_request_is_rejected_without_importing() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        let app = app!(backends);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        let cookie: Cookie<'static> = session_cookie(&res).expect("session");
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/import")
                .cookie(cookie)
                .set_form([("_token", "forged"), ("submit", "1")])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(body.contains("Security check failed. Please try again."));
        assert!(backends.products.list().await.expect("list").is_empty());
        assert!(server
            .received_requests()
            .await
            .unwrap_or_default()
            .is_empty());
    }

    #[actix_rt::test]
    async fn user_without_capability_is_forbidden() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        let app = app!(backends);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "viewer"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/import")
                .cookie(session_cookie(&res).expect("session"))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn anonymous_user_is_sent_to_login() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        let app = app!(backends);
        let res = test::call_service(&app, test::TestRequest::get().uri("/import").to_request()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res).as_deref(), Some("/login"));
    }

    #[actix_rt::test]
    async fn form_without_submit_flag_runs_nothing() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        let app = app!(backends);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/import")
                .cookie(session_cookie(&res).expect("session"))
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&res).expect("session");
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/import")
                .cookie(cookie)
                .set_form([("_token", token(&body).as_str()), ("fetch_images", "1")])
                .to_request(),
        )
        .await;
        assert_eq!(location(&res).as_deref(), Some("/import"));
        assert!(backends.products.list().await.expect("list").is_empty());
    }

    #[actix_rt::test]
    async fn only_a_checked_box_enables_fetching() {
        let server = feed(200, FEED).await;
        let backends = backends(&server).await;
        ImportSettings { fetch_images: true }
            .store(backends.settings.as_ref())
            .await
            .expect("store");
        let app = app!(backends);
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/login")
                .set_form([("login", "admin"), ("password", ADMIN_PASSWORD)])
                .to_request(),
        )
        .await;
        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/import")
                .cookie(session_cookie(&res).expect("session"))
                .to_request(),
        )
        .await;
        let cookie = session_cookie(&res).expect("session");
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(body.contains("checked"));
        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/import")
                .cookie(cookie)
                .set_form([
                    ("_token", token(&body).as_str()),
                    ("fetch_images", "0"),
                    ("submit", "1"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(res).await.to_vec()).expect("utf8");
        assert!(!body.contains("checked"));
        assert!(
            !ImportSettings::load(backends.settings.as_ref())
                .await
                .expect("load")
                .fetch_images
        );
    }
}
