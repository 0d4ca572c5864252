use actix::prelude::*;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::middleware::TrailingSlash;
use actix_web::{web, web::Data, web::FormConfig, App, HttpServer};
use anyhow::Context as AnyhowContext;
use fetch_to_shop::{
    access,
    config::{self, Config},
    control,
    feed::HttpFeedClient,
    import::{ImportService, Importer},
    media::{FileSystemMediaStore, HttpDownloader, Sideloader, SqliteMediaAssetRepository},
    product::SqliteProductRepository,
    settings::{self, SqliteSettingRepository},
    taxonomy::{SqliteTermRepository, TaxonomyResolver},
};
use reqwest::header::{HeaderMap, HeaderValue};
use shop_types::access::repository::UserCredentialsRepository;
use shop_types::access::DEFAULT_ARGON_CONFIG;
use shop_types::media::MediaAssetRepository;
use shop_types::product::ProductRepository;
use shop_types::settings::SettingRepository;
use shop_types::term::TermRepository;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_rusqlite::Connection;

static DEFAULT_ACCEPT_ENCODING: &str = "br;q=1.0, gzip;q=0.6, deflate;q=0.4, *;q=0.2";
const DATABASE: &str = "shop.db";
const TEMP_DIR: &str = ".tmp";

enum Command {
    Install,
    Uninstall,
    Serve,
}

impl TryFrom<Option<String>> for Command {
    type Error = anyhow::Error;

    fn try_from(arg: Option<String>) -> Result<Self, Self::Error> {
        match arg.as_deref() {
            None | Some("serve") => Ok(Self::Serve),
            Some("install") => Ok(Self::Install),
            Some("uninstall") => Ok(Self::Uninstall),
            Some(other) => Err(anyhow::anyhow!(
                "Unknown command {other}, expected one of: serve, install, uninstall"
            )),
        }
    }
}

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    let command = Command::try_from(env::args().nth(1))?;
    config::load_env_file()?;
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("Unable to create {}", config.storage_dir.display()))?;
    let conn = Connection::open(config.storage(DATABASE)).await?;
    let setting_repository: Arc<dyn SettingRepository> =
        Arc::new(SqliteSettingRepository::init(conn.clone()).await?);

    match command {
        Command::Install => {
            settings::install(setting_repository.as_ref()).await?;
            log::info!("Installed");
            return Ok(());
        }
        Command::Uninstall => {
            settings::uninstall(setting_repository.as_ref()).await?;
            log::info!("Uninstalled");
            return Ok(());
        }
        Command::Serve => settings::install(setting_repository.as_ref()).await?,
    }

    let temp_dir = config.uploads_dir.join(TEMP_DIR);
    std::fs::create_dir_all(&temp_dir)
        .with_context(|| format!("Unable to create {}", temp_dir.display()))?;

    let term_repository: Arc<dyn TermRepository> =
        Arc::new(SqliteTermRepository::init(conn.clone()).await?);
    let product_repository: Arc<dyn ProductRepository> =
        Arc::new(SqliteProductRepository::init(conn.clone()).await?);
    let media_repository: Arc<dyn MediaAssetRepository> =
        Arc::new(SqliteMediaAssetRepository::init(conn.clone()).await?);
    let user_credentials_repository: Arc<dyn UserCredentialsRepository> = Arc::new(
        access::repository::SqliteUserCredentialsRepository::init(conn).await?,
    );

    access::ensure_admin(
        user_credentials_repository.as_ref(),
        &config.admin_login,
        config.admin_password.clone(),
        &DEFAULT_ARGON_CONFIG,
    )
    .await?;

    let mut map = HeaderMap::new();
    map.append(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_str(DEFAULT_ACCEPT_ENCODING)?,
    );
    let client = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(config.http_timeout)
        .use_rustls_tls()
        .default_headers(map)
        .build()?;

    let feed_client = Arc::new(HttpFeedClient::new(client.clone(), config.feed_endpoint()?));
    let sideloader = Arc::new(Sideloader::new(
        Arc::new(HttpDownloader::new(client, temp_dir)),
        Arc::new(FileSystemMediaStore::new(
            config.uploads_dir.clone(),
            media_repository,
        )),
    ));
    let importer = Importer::new(
        product_repository.clone(),
        TaxonomyResolver::new(term_repository.clone()),
        sideloader,
    );
    let import_service = ImportService::new(feed_client, importer).start();

    let secret_key = Key::from(config.session_key.as_bytes());
    log::info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(FormConfig::default().limit(16 * 1024))
            .wrap(control::SessionMiddlewareFactory {})
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .wrap(actix_web::middleware::NormalizePath::new(
                TrailingSlash::Trim,
            ))
            .app_data(Data::from(user_credentials_repository.clone()))
            .app_data(Data::from(setting_repository.clone()))
            .app_data(Data::from(product_repository.clone()))
            .app_data(Data::from(term_repository.clone()))
            .app_data(Data::new(import_service.clone()))
            .service(access::controllers::log_in)
            .service(access::controllers::log_out)
            .service(access::controllers::login_page)
            .service(control::import::import_page)
            .service(control::import::run_import)
            .service(control::product::products_page)
            .default_service(web::to(control::not_found))
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind server to {}", config.bind_addr))?
    .run()
    .await?;
    Ok(())
}
