use anyhow::Context;
use rand::{distributions, Rng};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FEED_URL: &str = "https://dummyjson.com/products";
const ENV_FILE: &str = ".env";
const SESSION_KEY_LENGTH: usize = 64;

#[derive(Clone, Debug)]
pub struct Config {
    pub feed_url: String,
    pub feed_limit: Option<usize>,
    pub storage_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub bind_addr: String,
    pub session_key: String,
    pub admin_login: String,
    pub admin_password: Option<String>,
    pub http_timeout: Duration,
}

/// Loads `.env` into the process environment, creating an empty one when missing
pub fn load_env_file() -> Result<(), anyhow::Error> {
    match std::fs::File::open(ENV_FILE) {
        Ok(_) => envmnt::load_file(ENV_FILE)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(ENV_FILE)?;
            envmnt::load_file(ENV_FILE)?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open {ENV_FILE} file: {err}"));
        }
    }
    Ok(())
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let feed_limit = match envmnt::get_parse::<_, usize, _>("FEED_LIMIT") {
            Ok(limit) => Some(limit),
            Err(envmnt::errors::EnvmntError::Missing(_)) => None,
            Err(err) => return Err(anyhow::anyhow!("Invalid FEED_LIMIT: {err}")),
        };
        let http_timeout = match envmnt::get_parse::<_, u64, _>("HTTP_TIMEOUT_SECS") {
            Ok(secs) => Duration::from_secs(secs),
            Err(envmnt::errors::EnvmntError::Missing(_)) => Duration::from_secs(60),
            Err(err) => return Err(anyhow::anyhow!("Invalid HTTP_TIMEOUT_SECS: {err}")),
        };
        Ok(Self {
            feed_url: envmnt::get_or("FEED_URL", DEFAULT_FEED_URL),
            feed_limit,
            storage_dir: envmnt::get_or("STORAGE_DIR", "storage").into(),
            uploads_dir: envmnt::get_or("UPLOADS_DIR", "uploads").into(),
            bind_addr: envmnt::get_or("BIND_ADDR", "0.0.0.0:8080"),
            session_key: session_key()?,
            admin_login: envmnt::get_or("ADMIN_LOGIN", "admin"),
            admin_password: envmnt::get_parse::<_, String, _>("ADMIN_PASSWORD")
                .ok()
                .filter(|p: &String| !p.is_empty()),
            http_timeout,
        })
    }

    /// Feed endpoint including the optional page size
    pub fn feed_endpoint(&self) -> Result<url::Url, anyhow::Error> {
        let mut url = url::Url::parse(&self.feed_url)
            .with_context(|| format!("Invalid feed url {}", self.feed_url))?;
        if let Some(limit) = self.feed_limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    pub fn storage(&self, file: &str) -> PathBuf {
        self.storage_dir.join(file)
    }
}

fn session_key() -> Result<String, anyhow::Error> {
    match envmnt::get_parse::<_, String, _>("SESSION_KEY") {
        Ok(v) if v.len() >= SESSION_KEY_LENGTH => Ok(v),
        Ok(_) => Err(anyhow::anyhow!(
            "SESSION_KEY must be at least {SESSION_KEY_LENGTH} bytes long"
        )),
        Err(envmnt::errors::EnvmntError::Missing(_)) => {
            let key = rand::thread_rng()
                .sample_iter(distributions::Alphanumeric)
                .take(SESSION_KEY_LENGTH)
                .map(char::from)
                .collect::<String>();
            let mut f = std::fs::File::options()
                .append(true)
                .create(true)
                .open(ENV_FILE)?;
            f.write_all(format!("\nSESSION_KEY={key}\n").as_bytes())?;
            envmnt::set("SESSION_KEY", &key);
            Ok(key)
        }
        Err(err) => Err(anyhow::anyhow!("Unable to read session key: {err}")),
    }
}
