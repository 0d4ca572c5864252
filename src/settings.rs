use async_trait::async_trait;
use rusqlite::params;
use shop_types::settings::{ImportSettings, Setting, SettingRepository, FETCH_IMAGES};
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, Remove, Save};
use typesafe_repository::prelude::*;

/// Adds the `fetch_images` option, disabled. An existing value is kept.
pub async fn install(repo: &dyn SettingRepository) -> Result<(), anyhow::Error> {
    if repo.get_one(&FETCH_IMAGES.to_string()).await?.is_none() {
        ImportSettings::default().store(repo).await?;
        log::info!("Added {FETCH_IMAGES} option");
    }
    Ok(())
}

pub async fn uninstall(repo: &dyn SettingRepository) -> Result<(), anyhow::Error> {
    repo.remove(&FETCH_IMAGES.to_string()).await?;
    log::info!("Removed {FETCH_IMAGES} option");
    Ok(())
}

pub struct SqliteSettingRepository {
    conn: Connection,
}

impl SqliteSettingRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS option (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Repository<Setting> for SqliteSettingRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Setting> for SqliteSettingRepository {
    async fn get_one(&self, key: &IdentityOf<Setting>) -> Result<Option<Setting>, Self::Error> {
        let key = key.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM option WHERE key = ?1")?;
                let s = stmt
                    .query_map([key], |row| {
                        Ok(Setting {
                            key: row.get(0)?,
                            value: row.get(1)?,
                        })
                    })?
                    .next()
                    .transpose()?;
                Ok(s)
            })
            .await?)
    }
}

#[async_trait]
impl Save<Setting> for SqliteSettingRepository {
    async fn save(&self, s: Setting) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO option (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                    params![s.key, s.value],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl Remove<Setting> for SqliteSettingRepository {
    async fn remove(&self, key: &IdentityOf<Setting>) -> Result<(), Self::Error> {
        let key = key.clone();
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute("DELETE FROM option WHERE key = ?1", [key])?;
                Ok(())
            })
            .await?)
    }
}

impl SettingRepository for SqliteSettingRepository {}
