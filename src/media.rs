use anyhow::Context;
use async_trait::async_trait;
use derive_more::{Display, Error};
use log_error::LogError;
use mime::Mime;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use rusqlite::params;
use shop_types::media::{MediaAsset, MediaAssetRepository};
use shop_types::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Add, Get, List};
use typesafe_repository::prelude::*;
use uuid::Uuid;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif"];

#[derive(Debug, Display, Error)]
pub enum SideloadError {
    #[display("Unable to download {url}: {source}")]
    Download { url: Url, source: reqwest::Error },
    #[display("Unable to download {url}: HTTP {status}")]
    Status { url: Url, status: StatusCode },
    #[display("Unable to write download of {url}: {source}")]
    Io { url: Url, source: std::io::Error },
    #[display("Unable to import {url}: {cause}")]
    Import { url: Url, cause: anyhow::Error },
}

/// Downloaded body held in a temporary file. Dropping it deletes the file.
#[derive(Debug)]
pub struct Download {
    pub source: Url,
    pub file: NamedTempFile,
    pub file_name: String,
    pub content_type: Option<String>,
}

impl Download {
    pub fn is_image(&self) -> bool {
        match self
            .content_type
            .as_deref()
            .and_then(|c| c.parse::<Mime>().ok())
        {
            Some(m) if m.type_() == mime::IMAGE => true,
            Some(m) if m != mime::APPLICATION_OCTET_STREAM => false,
            _ => Path::new(&self.file_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
        }
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &Url) -> Result<Download, SideloadError>;
}

/// Streams response bodies into temp files created under `temp_dir`
pub struct HttpDownloader {
    client: Client,
    temp_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(client: Client, temp_dir: PathBuf) -> Self {
        Self { client, temp_dir }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &Url) -> Result<Download, SideloadError> {
        let download_err = |source| SideloadError::Download {
            url: url.clone(),
            source,
        };
        let io_err = |source| SideloadError::Io {
            url: url.clone(),
            source,
        };
        let mut response = self
            .client
            .get(url.0.as_str())
            .send()
            .await
            .map_err(download_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SideloadError::Status {
                url: url.clone(),
                status,
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let mut file = NamedTempFile::new_in(&self.temp_dir).map_err(io_err)?;
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            file.write_all(&chunk).map_err(io_err)?;
        }
        file.flush().map_err(io_err)?;
        let file_name = url
            .file_name()
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Download {
            source: url.clone(),
            file,
            file_name,
            content_type,
        })
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Takes ownership of the downloaded file. On error the file is gone.
    async fn import(&self, download: Download) -> Result<IdentityOf<MediaAsset>, anyhow::Error>;
}

pub struct FileSystemMediaStore {
    uploads_dir: PathBuf,
    repo: Arc<dyn MediaAssetRepository>,
}

impl FileSystemMediaStore {
    pub fn new(uploads_dir: PathBuf, repo: Arc<dyn MediaAssetRepository>) -> Self {
        Self { uploads_dir, repo }
    }
}

fn sanitize_file_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl MediaStore for FileSystemMediaStore {
    async fn import(&self, download: Download) -> Result<IdentityOf<MediaAsset>, anyhow::Error> {
        if !download.is_image() {
            return Err(anyhow::anyhow!(
                "{} is not an image ({})",
                download.file_name,
                download.content_type.as_deref().unwrap_or("unknown type")
            ));
        }
        let Download {
            source,
            file,
            file_name,
            content_type,
        } = download;
        let id = Uuid::new_v4();
        let path = self
            .uploads_dir
            .join(format!("{id}_{}", sanitize_file_name(&file_name)));
        let size = file
            .as_file()
            .metadata()
            .context("Unable to read download metadata")?
            .len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            // rename fails across filesystems
            if let Err(err) = file.persist(&target) {
                std::fs::copy(err.file.path(), &target)?;
            }
            Ok::<_, std::io::Error>(())
        })
        .await?
        .with_context(|| format!("Unable to move download into {}", path.display()))?;
        let asset = MediaAsset {
            id,
            source,
            file_name,
            path: path.clone(),
            content_type,
            size,
            created_time: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.repo.add(asset).await {
            tokio::fs::remove_file(&path)
                .await
                .log_error("Unable to remove orphaned upload");
            return Err(err);
        }
        Ok(id)
    }
}

#[async_trait]
pub trait Sideload: Send + Sync {
    async fn sideload(&self, url: &Url) -> Result<IdentityOf<MediaAsset>, SideloadError>;
}

pub struct Sideloader {
    downloader: Arc<dyn Downloader>,
    store: Arc<dyn MediaStore>,
}

impl Sideloader {
    pub fn new(downloader: Arc<dyn Downloader>, store: Arc<dyn MediaStore>) -> Self {
        Self { downloader, store }
    }
}

#[async_trait]
impl Sideload for Sideloader {
    async fn sideload(&self, url: &Url) -> Result<IdentityOf<MediaAsset>, SideloadError> {
        let download = self.downloader.download(url).await?;
        let id = self
            .store
            .import(download)
            .await
            .map_err(|cause| SideloadError::Import {
                url: url.clone(),
                cause,
            })?;
        log::debug!("Sideloaded {url} as {id}");
        Ok(id)
    }
}

pub struct SqliteMediaAssetRepository {
    conn: Connection,
}

impl SqliteMediaAssetRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS media_asset (
                    id BLOB PRIMARY KEY,
                    source TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    path TEXT NOT NULL,
                    content_type TEXT,
                    size INTEGER NOT NULL,
                    created_time TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn row_to_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaAsset> {
    Ok(MediaAsset {
        id: row.get(0)?,
        source: Url(row.get(1)?),
        file_name: row.get(2)?,
        path: PathBuf::from(row.get::<_, String>(3)?),
        content_type: row.get(4)?,
        size: row.get::<_, i64>(5)?.max(0) as u64,
        created_time: row.get(6)?,
    })
}

impl Repository<MediaAsset> for SqliteMediaAssetRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Add<MediaAsset> for SqliteMediaAssetRepository {
    async fn add(&self, a: MediaAsset) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO media_asset (id, source, file_name, path, content_type, size, created_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        a.id,
                        a.source.0,
                        a.file_name,
                        a.path.to_string_lossy().into_owned(),
                        a.content_type,
                        a.size as i64,
                        a.created_time,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl Get<MediaAsset> for SqliteMediaAssetRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<MediaAsset>,
    ) -> Result<Option<MediaAsset>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source, file_name, path, content_type, size, created_time FROM media_asset WHERE id = ?1",
                )?;
                let a = stmt.query_map([id], row_to_asset)?.next().transpose()?;
                Ok(a)
            })
            .await?)
    }
}

#[async_trait]
impl List<MediaAsset> for SqliteMediaAssetRepository {
    async fn list(&self) -> Result<Vec<MediaAsset>, Self::Error> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source, file_name, path, content_type, size, created_time FROM media_asset ORDER BY created_time",
                )?;
                let a = stmt
                    .query_map([], row_to_asset)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(a)
            })
            .await?)
    }
}

impl MediaAssetRepository for SqliteMediaAssetRepository {}
