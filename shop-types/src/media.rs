use crate::Url;
use std::path::PathBuf;
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Add, Get, List};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use uuid::Uuid;

#[derive(Id, Clone, Debug, PartialEq, Eq)]
#[Id(ref_id, get_id)]
pub struct MediaAsset {
    #[id]
    pub id: Uuid,
    pub source: Url,
    pub file_name: String,
    pub path: PathBuf,
    pub content_type: Option<String>,
    pub size: u64,
    pub created_time: OffsetDateTime,
}

pub trait MediaAssetRepository:
    Repository<MediaAsset, Error = anyhow::Error>
    + Add<MediaAsset>
    + Get<MediaAsset>
    + List<MediaAsset>
    + Send
    + Sync
{
}
