use typesafe_repository::async_ops::{Get, Remove, Save};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

pub const FETCH_IMAGES: &str = "fetch_images";

const ENABLED: &str = "1";
const DISABLED: &str = "0";

/// Raw key-value option
#[derive(Id, Clone, Debug, PartialEq, Eq)]
#[Id(ref_id, get_id)]
pub struct Setting {
    #[id]
    pub key: String,
    pub value: String,
}

pub trait SettingRepository:
    Repository<Setting, Error = anyhow::Error>
    + Get<Setting>
    + Save<Setting>
    + Remove<Setting>
    + Send
    + Sync
{
}

/// Options the import routine runs with. Passed in explicitly, never read from a global.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSettings {
    pub fetch_images: bool,
}

impl ImportSettings {
    pub fn from_flag(flag: Option<&str>) -> Self {
        Self {
            fetch_images: flag.is_some_and(|f| f.trim() == ENABLED),
        }
    }

    pub fn as_flag(&self) -> &'static str {
        if self.fetch_images {
            ENABLED
        } else {
            DISABLED
        }
    }

    pub async fn load(repo: &dyn SettingRepository) -> Result<Self, anyhow::Error> {
        let setting = repo.get_one(&FETCH_IMAGES.to_string()).await?;
        Ok(Self::from_flag(setting.as_ref().map(|s| s.value.as_str())))
    }

    pub async fn store(&self, repo: &dyn SettingRepository) -> Result<(), anyhow::Error> {
        repo.save(Setting {
            key: FETCH_IMAGES.to_string(),
            value: self.as_flag().to_string(),
        })
        .await
    }
}
