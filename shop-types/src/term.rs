use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use typesafe_repository::async_ops::{Add, Get, List};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use uuid::Uuid;

/// Namespace a term belongs to. Slugs are unique only inside one taxonomy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    #[display("category")]
    Category,
    #[display("brand")]
    Brand,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Category => "category",
            Taxonomy::Brand => "brand",
        }
    }
}

impl TryFrom<&str> for Taxonomy {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "brand" => Ok(Self::Brand),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Id, Clone, Debug, PartialEq, Eq)]
#[Id(ref_id, get_id)]
pub struct Term {
    #[id]
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub taxonomy: Taxonomy,
}

impl Term {
    pub fn new(name: String, slug: String, taxonomy: Taxonomy) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            slug,
            taxonomy,
        }
    }
}

/// `Add` fails when the slug is already taken inside the taxonomy.
#[async_trait]
pub trait TermRepository:
    Repository<Term, Error = anyhow::Error> + Add<Term> + Get<Term> + List<Term> + Send + Sync
{
    async fn get_by_slug(
        &self,
        taxonomy: Taxonomy,
        slug: &str,
    ) -> Result<Option<Term>, Self::Error>;
}
