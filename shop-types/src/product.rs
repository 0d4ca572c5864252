use crate::media::MediaAsset;
use crate::term::{Taxonomy, Term};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Add, Get, List, Save};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use uuid::Uuid;

#[derive(Id, Clone, Debug, PartialEq)]
#[Id(ref_id, get_id)]
pub struct Product {
    #[id]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub regular_price: Decimal,
    pub sale_price: Option<Decimal>,
    pub rating: Option<Decimal>,
    pub stock_quantity: Option<i64>,
    pub thumbnail: Option<IdentityOf<MediaAsset>>,
    pub gallery: Vec<IdentityOf<MediaAsset>>,
    pub categories: Vec<IdentityOf<Term>>,
    pub brands: Vec<IdentityOf<Term>>,
    pub created_time: OffsetDateTime,
}

impl Product {
    /// Appends the term to the set of its taxonomy, keeping existing assignments
    pub fn assign_term(&mut self, taxonomy: Taxonomy, term: IdentityOf<Term>) {
        let terms = match taxonomy {
            Taxonomy::Category => &mut self.categories,
            Taxonomy::Brand => &mut self.brands,
        };
        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    pub fn terms(&self, taxonomy: Taxonomy) -> &[IdentityOf<Term>] {
        match taxonomy {
            Taxonomy::Category => &self.categories,
            Taxonomy::Brand => &self.brands,
        }
    }
}

/// `Add` rejects an existing id, `Save` overwrites.
pub trait ProductRepository:
    Repository<Product, Error = anyhow::Error>
    + Add<Product>
    + Save<Product>
    + Get<Product>
    + List<Product>
    + Send
    + Sync
{
}
