use crate::feed::{ProductRecord, RecordDecodeError};
use crate::{join_ids, split_ids};
use async_trait::async_trait;
use derive_more::{Display, Error};
use rusqlite::params;
use rusqlite::types::Type;
use rust_decimal::Decimal;
use shop_types::product::{Product, ProductRepository};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Add, Get, List, Save};
use typesafe_repository::prelude::*;
use uuid::Uuid;

#[derive(Debug, Display, Error)]
pub enum ProductCreationError {
    #[display("{_0}")]
    InvalidRecord(RecordDecodeError),
    #[display("title is empty")]
    MissingTitle,
    #[display("price is missing")]
    MissingPrice,
    #[display("price {_0} is negative")]
    #[error(ignore)]
    NegativePrice(Decimal),
    #[display("{_0}")]
    #[error(ignore)]
    Backend(anyhow::Error),
}

impl From<RecordDecodeError> for ProductCreationError {
    fn from(err: RecordDecodeError) -> Self {
        ProductCreationError::InvalidRecord(err)
    }
}

/// Price after a percentage discount, `None` when the discount is outside (0, 100)
/// or the result does not fit into a `Decimal`
pub fn discounted_price(price: Decimal, discount_percentage: Decimal) -> Option<Decimal> {
    if discount_percentage <= Decimal::ZERO || discount_percentage >= Decimal::ONE_HUNDRED {
        return None;
    }
    let discount = price
        .checked_mul(discount_percentage)?
        .checked_div(Decimal::ONE_HUNDRED)?;
    Some(price.checked_sub(discount)?.round_dp(2))
}

impl TryFrom<ProductRecord> for Product {
    type Error = ProductCreationError;

    fn try_from(r: ProductRecord) -> Result<Self, Self::Error> {
        let name = r.title.trim().to_string();
        if name.is_empty() {
            return Err(ProductCreationError::MissingTitle);
        }
        let regular_price = r.price.ok_or(ProductCreationError::MissingPrice)?;
        if regular_price < Decimal::ZERO {
            return Err(ProductCreationError::NegativePrice(regular_price));
        }
        let sale_price = r.discount_percentage.and_then(|d| {
            let sale = discounted_price(regular_price, d);
            if sale.is_none() && d > Decimal::ZERO && d < Decimal::ONE_HUNDRED {
                log::warn!("Discount {d}% of {regular_price} overflows, {name} has no sale price");
            }
            sale
        });
        Ok(Product {
            id: Uuid::new_v4(),
            name,
            description: r.description,
            regular_price,
            sale_price,
            rating: r.rating,
            stock_quantity: r.stock,
            thumbnail: None,
            gallery: vec![],
            categories: vec![],
            brands: vec![],
            created_time: OffsetDateTime::now_utc(),
        })
    }
}

pub struct SqliteProductRepository {
    conn: Connection,
}

impl SqliteProductRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS product (
                    id BLOB PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL,
                    regular_price TEXT NOT NULL,
                    sale_price TEXT,
                    rating TEXT,
                    stock_quantity INTEGER,
                    thumbnail BLOB,
                    gallery TEXT NOT NULL,
                    categories TEXT NOT NULL,
                    brands TEXT NOT NULL,
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

fn conversion_failure<E>(idx: usize) -> impl FnOnce(E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| s.parse::<Decimal>())
        .transpose()
        .map_err(conversion_failure(idx))
}

fn ids(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<Uuid>> {
    split_ids(&row.get::<_, String>(idx)?).map_err(conversion_failure(idx))
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        regular_price: decimal(row, 3)?.unwrap_or_default(),
        sale_price: decimal(row, 4)?,
        rating: decimal(row, 5)?,
        stock_quantity: row.get(6)?,
        thumbnail: row.get(7)?,
        gallery: ids(row, 8)?,
        categories: ids(row, 9)?,
        brands: ids(row, 10)?,
        created_time: row.get(11)?,
    })
}

const COLUMNS: &str = "id, name, description, regular_price, sale_price, rating, stock_quantity, thumbnail, gallery, categories, brands, created_time";

impl Repository<Product> for SqliteProductRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Add<Product> for SqliteProductRepository {
    async fn add(&self, p: Product) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO product ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
                    params![
                        p.id,
                        p.name,
                        p.description,
                        p.regular_price.to_string(),
                        p.sale_price.map(|d| d.to_string()),
                        p.rating.map(|d| d.to_string()),
                        p.stock_quantity,
                        p.thumbnail,
                        join_ids(&p.gallery),
                        join_ids(&p.categories),
                        join_ids(&p.brands),
                        p.created_time,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl Save<Product> for SqliteProductRepository {
    async fn save(&self, p: Product) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO product ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) ON CONFLICT(id) DO UPDATE SET name=?2, description=?3, regular_price=?4, sale_price=?5, rating=?6, stock_quantity=?7, thumbnail=?8, gallery=?9, categories=?10, brands=?11"),
                    params![
                        p.id,
                        p.name,
                        p.description,
                        p.regular_price.to_string(),
                        p.sale_price.map(|d| d.to_string()),
                        p.rating.map(|d| d.to_string()),
                        p.stock_quantity,
                        p.thumbnail,
                        join_ids(&p.gallery),
                        join_ids(&p.categories),
                        join_ids(&p.brands),
                        p.created_time,
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl Get<Product> for SqliteProductRepository {
    async fn get_one(&self, id: &IdentityOf<Product>) -> Result<Option<Product>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {COLUMNS} FROM product WHERE id = ?1"))?;
                let p = stmt.query_map([id], row_to_product)?.next().transpose()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl List<Product> for SqliteProductRepository {
    async fn list(&self) -> Result<Vec<Product>, Self::Error> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM product ORDER BY rowid"))?;
                let p = stmt
                    .query_map([], row_to_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p)
            })
            .await?)
    }
}

impl ProductRepository for SqliteProductRepository {}
