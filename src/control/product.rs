use crate::control::{render_template, ControlPanelAccess, Response};
use actix_web::{get, web::Data};
use askama::Template;
use rust_decimal::Decimal;
use shop_types::access::UserCredentials;
use shop_types::product::{Product, ProductRepository};
use shop_types::term::{Taxonomy, Term, TermRepository};
use std::collections::HashMap;
use typesafe_repository::IdentityOf;

pub const MISSING_TERMS: &str = "Failed to assign category or brand.";

pub struct ProductRow {
    pub name: String,
    pub regular_price: Decimal,
    pub sale_price: Option<Decimal>,
    pub stock_quantity: Option<i64>,
    pub categories: String,
    pub brands: String,
    pub images: usize,
}

fn term_names(
    product: &Product,
    taxonomy: Taxonomy,
    terms: &HashMap<IdentityOf<Term>, Term>,
) -> String {
    product
        .terms(taxonomy)
        .iter()
        .filter_map(|id| terms.get(id))
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProductRow {
    pub fn new(product: Product, terms: &HashMap<IdentityOf<Term>, Term>) -> Self {
        let categories = term_names(&product, Taxonomy::Category, terms);
        let brands = match term_names(&product, Taxonomy::Brand, terms) {
            b if b.is_empty() => MISSING_TERMS.to_string(),
            b => b,
        };
        Self {
            images: product.thumbnail.iter().count() + product.gallery.len(),
            name: product.name,
            regular_price: product.regular_price,
            sale_price: product.sale_price,
            stock_quantity: product.stock_quantity,
            categories,
            brands,
        }
    }
}

#[derive(Template)]
#[template(path = "products.html")]
struct ProductsPage {
    user: Option<UserCredentials>,
    rows: Vec<ProductRow>,
}

#[get("/products")]
pub async fn products_page(
    ControlPanelAccess { user }: ControlPanelAccess,
    products: Data<dyn ProductRepository>,
    terms: Data<dyn TermRepository>,
) -> Response {
    let terms = terms
        .list()
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect::<HashMap<_, _>>();
    let rows = products
        .list()
        .await?
        .into_iter()
        .map(|p| ProductRow::new(p, &terms))
        .collect();
    render_template(ProductsPage {
        user: Some(user),
        rows,
    })
}
