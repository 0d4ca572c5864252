use async_trait::async_trait;
use bytes::Bytes;
use derive_more::{Display, Error};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use shop_types::Url;

/// One entry of the `products` array
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductRecord {
    pub title: String,
    pub description: String,
    pub price: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub rating: Option<Decimal>,
    pub stock: Option<i64>,
    pub category: String,
    pub brand: String,
    pub thumbnail: Option<Url>,
    pub images: Vec<Url>,
}

#[derive(Debug)]
pub struct FeedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("Failed to fetch data: {_0}")]
    Network(reqwest::Error),
    #[display("Failed to fetch data: HTTP {status} for {url}")]
    Status { status: StatusCode, url: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err)
    }
}

#[derive(Debug, Display, Error)]
pub enum ParseError {
    #[display("Invalid or missing data structure.")]
    Json(serde_json::Error),
    #[display("Invalid or missing data structure.")]
    MissingProducts,
}

/// Feed entry that is not a valid record. Only that entry is skipped.
#[derive(Debug, Display, Error)]
#[display("record #{index} has invalid fields: {source}")]
pub struct RecordDecodeError {
    pub index: usize,
    pub title: Option<String>,
    pub source: serde_json::Error,
}

impl RecordDecodeError {
    pub fn title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("#{}", self.index))
    }
}

#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self) -> Result<FeedResponse, FetchError>;
}

pub struct HttpFeedClient {
    client: Client,
    url: url::Url,
}

impl HttpFeedClient {
    pub fn new(client: Client, url: url::Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self) -> Result<FeedResponse, FetchError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: self.url.to_string(),
            });
        }
        let body = response.bytes().await?;
        log::info!("Fetched {} bytes from {}", body.len(), self.url);
        Ok(FeedResponse { status, body })
    }
}

/// Decodes `{"products": [...]}`. Whole-feed failures abort, per-entry failures are returned in place.
pub fn parse(body: &[u8]) -> Result<Vec<Result<ProductRecord, RecordDecodeError>>, ParseError> {
    let mut feed: Value = serde_json::from_slice(body).map_err(ParseError::Json)?;
    let products = match feed.get_mut("products").map(Value::take) {
        Some(Value::Array(products)) => products,
        _ => return Err(ParseError::MissingProducts),
    };
    Ok(products
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let title = value
                .get("title")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            serde_json::from_value(value).map_err(|source| RecordDecodeError {
                index,
                title,
                source,
            })
        })
        .collect())
}
