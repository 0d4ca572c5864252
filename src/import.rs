use crate::feed::{self, FeedClient, FetchError, ParseError, ProductRecord, RecordDecodeError};
use crate::media::Sideload;
use crate::product::ProductCreationError;
use crate::taxonomy::TaxonomyResolver;
use actix::prelude::*;
use derive_more::{Display, Error};
use shop_types::import::{ImportReport, RecordIssue, RecordOutcome, RecordStage};
use shop_types::product::{Product, ProductRepository};
use shop_types::settings::ImportSettings;
use shop_types::term::Taxonomy;
use shop_types::Url;
use std::sync::Arc;

/// Failure that stops the whole run before any record is touched
#[derive(Debug, Display, Error)]
pub enum ImportError {
    #[display("{_0}")]
    Fetch(FetchError),
    #[display("{_0}")]
    Parse(ParseError),
}

impl From<FetchError> for ImportError {
    fn from(err: FetchError) -> Self {
        ImportError::Fetch(err)
    }
}

impl From<ParseError> for ImportError {
    fn from(err: ParseError) -> Self {
        ImportError::Parse(err)
    }
}

pub struct Importer {
    products: Arc<dyn ProductRepository>,
    taxonomy: TaxonomyResolver,
    sideloader: Arc<dyn Sideload>,
}

impl Importer {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        taxonomy: TaxonomyResolver,
        sideloader: Arc<dyn Sideload>,
    ) -> Self {
        Self {
            products,
            taxonomy,
            sideloader,
        }
    }

    /// Imports records one after another. A failing record never stops the others.
    pub async fn run(
        &self,
        records: Vec<Result<ProductRecord, RecordDecodeError>>,
        settings: ImportSettings,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        for record in records {
            let outcome = match record {
                Ok(record) => self.import_record(record, settings).await,
                Err(err) => rejected(err.title(), err.into()),
            };
            report.push(outcome);
        }
        log::info!(
            "Import finished: {} of {} records created",
            report.created(),
            report.total()
        );
        report
    }

    async fn create_product(&self, record: &ProductRecord) -> Result<Product, ProductCreationError> {
        let product = Product::try_from(record.clone())?;
        self.products
            .add(product.clone())
            .await
            .map_err(ProductCreationError::Backend)?;
        Ok(product)
    }

    async fn import_record(&self, record: ProductRecord, settings: ImportSettings) -> RecordOutcome {
        let title = record.title.clone();
        let mut product = match self.create_product(&record).await {
            Ok(p) => p,
            Err(err) => return rejected(title, err),
        };
        let mut outcome = RecordOutcome::new(title.clone());
        outcome.product = Some(product.id);

        self.assign_term(&mut product, &mut outcome, &record.category, Taxonomy::Category)
            .await;
        outcome.stage = RecordStage::CategoryAssigned;
        self.assign_term(&mut product, &mut outcome, &record.brand, Taxonomy::Brand)
            .await;
        outcome.stage = RecordStage::BrandAssigned;

        if settings.fetch_images {
            self.attach_images(&mut product, &mut outcome, &record).await;
        }

        match self.products.save(product).await {
            Ok(()) => outcome.stage = RecordStage::Done,
            Err(err) => {
                log::warn!("Unable to update product {title}: {err:?}");
                outcome.issues.push(RecordIssue::ProductNotUpdated {
                    title,
                    reason: err.to_string(),
                });
            }
        }
        outcome
    }

    async fn assign_term(
        &self,
        product: &mut Product,
        outcome: &mut RecordOutcome,
        name: &str,
        taxonomy: Taxonomy,
    ) {
        match self.taxonomy.resolve_or_create(name, taxonomy).await {
            Ok(term) => product.assign_term(taxonomy, term),
            Err(err) => {
                log::warn!("Unable to assign {taxonomy} {name:?} to {}: {err}", product.name);
                let name = name.to_string();
                let reason = err.to_string();
                outcome.issues.push(match taxonomy {
                    Taxonomy::Category => RecordIssue::CategoryNotAssigned { name, reason },
                    Taxonomy::Brand => RecordIssue::BrandNotAssigned { name, reason },
                });
            }
        }
    }

    /// Gallery is attempted only once the thumbnail is in place
    async fn attach_images(
        &self,
        product: &mut Product,
        outcome: &mut RecordOutcome,
        record: &ProductRecord,
    ) {
        let Some(thumbnail) = &record.thumbnail else {
            log::warn!("{} has no thumbnail, skipping images", product.name);
            outcome.issues.push(RecordIssue::ThumbnailNotAttached {
                url: Url::default(),
                reason: "thumbnail is missing".to_string(),
            });
            outcome.gallery_skipped = record.images.len();
            return;
        };
        match self.sideloader.sideload(thumbnail).await {
            Ok(asset) => product.thumbnail = Some(asset),
            Err(err) => {
                log::warn!("Unable to attach thumbnail of {}: {err}", product.name);
                outcome.issues.push(RecordIssue::ThumbnailNotAttached {
                    url: thumbnail.clone(),
                    reason: err.to_string(),
                });
                outcome.gallery_skipped = record.images.len();
                return;
            }
        }
        for url in &record.images {
            match self.sideloader.sideload(url).await {
                Ok(asset) => product.gallery.push(asset),
                Err(err) => {
                    log::warn!("Skipping gallery image of {}: {err}", product.name);
                    outcome.gallery_skipped += 1;
                }
            }
        }
        outcome.stage = RecordStage::ImagesAttached;
    }
}

fn rejected(title: String, err: ProductCreationError) -> RecordOutcome {
    log::warn!("Unable to create product {title}: {err}");
    RecordOutcome::failed(
        title.clone(),
        RecordIssue::ProductRejected {
            title,
            reason: err.to_string(),
        },
    )
}

/// Fetch, parse and import. Fetch and parse failures abort before anything is created.
pub async fn import_feed(
    client: &dyn FeedClient,
    importer: &Importer,
    settings: ImportSettings,
) -> Result<ImportReport, ImportError> {
    let response = client.fetch().await.map_err(|err| {
        log::error!("{err}");
        err
    })?;
    let records = feed::parse(&response.body).map_err(|err| {
        log::error!("Unable to parse feed: {err:?}");
        err
    })?;
    log::info!(
        "Importing {} records, fetch_images = {}",
        records.len(),
        settings.fetch_images
    );
    Ok(importer.run(records, settings).await)
}

/// Runs imports one at a time
pub struct ImportService {
    client: Arc<dyn FeedClient>,
    importer: Arc<Importer>,
}

impl ImportService {
    pub fn new(client: Arc<dyn FeedClient>, importer: Importer) -> Self {
        Self {
            client,
            importer: Arc::new(importer),
        }
    }
}

impl Actor for ImportService {
    type Context = Context<Self>;
}

#[derive(Message)]
#[rtype(result = "Result<ImportReport, ImportError>")]
pub struct RunImport(pub ImportSettings);

impl Handler<RunImport> for ImportService {
    type Result = AtomicResponse<Self, Result<ImportReport, ImportError>>;

    fn handle(&mut self, RunImport(settings): RunImport, _ctx: &mut Self::Context) -> Self::Result {
        let client = self.client.clone();
        let importer = self.importer.clone();
        let fut = async move { import_feed(client.as_ref(), &importer, settings).await };
        AtomicResponse::new(Box::pin(fut.into_actor(self)))
    }
}
