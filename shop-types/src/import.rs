use crate::product::Product;
use crate::Url;
use derive_more::Display;
use serde::Serialize;
use typesafe_repository::IdentityOf;

/// Last step a record reached during an import
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display)]
#[serde(rename_all = "snake_case")]
pub enum RecordStage {
    #[display("created")]
    Created,
    #[display("category assigned")]
    CategoryAssigned,
    #[display("brand assigned")]
    BrandAssigned,
    #[display("images attached")]
    ImagesAttached,
    #[display("done")]
    Done,
    #[display("failed")]
    Failed,
}

/// Record-scoped problem, shown inline to the administrator
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    #[display("Failed to create product {title}: {reason}")]
    ProductRejected { title: String, reason: String },
    #[display("Failed to assign category: {name}")]
    CategoryNotAssigned { name: String, reason: String },
    #[display("Failed to assign brand: {name}")]
    BrandNotAssigned { name: String, reason: String },
    #[display("Failed to download and attach thumbnail image: {url}")]
    ThumbnailNotAttached { url: Url, reason: String },
    #[display("Failed to update product {title}: {reason}")]
    ProductNotUpdated { title: String, reason: String },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RecordOutcome {
    pub title: String,
    #[serde(skip)]
    pub product: Option<IdentityOf<Product>>,
    pub stage: RecordStage,
    pub issues: Vec<RecordIssue>,
    pub gallery_skipped: usize,
}

impl RecordOutcome {
    pub fn new(title: String) -> Self {
        Self {
            title,
            product: None,
            stage: RecordStage::Created,
            issues: vec![],
            gallery_skipped: 0,
        }
    }

    pub fn failed(title: String, issue: RecordIssue) -> Self {
        Self {
            title,
            product: None,
            stage: RecordStage::Failed,
            issues: vec![issue],
            gallery_skipped: 0,
        }
    }

    pub fn is_created(&self) -> bool {
        self.product.is_some()
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl ImportReport {
    pub fn push(&mut self, outcome: RecordOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_created()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.created()
    }

    pub fn products(&self) -> impl Iterator<Item = &IdentityOf<Product>> {
        self.outcomes.iter().filter_map(|o| o.product.as_ref())
    }

    /// Inline messages in record order
    pub fn messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| o.issues.iter())
            .map(ToString::to_string)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Product created successfully: {} of {} records imported",
            self.created(),
            self.total()
        )
    }
}
