#![deny(clippy::unwrap_used)]
#![allow(clippy::from_over_into)]

pub mod access;
pub mod config;
pub mod control;
pub mod feed;
pub mod import;
pub mod media;
pub mod product;
pub mod settings;
pub mod taxonomy;

#[derive(Debug)]
pub struct SqlWrapper<T>(pub T);

impl<T> SqlWrapper<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Comma-joined list column, empty string for an empty list
pub fn join_ids<T: ToString>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn split_ids<T: std::str::FromStr>(s: &str) -> Result<Vec<T>, T::Err> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
