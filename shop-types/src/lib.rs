use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod access;
pub mod import;
pub mod media;
pub mod product;
pub mod settings;
pub mod term;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(transparent)]
pub struct Url(pub String);

impl Url {
    /// Last non-empty path segment, without query or fragment
    pub fn file_name(&self) -> Option<&str> {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
        let (_host, path) = path.split_once('/')?;
        path.rsplit('/').find(|s| !s.is_empty())
    }
}

impl From<String> for Url {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Url {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::Url;

    #[test]
    fn url_file_name_takes_last_segment() {
        assert_eq!(
            Url::from("https://cdn.dummyjson.com/products/images/1/thumbnail.jpg").file_name(),
            Some("thumbnail.jpg")
        );
        assert_eq!(Url::from("http://x/a.jpg?w=100#top").file_name(), Some("a.jpg"));
        assert_eq!(Url::from("http://x/dir/").file_name(), Some("dir"));
        assert_eq!(Url::from("http://x").file_name(), None);
    }
}
