use async_trait::async_trait;
use derive_more::{Display, Error};
use lazy_regex::regex;
use rusqlite::params;
use rusqlite::types::Type;
use shop_types::term::{Taxonomy, Term, TermRepository};
use std::sync::Arc;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Add, Get, List};
use typesafe_repository::prelude::*;

#[derive(Debug, Display, Error)]
pub enum ResolutionError {
    #[display("{_0} name is empty")]
    #[error(ignore)]
    EmptyName(Taxonomy),
    #[display("{taxonomy} name {name:?} has no usable slug")]
    EmptySlug { taxonomy: Taxonomy, name: String },
    #[display("Term store failure: {_0}")]
    #[error(ignore)]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for ResolutionError {
    fn from(err: anyhow::Error) -> Self {
        ResolutionError::Store(err)
    }
}

fn transliterate(ch: char) -> Option<&'static str> {
    let mapped = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ß' => "ss",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(mapped)
}

/// Lowercases, folds accented Latin letters to ASCII, turns whitespace into dashes and drops
/// everything but letters, digits, `-` and `_`
pub fn slugify(name: &str) -> String {
    let name = name
        .trim()
        .to_lowercase()
        .chars()
        .fold(String::new(), |mut out, ch| {
            match transliterate(ch) {
                Some(mapped) => out.push_str(mapped),
                None => out.push(ch),
            }
            out
        });
    let name = regex!(r"\s+").replace_all(&name, "-");
    let name = regex!(r"[^\w\-]").replace_all(&name, "");
    let name = regex!(r"-{2,}").replace_all(&name, "-");
    name.trim_matches('-').to_string()
}

pub struct TaxonomyResolver {
    repo: Arc<dyn TermRepository>,
}

impl TaxonomyResolver {
    pub fn new(repo: Arc<dyn TermRepository>) -> Self {
        Self { repo }
    }

    /// Returns the term whose slug matches `name` inside `taxonomy`, creating it with the raw name when absent
    pub async fn resolve_or_create(
        &self,
        name: &str,
        taxonomy: Taxonomy,
    ) -> Result<IdentityOf<Term>, ResolutionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ResolutionError::EmptyName(taxonomy));
        }
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ResolutionError::EmptySlug {
                taxonomy,
                name: name.to_string(),
            });
        }
        if let Some(term) = self.repo.get_by_slug(taxonomy, &slug).await? {
            return Ok(term.id);
        }
        let term = Term::new(name.to_string(), slug.clone(), taxonomy);
        let id = term.id;
        match self.repo.add(term).await {
            Ok(()) => {
                log::info!("Created {taxonomy} term {name} ({slug})");
                Ok(id)
            }
            // Lost a race against another writer of the same slug
            Err(err) => match self.repo.get_by_slug(taxonomy, &slug).await? {
                Some(term) => Ok(term.id),
                None => Err(ResolutionError::Store(err)),
            },
        }
    }
}

pub struct SqliteTermRepository {
    conn: Connection,
}

impl SqliteTermRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS term (
                    id BLOB PRIMARY KEY,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    taxonomy TEXT NOT NULL,
                    UNIQUE (taxonomy, slug)
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn row_to_term(row: &rusqlite::Row<'_>) -> rusqlite::Result<Term> {
    let taxonomy = row.get::<_, String>(3)?;
    let taxonomy = Taxonomy::try_from(taxonomy.as_str()).map_err(|s| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("Unknown taxonomy {s}").into(),
        )
    })?;
    Ok(Term {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        taxonomy,
    })
}

impl Repository<Term> for SqliteTermRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Add<Term> for SqliteTermRepository {
    async fn add(&self, t: Term) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO term (id, name, slug, taxonomy) VALUES (?1, ?2, ?3, ?4)",
                    params![t.id, t.name, t.slug, t.taxonomy.as_str()],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl Get<Term> for SqliteTermRepository {
    async fn get_one(&self, id: &IdentityOf<Term>) -> Result<Option<Term>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, slug, taxonomy FROM term WHERE id = ?1")?;
                let t = stmt.query_map([id], row_to_term)?.next().transpose()?;
                Ok(t)
            })
            .await?)
    }
}

#[async_trait]
impl List<Term> for SqliteTermRepository {
    async fn list(&self) -> Result<Vec<Term>, Self::Error> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id, name, slug, taxonomy FROM term ORDER BY taxonomy, name")?;
                let t = stmt
                    .query_map([], row_to_term)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(t)
            })
            .await?)
    }
}

#[async_trait]
impl TermRepository for SqliteTermRepository {
    async fn get_by_slug(
        &self,
        taxonomy: Taxonomy,
        slug: &str,
    ) -> Result<Option<Term>, Self::Error> {
        let slug = slug.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, slug, taxonomy FROM term WHERE taxonomy = ?1 AND slug = ?2",
                )?;
                let t = stmt
                    .query_map(params![taxonomy.as_str(), slug], row_to_term)?
                    .next()
                    .transpose()?;
                Ok(t)
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn resolver() -> (TaxonomyResolver, Arc<SqliteTermRepository>) {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = Arc::new(SqliteTermRepository::init(conn).await.expect("init"));
        (TaxonomyResolver::new(repo.clone()), repo)
    }

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Acme"), "acme");
        assert_eq!(slugify("  Home Decoration "), "home-decoration");
        assert_eq!(slugify("Men's  Shirts"), "mens-shirts");
        assert_eq!(slugify("skin-care"), "skin-care");
        assert_eq!(slugify("Dolce & Gabbana"), "dolce-gabbana");
        assert_eq!(slugify("snake_case"), "snake_case");
        assert_eq!(slugify("Café"), "cafe");
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Straße"), "strasse");
        assert_eq!(slugify("Ærø Œuvre"), "aero-oeuvre");
        assert_eq!(slugify("!!!"), "");
    }

    #[tokio::test]
    async fn creates_term_once_and_reuses_it() {
        let (resolver, repo) = resolver().await;
        let first = resolver
            .resolve_or_create("Acme", Taxonomy::Brand)
            .await
            .expect("created");
        let second = resolver
            .resolve_or_create("ACME ", Taxonomy::Brand)
            .await
            .expect("found");
        assert_eq!(first, second);
        let terms = repo.list().await.expect("list");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].name, "Acme");
        assert_eq!(terms[0].slug, "acme");
        assert_eq!(terms[0].taxonomy, Taxonomy::Brand);
    }

    #[tokio::test]
    async fn slugs_are_scoped_by_taxonomy() {
        let (resolver, repo) = resolver().await;
        let brand = resolver
            .resolve_or_create("Apple", Taxonomy::Brand)
            .await
            .expect("brand");
        let category = resolver
            .resolve_or_create("Apple", Taxonomy::Category)
            .await
            .expect("category");
        assert_ne!(brand, category);
        assert_eq!(
            repo.get_by_slug(Taxonomy::Category, "apple")
                .await
                .expect("get")
                .map(|t| t.id),
            Some(category)
        );
    }

    #[tokio::test]
    async fn blank_names_are_not_created() {
        let (resolver, repo) = resolver().await;
        assert!(matches!(
            resolver.resolve_or_create("  ", Taxonomy::Brand).await,
            Err(ResolutionError::EmptyName(Taxonomy::Brand))
        ));
        assert!(matches!(
            resolver.resolve_or_create("???", Taxonomy::Category).await,
            Err(ResolutionError::EmptySlug { .. })
        ));
        assert!(repo.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected_by_store() {
        let (_, repo) = resolver().await;
        repo.add(Term::new("Acme".into(), "acme".into(), Taxonomy::Brand))
            .await
            .expect("add");
        assert!(repo
            .add(Term::new("acme".into(), "acme".into(), Taxonomy::Brand))
            .await
            .is_err());
    }
}
