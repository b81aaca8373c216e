//! Glues the content store and the date resolver together: raw
//! [`crate::content::Record`]s go in, fully-resolved posts with rendered
//! HTML and authoritative dates come out, sorted newest-published-first.
//! Tag validation happens here too, before any dates are resolved, so a
//! content mistake fails the build without touching the cache.

use crate::cache::Provenance;
use crate::content::Record;
use crate::history::RevisionHistory;
use crate::markdown;
use crate::resolver::{self, Resolver};
use crate::tags::{self, Vocabulary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::info;
use url::Url;

/// A post ready for rendering: content merged with its resolved dates.
#[derive(Clone, Debug)]
pub struct ResolvedPost {
    pub slug: String,
    pub title: String,
    pub description: String,

    /// Tags, sorted for stable output.
    pub tags: Vec<String>,

    /// The post body rendered to an HTML fragment.
    pub html: String,

    pub published: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,

    /// The post's URL on the published site.
    pub url: Url,

    pub canonical: Option<Url>,
    pub image: Option<String>,
    pub image_alt: Option<String>,
}

impl ResolvedPost {
    fn new(record: Record, dates: Provenance, posts_url: &Url) -> Result<ResolvedPost> {
        let url = posts_url.join(&format!("{}.html", record.slug))?;
        let mut tags: Vec<String> = record.tags.into_iter().collect();
        tags.sort();
        Ok(ResolvedPost {
            slug: record.slug,
            title: record.title,
            description: record.description,
            tags,
            html: markdown::to_html(&record.body),
            published: dates.published,
            last_updated: dates.last_updated,
            url,
            canonical: record.canonical,
            image: record.image,
            image_alt: record.image_alt,
        })
    }

    /// Converts the post into a template value. Dates are exposed both in
    /// ISO-8601 form and in the short `YYYY-MM-DD` form most templates
    /// actually want.
    pub fn to_value(&self) -> gtmpl::Value {
        let mut m: HashMap<String, gtmpl::Value> = HashMap::new();
        m.insert("slug".to_owned(), (&self.slug).into());
        m.insert("title".to_owned(), (&self.title).into());
        m.insert("description".to_owned(), (&self.description).into());
        m.insert("body".to_owned(), (&self.html).into());
        m.insert("url".to_owned(), self.url.to_string().into());
        m.insert("published".to_owned(), self.published.to_rfc3339().into());
        m.insert(
            "published_date".to_owned(),
            self.published.format("%Y-%m-%d").to_string().into(),
        );
        m.insert(
            "last_updated".to_owned(),
            self.last_updated.to_rfc3339().into(),
        );
        m.insert(
            "last_updated_date".to_owned(),
            self.last_updated.format("%Y-%m-%d").to_string().into(),
        );
        m.insert(
            "tags".to_owned(),
            gtmpl::Value::Array(
                self.tags.iter().map(|tag| tag.into()).collect(),
            ),
        );
        m.insert(
            "canonical".to_owned(),
            match &self.canonical {
                Some(url) => url.to_string().into(),
                None => gtmpl::Value::Nil,
            },
        );
        m.insert(
            "image".to_owned(),
            match &self.image {
                Some(image) => image.into(),
                None => gtmpl::Value::Nil,
            },
        );
        m.insert(
            "image_alt".to_owned(),
            match &self.image_alt {
                Some(alt) => alt.into(),
                None => gtmpl::Value::Nil,
            },
        );
        gtmpl::Value::Object(m)
    }
}

/// Validates, resolves, and renders `records` into [`ResolvedPost`]s sorted
/// by publication date, most recent first.
pub fn assemble<H: RevisionHistory>(
    records: Vec<Record>,
    vocabulary: &Vocabulary,
    resolver: &mut Resolver<H>,
    posts_url: &Url,
) -> Result<Vec<ResolvedPost>> {
    // Validate everything before resolving anything: a typo'd tag
    // shouldn't leave a half-updated cache behind.
    for record in &records {
        vocabulary.validate(record)?;
    }

    let mut posts = Vec::with_capacity(records.len());
    for record in records {
        let dates = resolver.resolve(&record.slug, &record.path)?;
        posts.push(ResolvedPost::new(record, dates, posts_url)?);
    }

    posts.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    info!("assembled {} posts", posts.len());
    Ok(posts)
}

/// The result of a fallible assembly operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error assembling resolved posts.
#[derive(Debug)]
pub enum Error {
    /// Returned when content uses an unrecognized tag.
    Tags(tags::Error),

    /// Returned when a post's dates can't be resolved.
    Resolve(resolver::Error),

    /// Returned when a post's slug can't be joined onto the posts URL.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Tags(err) => err.fmt(f),
            Error::Resolve(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Tags(err) => Some(err),
            Error::Resolve(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<tags::Error> for Error {
    /// Converts a [`tags::Error`] into an [`Error`]. It allows us to use the
    /// `?` operator for tag validation.
    fn from(err: tags::Error) -> Error {
        Error::Tags(err)
    }
}

impl From<resolver::Error> for Error {
    /// Converts a [`resolver::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for date resolution.
    fn from(err: resolver::Error) -> Error {
        Error::Resolve(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL joining.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
