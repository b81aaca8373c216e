//! The closed tag vocabulary. Every tag used anywhere in content must be
//! declared -- with a description -- in one JSON file, so a typo'd tag fails
//! the build instead of quietly creating a new one-post tag on the published
//! site.

use crate::content::Record;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One declared tag.
#[derive(Clone, Debug, Deserialize)]
pub struct TagData {
    pub name: String,
    pub description: String,
}

/// The set of tags content is allowed to use, loaded from a JSON array of
/// [`TagData`] records.
pub struct Vocabulary {
    path: PathBuf,
    tags: Vec<TagData>,
    names: HashSet<String>,
}

impl Vocabulary {
    /// Loads the vocabulary from `path`.
    pub fn load(path: &Path) -> Result<Vocabulary> {
        use crate::util::open;
        let tags: Vec<TagData> = serde_json::from_reader(open(path, "tags")?)?;
        let names = tags.iter().map(|tag| tag.name.clone()).collect();
        Ok(Vocabulary {
            path: path.to_owned(),
            tags,
            names,
        })
    }

    /// Returns whether `name` is a declared tag.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Checks every tag on `record` against the vocabulary. The first
    /// unrecognized tag fails the whole build; wrong tags on a published
    /// site are a content bug, not a runtime condition to tolerate.
    pub fn validate(&self, record: &Record) -> Result<()> {
        for tag in &record.tags {
            if !self.contains(tag) {
                return Err(Error::UnknownTag {
                    tag: tag.clone(),
                    slug: record.slug.clone(),
                    vocabulary: self.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns the declared tags in declaration order.
    pub fn tags(&self) -> &[TagData] {
        &self.tags
    }
}

/// The result of a fallible vocabulary operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading the vocabulary or validating content
/// against it.
#[derive(Debug)]
pub enum Error {
    /// Returned when the vocabulary file can't be read.
    Io(anyhow::Error),

    /// Returned when the vocabulary file isn't valid JSON.
    DeserializeJson(serde_json::Error),

    /// Returned when content uses a tag the vocabulary doesn't declare.
    UnknownTag {
        tag: String,
        slug: String,
        vocabulary: PathBuf,
    },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::DeserializeJson(err) => err.fmt(f),
            Error::UnknownTag {
                tag,
                slug,
                vocabulary,
            } => write!(
                f,
                "tag `{}` on `{}` not found in the list of tags at `{}`",
                tag,
                slug,
                vocabulary.display()
            ),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err.as_ref()),
            Error::DeserializeJson(err) => Some(err),
            Error::UnknownTag { .. } => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    /// Converts an [`anyhow::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator when opening the vocabulary file.
    fn from(err: anyhow::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    /// Converts a [`serde_json::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for deserialization.
    fn from(err: serde_json::Error) -> Error {
        Error::DeserializeJson(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VOCABULARY: &str = r#"[
  { "name": "rust", "description": "The Rust programming language" },
  { "name": "meta", "description": "Posts about this site" }
]"#;

    fn record_with_tags(tags: &[&str]) -> Record {
        Record {
            slug: "example".to_owned(),
            path: PathBuf::from("blog/example.md"),
            title: "Example".to_owned(),
            description: "d".to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            body: String::new(),
            canonical: None,
            image: None,
            image_alt: None,
        }
    }

    fn fixture() -> (tempfile::TempDir, Vocabulary) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, VOCABULARY).unwrap();
        let vocabulary = Vocabulary::load(&path).unwrap();
        (dir, vocabulary)
    }

    #[test]
    fn test_known_tags_pass() -> Result<()> {
        let (_dir, vocabulary) = fixture();
        vocabulary.validate(&record_with_tags(&["rust", "meta"]))?;
        vocabulary.validate(&record_with_tags(&[]))?;
        Ok(())
    }

    #[test]
    fn test_unknown_tag_fails_with_context() {
        let (_dir, vocabulary) = fixture();
        match vocabulary.validate(&record_with_tags(&["rsut"])) {
            Err(Error::UnknownTag { tag, slug, .. }) => {
                assert_eq!(tag, "rsut");
                assert_eq!(slug, "example");
            }
            other => panic!("expected UnknownTag, got {:?}", other),
        }
    }
}
