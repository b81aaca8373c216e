//! The on-disk provenance cache. Maps post slugs to the dates derived from
//! the git history while full history was still visible, so that later
//! shallow-history builds can recover them.
//!
//! The cache is a single pretty-printed JSON document, committed to version
//! control alongside the posts themselves. The whole file is rewritten on any
//! change; there are no partial updates. A missing or malformed cache file is
//! not an error -- the cache starts empty and the condition is logged for
//! whoever is running the build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A post's resolved publication dates. `published` is the timestamp of the
/// oldest non-merge commit that touched the post's source file and
/// `last_updated` the timestamp of the newest. Once a post's `published` date
/// lands in the cache it is never re-derived from history, which may be
/// truncated by the time anyone looks again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub published: DateTime<Utc>,

    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl Provenance {
    /// Constructs a [`Provenance`] whose `published` and `last_updated` are
    /// the same instant, as for a post created and last touched by a single
    /// commit.
    pub fn point(instant: DateTime<Utc>) -> Provenance {
        Provenance {
            published: instant,
            last_updated: instant,
        }
    }
}

/// The slug-to-[`Provenance`] cache, backed by one JSON file on disk.
///
/// Writes are eager: [`Cache::upsert`] serializes and rewrites the whole file
/// before returning, so a crash immediately after an upsert never loses the
/// entry just written. Entries are kept in a [`BTreeMap`] so the serialized
/// file is sorted by slug and diffs cleanly under version control.
pub struct Cache {
    path: PathBuf,
    entries: BTreeMap<String, Provenance>,
}

impl Cache {
    /// Opens the cache at `path`, reading any existing entries. A missing or
    /// malformed file yields an empty cache rather than an error; the
    /// condition is logged so an operator can tell the difference between
    /// "first build" and "someone corrupted the cache file".
    pub fn open(path: &Path) -> Cache {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        "malformed cache file `{}`; continuing with an empty cache: {}",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) => {
                warn!(
                    "could not read cache file `{}`; continuing with an empty cache: {}",
                    path.display(),
                    err
                );
                BTreeMap::new()
            }
        };

        Cache {
            path: path.to_owned(),
            entries,
        }
    }

    /// Returns the cached [`Provenance`] for `slug`, if any.
    pub fn lookup(&self, slug: &str) -> Option<Provenance> {
        self.entries.get(slug).copied()
    }

    /// Inserts or replaces the entry for `slug` and rewrites the cache file.
    /// Returns whether the file was actually rewritten: upserting a value
    /// identical to the one already cached is a no-op.
    pub fn upsert(&mut self, slug: &str, entry: Provenance) -> Result<bool> {
        if self.entries.get(slug) == Some(&entry) {
            return Ok(false);
        }
        self.entries.insert(slug.to_owned(), entry);
        self.write()?;
        Ok(true)
    }

    /// Removes the entry for `slug`, if present, and rewrites the cache file.
    /// Only used when a post's file has disappeared from version control
    /// entirely, which shouldn't happen in the normal course of things.
    pub fn remove(&mut self, slug: &str) -> Result<bool> {
        match self.entries.remove(slug) {
            None => Ok(false),
            Some(_) => {
                self.write()?;
                Ok(true)
            }
        }
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut serialized = serde_json::to_string_pretty(&self.entries)?;
        serialized.push('\n');
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

/// The result of a fallible cache operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing the cache file. Read errors are deliberately
/// not represented here; they degrade to an empty cache in [`Cache::open`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the cache entries can't be serialized to JSON.
    Serialize(serde_json::Error),

    /// Returned for I/O errors rewriting the cache file.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Serialize(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialize(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    /// Converts a [`serde_json::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for serialization functions.
    fn from(err: serde_json::Error) -> Error {
        Error::Serialize(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn provenance(published: &str, last_updated: &str) -> Provenance {
        Provenance {
            published: published.parse().unwrap(),
            last_updated: last_updated.parse().unwrap(),
        }
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.json");
        let entry =
            provenance("2023-01-01T00:00:00Z", "2023-06-15T12:00:00Z");

        let mut cache = Cache::open(&path);
        assert!(cache.is_empty());
        assert!(cache.upsert("hello-world", entry)?);

        // A fresh handle must read back exactly what was written.
        let reopened = Cache::open(&path);
        assert_eq!(reopened.lookup("hello-world"), Some(entry));
        assert_eq!(reopened.len(), 1);
        Ok(())
    }

    #[test]
    fn test_upsert_unchanged_is_noop() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.json");
        let entry = Provenance::point(Utc.ymd(2021, 4, 16).and_hms(8, 0, 0));

        let mut cache = Cache::open(&path);
        assert!(cache.upsert("repeat", entry)?);
        assert!(!cache.upsert("repeat", entry)?);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(&dir.path().join("does-not-exist.json"));
        assert!(cache.is_empty());
        assert_eq!(cache.lookup("anything"), None);
    }

    #[test]
    fn test_malformed_file_is_empty_cache() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.json");
        std::fs::write(&path, "{ not json")?;

        let mut cache = Cache::open(&path);
        assert!(cache.is_empty());

        // The cache must still be writable after recovering.
        let entry =
            provenance("2022-02-02T00:00:00Z", "2022-03-03T00:00:00Z");
        assert!(cache.upsert("recovered", entry)?);
        assert_eq!(Cache::open(&path).lookup("recovered"), Some(entry));
        Ok(())
    }

    #[test]
    fn test_serialized_form_is_diffable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.json");

        let mut cache = Cache::open(&path);
        cache.upsert(
            "zebra",
            provenance("2021-01-01T00:00:00Z", "2021-01-02T00:00:00Z"),
        )?;
        cache.upsert(
            "aardvark",
            provenance("2020-01-01T00:00:00Z", "2020-01-02T00:00:00Z"),
        )?;

        let contents = std::fs::read_to_string(&path)?;
        // Pretty-printed, sorted by slug, camelCase field names.
        assert!(contents.contains("\n  \"aardvark\""));
        assert!(contents.contains("\"lastUpdated\""));
        assert!(
            contents.find("aardvark").unwrap()
                < contents.find("zebra").unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_remove() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posts.json");

        let mut cache = Cache::open(&path);
        cache.upsert(
            "gone",
            provenance("2021-01-01T00:00:00Z", "2021-01-02T00:00:00Z"),
        )?;
        assert!(cache.remove("gone")?);
        assert!(!cache.remove("gone")?);
        assert_eq!(Cache::open(&path).lookup("gone"), None);
        Ok(())
    }
}
