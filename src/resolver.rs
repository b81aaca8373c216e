//! Resolves a post's `published` and `lastUpdated` dates by reconciling the
//! visible git history, the on-disk provenance cache, and the current build
//! environment.
//!
//! The rules, evaluated top to bottom with the first match winning:
//!
//! 1. No revisions for the post's file: it's an uncommitted draft. Both
//!    dates are the capture time. The cache is left alone.
//! 2. Exactly one revision, and it's the branch frontier: the post was
//!    created by the very latest commit. Both dates come from that
//!    revision, and the cache learns them so shallow builds can recover
//!    them later.
//! 3. Exactly one revision, older than the frontier: with complete history
//!    the dates are trivially that revision's timestamp. With shallow
//!    history the only legitimate source is the cache -- an absent entry is
//!    a process failure, not something to paper over with a guess.
//! 4. Multiple revisions: `published` is immutable once cached and is only
//!    ever derived (from the oldest revision) when complete history is
//!    visible and the cache has nothing yet. `lastUpdated` prefers a
//!    frontier match -- "this file changed in the very latest commit" is
//!    true at any clone depth -- and otherwise falls back to the cache,
//!    then to the newest visible revision under complete history.
//!
//! The invariant behind case 3 and 4: any post whose history predates the
//! shallow-clone horizon must have passed through a full-history build that
//! cached its dates. If it didn't, the cache wasn't committed before the
//! production build ran, and the correct response is to fail the build
//! loudly. Guessed dates would flow straight into feeds and sitemaps that
//! treat them as authoritative.

use crate::cache::{self, Cache, Provenance};
use crate::environment::Classification;
use crate::history::{self, RevisionHistory};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves publication dates for one build pass. Holds the cache by
/// exclusive reference, which keeps cache rewrites single-writer for the
/// whole pass by construction.
pub struct Resolver<'a, H> {
    history: &'a H,
    cache: &'a mut Cache,
    environment: Classification,
}

impl<'a, H: RevisionHistory> Resolver<'a, H> {
    /// Constructs a resolver from its three collaborators. There are no
    /// hidden singletons here; everything the resolver consults is visible
    /// in this signature.
    pub fn new(
        history: &'a H,
        cache: &'a mut Cache,
        environment: Classification,
    ) -> Resolver<'a, H> {
        Resolver {
            history,
            cache,
            environment,
        }
    }

    /// Resolves the dates for the post identified by `slug`, whose source
    /// file is at `path`.
    pub fn resolve(&mut self, slug: &str, path: &Path) -> Result<Provenance> {
        let revisions = self.history.revisions_for(path)?;
        let frontier = self.history.frontier()?;
        let frontier_id = frontier.as_ref().map(|revision| revision.id.as_str());

        match revisions.as_slice() {
            // Uncommitted draft: the file exists but has no history yet.
            [] => {
                debug!("`{}` has no commits; treating as a draft", slug);
                // A cache entry for an untracked slug means the file was
                // removed from version control and re-created. Left alone,
                // the stale entry would resurrect the old dates if the file
                // is ever committed again.
                if self.environment.writes_cache()
                    && self.cache.lookup(slug).is_some()
                {
                    warn!(
                        "`{}` has no commits but a cache entry; removing \
                         the stale entry",
                        slug
                    );
                    self.cache.remove(slug)?;
                }
                Ok(Provenance::point(Utc::now()))
            }

            [only] => {
                if Some(only.id.as_str()) == frontier_id {
                    // Created by the very latest commit.
                    let resolved = Provenance::point(only.timestamp);
                    self.record(slug, resolved)?;
                    Ok(resolved)
                } else if self.history.is_complete() {
                    // An older single-commit post. With the whole history
                    // visible, its one revision is both dates.
                    let resolved = Provenance::point(only.timestamp);
                    self.record(slug, resolved)?;
                    Ok(resolved)
                } else {
                    // Shallow clone: the one visible revision may not be the
                    // post's only revision. Only the cache knows.
                    self.cached(slug, path)
                }
            }

            [newest, .., oldest] => {
                let cached = self.cache.lookup(slug);

                let published = match cached {
                    // Once cached, `published` is never re-derived; the
                    // visible history may be missing the commit that
                    // established it.
                    Some(entry) => entry.published,
                    None if self.history.is_complete() => oldest.timestamp,
                    None => return Err(self.missing(slug, path)),
                };

                let last_updated = if Some(newest.id.as_str()) == frontier_id {
                    // The post changed in the very latest commit. That
                    // observation is valid at any clone depth and beats
                    // whatever the cache has.
                    newest.timestamp
                } else {
                    match cached {
                        Some(entry) => entry.last_updated,
                        // Complete history with no cache entry; the shallow
                        // case already failed above.
                        None => newest.timestamp,
                    }
                };

                let resolved = Provenance {
                    published,
                    last_updated,
                };
                self.record(slug, resolved)?;
                Ok(resolved)
            }
        }
    }

    /// Writes `resolved` through to the cache when the environment is one
    /// whose cache writes can make it back into version control. A shallow
    /// production build's cache file is discarded with the build container,
    /// so writing there would only mask a missing entry until the next
    /// deploy.
    fn record(&mut self, slug: &str, resolved: Provenance) -> Result<()> {
        if self.environment.writes_cache() {
            let written = self.cache.upsert(slug, resolved)?;
            if written {
                debug!(
                    "cached dates for `{}`: published {}, last updated {}",
                    slug, resolved.published, resolved.last_updated
                );
            }
        }
        Ok(())
    }

    fn cached(&self, slug: &str, path: &Path) -> Result<Provenance> {
        match self.cache.lookup(slug) {
            Some(entry) => Ok(entry),
            None => Err(self.missing(slug, path)),
        }
    }

    fn missing(&self, slug: &str, path: &Path) -> Error {
        Error::MissingCacheEntry {
            slug: slug.to_owned(),
            path: path.to_owned(),
        }
    }
}

/// The result of a fallible date resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to resolve a post's dates. All variants abort the
/// build; publishing wrong dates silently would be worse.
#[derive(Debug)]
pub enum Error {
    /// Returned when the revision history itself could not be read.
    History(history::Error),

    /// Returned when the cache file could not be rewritten.
    Cache(cache::Error),

    /// Returned when a post's history extends beyond the visible clone and
    /// the cache has no entry for it. The entry should have been written --
    /// and committed -- by a full-history build before this one ran.
    MissingCacheEntry { slug: String, path: PathBuf },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::History(err) => err.fmt(f),
            Error::Cache(err) => err.fmt(f),
            Error::MissingCacheEntry { slug, path } => write!(
                f,
                "no cached dates for `{}` ({}): its oldest commit is beyond \
                 this clone's history and the cache has no entry for it; run \
                 a full-history build and commit the updated cache file",
                slug,
                path.display()
            ),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::History(err) => Some(err),
            Error::Cache(err) => Some(err),
            Error::MissingCacheEntry { .. } => None,
        }
    }
}

impl From<history::Error> for Error {
    /// Converts a [`history::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for history queries.
    fn from(err: history::Error) -> Error {
        Error::History(err)
    }
}

impl From<cache::Error> for Error {
    /// Converts a [`cache::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for cache writes.
    fn from(err: cache::Error) -> Error {
        Error::Cache(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::history::testing::FakeHistory;
    use crate::history::Revision;
    use chrono::{DateTime, Utc};

    const PATH: &str = "blog/hello-world.md";
    const SLUG: &str = "hello-world";

    fn instant(iso: &str) -> DateTime<Utc> {
        iso.parse().unwrap()
    }

    fn revision(id: &str, iso: &str) -> Revision {
        Revision {
            id: id.to_owned(),
            timestamp: instant(iso),
        }
    }

    fn empty_cache() -> (tempfile::TempDir, Cache) {
        // The directory handle must stay alive for as long as the cache
        // might write to it.
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(&dir.path().join("posts.json"));
        (dir, cache)
    }

    #[test]
    fn test_untracked_file_resolves_to_capture_time() -> Result<()> {
        let history = FakeHistory::new(true)
            .with_frontier(revision("f", "2023-06-15T12:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let before = Utc::now();
        let resolved = resolver.resolve("draft-post", Path::new("blog/draft-post.md"))?;
        let after = Utc::now();

        assert_eq!(resolved.published, resolved.last_updated);
        assert!(resolved.published >= before && resolved.published <= after);
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_untracked_file_clears_stale_cache_entry() -> Result<()> {
        let history = FakeHistory::new(true)
            .with_frontier(revision("f", "2023-06-15T12:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        cache
            .upsert(
                "removed-and-recreated",
                Provenance::point(instant("2021-01-01T00:00:00Z")),
            )
            .unwrap();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        resolver.resolve(
            "removed-and-recreated",
            Path::new("blog/removed-and-recreated.md"),
        )?;
        assert_eq!(cache.lookup("removed-and-recreated"), None);
        Ok(())
    }

    #[test]
    fn test_single_revision_at_frontier_caches_dates() -> Result<()> {
        let created = revision("abc", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(true)
            .with_revisions(PATH, vec![created.clone()])
            .with_frontier(created);
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved, Provenance::point(instant("2023-06-15T12:00:00Z")));
        assert_eq!(cache.lookup(SLUG), Some(resolved));
        Ok(())
    }

    #[test]
    fn test_single_old_revision_with_complete_history() -> Result<()> {
        let history = FakeHistory::new(true)
            .with_revisions(PATH, vec![revision("abc", "2023-01-01T00:00:00Z")])
            .with_frontier(revision("fff", "2023-06-15T12:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved, Provenance::point(instant("2023-01-01T00:00:00Z")));
        assert_eq!(cache.lookup(SLUG), Some(resolved));
        Ok(())
    }

    #[test]
    fn test_single_old_revision_with_shallow_history_requires_cache() {
        let history = FakeHistory::new(false)
            .with_revisions(PATH, vec![revision("abc", "2023-05-01T00:00:00Z")])
            .with_frontier(revision("fff", "2023-06-15T12:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::ShallowBuild);

        match resolver.resolve(SLUG, Path::new(PATH)) {
            Err(Error::MissingCacheEntry { slug, .. }) => {
                assert_eq!(slug, SLUG)
            }
            other => panic!("expected MissingCacheEntry, got {:?}", other),
        }
    }

    #[test]
    fn test_single_old_revision_with_shallow_history_uses_cache() -> Result<()> {
        let history = FakeHistory::new(false)
            .with_revisions(PATH, vec![revision("abc", "2023-05-01T00:00:00Z")])
            .with_frontier(revision("fff", "2023-06-15T12:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let entry = Provenance {
            published: instant("2022-11-11T00:00:00Z"),
            last_updated: instant("2023-05-01T00:00:00Z"),
        };
        cache.upsert(SLUG, entry).unwrap();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::ShallowBuild);

        // The cached entry is returned unchanged, including a `published`
        // older than anything the shallow clone can see.
        assert_eq!(resolver.resolve(SLUG, Path::new(PATH))?, entry);
        Ok(())
    }

    #[test]
    fn test_multiple_revisions_complete_history_empty_cache() -> Result<()> {
        let newest = revision("new", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(true)
            .with_revisions(
                PATH,
                vec![
                    revision("old", "2023-01-01T00:00:00Z"),
                    newest.clone(),
                ],
            )
            .with_frontier(revision("fff", "2023-07-01T00:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let mut resolver = Resolver::new(
            &history,
            &mut cache,
            Classification::FullHistoryBuild,
        );

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved.published, instant("2023-01-01T00:00:00Z"));
        assert_eq!(resolved.last_updated, instant("2023-06-15T12:00:00Z"));
        assert!(resolved.published <= resolved.last_updated);
        assert_eq!(cache.lookup(SLUG), Some(resolved));
        Ok(())
    }

    #[test]
    fn test_multiple_revisions_shallow_frontier_match_uses_cache_published(
    ) -> Result<()> {
        // The shallow clone sees only a recent window, whose newest revision
        // is the branch frontier.
        let newest = revision("new", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(false)
            .with_revisions(
                PATH,
                vec![
                    revision("mid", "2023-03-01T00:00:00Z"),
                    newest.clone(),
                ],
            )
            .with_frontier(newest);
        let (_dir, mut cache) = empty_cache();
        cache
            .upsert(
                SLUG,
                Provenance {
                    published: instant("2023-01-01T00:00:00Z"),
                    last_updated: instant("2023-06-15T12:00:00Z"),
                },
            )
            .unwrap();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::ShallowBuild);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        // `published` from the cache, `lastUpdated` confirmed fresh by the
        // frontier match.
        assert_eq!(resolved.published, instant("2023-01-01T00:00:00Z"));
        assert_eq!(resolved.last_updated, instant("2023-06-15T12:00:00Z"));
        Ok(())
    }

    #[test]
    fn test_frontier_match_beats_stale_cached_last_updated() -> Result<()> {
        let newest = revision("new", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(true)
            .with_revisions(
                PATH,
                vec![
                    revision("old", "2023-01-01T00:00:00Z"),
                    newest.clone(),
                ],
            )
            .with_frontier(newest);
        let (_dir, mut cache) = empty_cache();
        cache
            .upsert(
                SLUG,
                Provenance {
                    published: instant("2023-01-01T00:00:00Z"),
                    last_updated: instant("2023-03-01T00:00:00Z"),
                },
            )
            .unwrap();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved.last_updated, instant("2023-06-15T12:00:00Z"));
        // And the fresher observation was written back.
        assert_eq!(
            cache.lookup(SLUG).unwrap().last_updated,
            instant("2023-06-15T12:00:00Z")
        );
        Ok(())
    }

    #[test]
    fn test_multiple_revisions_shallow_empty_cache_fails() {
        let history = FakeHistory::new(false)
            .with_revisions(
                PATH,
                vec![
                    revision("mid", "2023-03-01T00:00:00Z"),
                    revision("new", "2023-06-15T12:00:00Z"),
                ],
            )
            .with_frontier(revision("fff", "2023-07-01T00:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::ShallowBuild);

        match resolver.resolve(SLUG, Path::new(PATH)) {
            Err(Error::MissingCacheEntry { slug, path }) => {
                assert_eq!(slug, SLUG);
                assert_eq!(path, Path::new(PATH));
            }
            other => panic!("expected MissingCacheEntry, got {:?}", other),
        }
    }

    #[test]
    fn test_published_is_immutable_once_cached() -> Result<()> {
        // Complete history disagrees with the cache about `published`; the
        // cache wins because re-derivation is never trusted after the fact.
        let history = FakeHistory::new(true)
            .with_revisions(
                PATH,
                vec![
                    revision("old", "2023-02-01T00:00:00Z"),
                    revision("new", "2023-06-15T12:00:00Z"),
                ],
            )
            .with_frontier(revision("fff", "2023-07-01T00:00:00Z"));
        let (_dir, mut cache) = empty_cache();
        cache
            .upsert(
                SLUG,
                Provenance {
                    published: instant("2023-01-01T00:00:00Z"),
                    last_updated: instant("2023-06-15T12:00:00Z"),
                },
            )
            .unwrap();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved.published, instant("2023-01-01T00:00:00Z"));
        Ok(())
    }

    #[test]
    fn test_resolution_is_idempotent() -> Result<()> {
        let newest = revision("new", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(true)
            .with_revisions(
                PATH,
                vec![
                    revision("old", "2023-01-01T00:00:00Z"),
                    newest.clone(),
                ],
            )
            .with_frontier(newest);
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::Development);

        let first = resolver.resolve(SLUG, Path::new(PATH))?;
        let second = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(first, second);

        // The second pass resolved to the same values, so the second upsert
        // must have been a no-op.
        assert!(!cache.upsert(SLUG, second).unwrap());
        Ok(())
    }

    #[test]
    fn test_shallow_build_never_writes_cache() -> Result<()> {
        let created = revision("abc", "2023-06-15T12:00:00Z");
        let history = FakeHistory::new(false)
            .with_revisions(PATH, vec![created.clone()])
            .with_frontier(created);
        let (_dir, mut cache) = empty_cache();
        let mut resolver =
            Resolver::new(&history, &mut cache, Classification::ShallowBuild);

        let resolved = resolver.resolve(SLUG, Path::new(PATH))?;
        assert_eq!(resolved, Provenance::point(instant("2023-06-15T12:00:00Z")));
        assert!(cache.is_empty());
        Ok(())
    }
}
