//! Access to the git history backing the site's content. The
//! [`RevisionHistory`] trait is the seam between the date-resolution logic
//! and git itself: [`crate::resolver`] only ever sees ordered lists of
//! [`Revision`]s, never raw git objects.
//!
//! Merge/integration commits are excluded before revisions leave this module.
//! They record the act of merging a branch, not a real change to any post, so
//! counting them would shift a post's `lastUpdated` date every time the
//! development branch lands. Which commit messages count as merges is
//! project-specific, so the pattern is configuration rather than hard-coded.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// A single non-merge commit that touched a file. The `id` is an opaque,
/// stable identifier; nothing in this crate parses it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// The contract between the date resolver and whatever version-control
/// tooling is actually available.
pub trait RevisionHistory {
    /// Returns every non-merge revision that touched `path`, sorted newest
    /// first. An empty list is a valid, meaningful result: the file exists on
    /// disk but has never been committed. A [`Error`] means the history
    /// itself could not be read, which is a different situation entirely.
    fn revisions_for(&self, path: &Path) -> Result<Vec<Revision>>;

    /// Returns the newest non-merge revision on the tracked branch, or `None`
    /// for a repository with no commits at all. This is the "frontier": any
    /// file whose newest revision equals the frontier was touched by the very
    /// latest commit, and that fact survives any clone depth.
    fn frontier(&self) -> Result<Option<Revision>>;

    /// Returns whether the underlying clone contains the full history.
    /// Shallow clones (as made by production hosting) return `false`.
    fn is_complete(&self) -> bool;
}

/// [`RevisionHistory`] backed by a local git repository via `git2`.
pub struct GitHistory {
    repo: git2::Repository,
    workdir: PathBuf,
    origin_commit: git2::Oid,
    merge_pattern: String,
}

impl GitHistory {
    /// Discovers the repository containing `root`. `origin_commit` is the
    /// known id of the repository's first commit, used to detect shallow
    /// clones: if that commit can't be found, the clone is truncated.
    /// `merge_pattern` is the commit-message prefix that identifies
    /// merge/integration commits.
    pub fn discover(
        root: &Path,
        origin_commit: &str,
        merge_pattern: &str,
    ) -> Result<GitHistory> {
        let repo = git2::Repository::discover(root)?;
        let workdir = repo
            .workdir()
            .ok_or(Error::BareRepository)?
            .canonicalize()?;
        Ok(GitHistory {
            repo,
            workdir,
            origin_commit: git2::Oid::from_str(origin_commit)?,
            merge_pattern: merge_pattern.to_owned(),
        })
    }

    fn is_merge(&self, commit: &git2::Commit) -> bool {
        commit
            .message()
            .map_or(false, |message| message.starts_with(&self.merge_pattern))
    }

    /// Converts `path` to the repository-relative form git trees are indexed
    /// by. Absolute paths are canonicalized first so that symlinked working
    /// directories don't produce spurious mismatches.
    fn relative_to_workdir(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.canonicalize()?
        } else {
            self.workdir.join(path).canonicalize()?
        };
        match absolute.strip_prefix(&self.workdir) {
            Ok(relative) => Ok(relative.to_owned()),
            Err(_) => Err(Error::OutsideRepository(path.to_owned())),
        }
    }

    /// Returns whether `commit` changed the contents of `path` relative to
    /// its first parent. At the root of the history -- or at the grafted
    /// boundary of a shallow clone, where the parent objects don't exist --
    /// merely containing the path counts as touching it.
    fn touches(&self, commit: &git2::Commit, path: &Path) -> Result<bool> {
        let blob = blob_id(&commit.tree()?, path)?;
        match commit.parent(0) {
            Err(_) => Ok(blob.is_some()),
            Ok(parent) => {
                let parent_blob = blob_id(&parent.tree()?, path)?;
                Ok(blob != parent_blob)
            }
        }
    }

    /// Walks the tracked branch from HEAD, newest first, skipping merge
    /// commits. An unborn branch yields an empty walk.
    fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&git2::Commit) -> Result<bool>,
    {
        let mut walk = match self.repo.revwalk() {
            Ok(walk) => walk,
            Err(err) => return Err(Error::Git(err)),
        };
        if let Err(err) = walk.push_head() {
            // A repository with no commits yet has no history to walk.
            return match err.code() {
                git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound => {
                    Ok(())
                }
                _ => Err(Error::Git(err)),
            };
        }
        walk.set_sorting(git2::Sort::TIME)?;
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            if self.is_merge(&commit) {
                continue;
            }
            if !visit(&commit)? {
                break;
            }
        }
        Ok(())
    }
}

/// Returns the id of the blob at `path` in `tree`, or `None` if the tree
/// doesn't contain the path.
fn blob_id(tree: &git2::Tree, path: &Path) -> Result<Option<git2::Oid>> {
    match tree.get_path(path) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(err) => Err(Error::Git(err)),
    }
}

fn revision(commit: &git2::Commit) -> Revision {
    Revision {
        id: commit.id().to_string(),
        timestamp: Utc.timestamp(commit.time().seconds(), 0),
    }
}

impl RevisionHistory for GitHistory {
    fn revisions_for(&self, path: &Path) -> Result<Vec<Revision>> {
        let relative = self.relative_to_workdir(path)?;
        let mut revisions = Vec::new();
        self.walk(|commit| {
            if self.touches(commit, &relative)? {
                revisions.push(revision(commit));
            }
            Ok(true)
        })?;
        // Walk order is already newest-first, but sort explicitly rather
        // than rely on it.
        revisions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(revisions)
    }

    fn frontier(&self) -> Result<Option<Revision>> {
        let mut frontier = None;
        self.walk(|commit| {
            frontier = Some(revision(commit));
            Ok(false)
        })?;
        Ok(frontier)
    }

    fn is_complete(&self) -> bool {
        self.repo.find_commit(self.origin_commit).is_ok()
    }
}

/// The result of a fallible history operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to read the revision history at all. Note that an
/// empty history for a path is not an error; it means the file isn't tracked
/// yet.
#[derive(Debug)]
pub enum Error {
    /// Returned when the underlying git operation failed.
    Git(git2::Error),

    /// Returned when the repository has no working directory to resolve
    /// content paths against.
    BareRepository,

    /// Returned when asked about a path that isn't inside the repository's
    /// working directory.
    OutsideRepository(PathBuf),

    /// Returned for I/O errors canonicalizing content paths.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Git(err) => err.fmt(f),
            Error::BareRepository => {
                write!(f, "repository has no working directory")
            }
            Error::OutsideRepository(path) => write!(
                f,
                "path `{}` is outside the repository working directory",
                path.display()
            ),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Git(err) => Some(err),
            Error::BareRepository => None,
            Error::OutsideRepository(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<git2::Error> for Error {
    /// Converts a [`git2::Error`] into an [`Error`]. It allows us to use the
    /// `?` operator for git operations.
    fn from(err: git2::Error) -> Error {
        Error::Git(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
