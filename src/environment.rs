//! Classifies the environment a build is running in. The classification
//! decides which branch of the date resolver applies and whether cache
//! writes can ever make it back into version control.
//!
//! The classification is derived once per process from external signals
//! (environment variables set by the host) and then cross-checked against
//! the clone the build can actually see. A hosted build that somehow has
//! full history, or a local build that somehow doesn't, means the
//! assumptions behind the provenance cache no longer hold -- better to stop
//! than to build on them.

use crate::history::RevisionHistory;
use std::fmt;

/// Which kind of environment the build is running in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// A developer's machine: full history, and cache writes land in the
    /// working tree where they can be committed.
    Development,

    /// A CI or scripted build with a full clone. Behaves like development as
    /// far as the resolver is concerned.
    FullHistoryBuild,

    /// A production/preview build on hosting that clones shallowly. The
    /// cache is read-only here: anything written would be discarded with
    /// the build container, so writes are suppressed entirely.
    ShallowBuild,
}

impl Classification {
    /// Returns whether cache writes in this environment can persist.
    pub fn writes_cache(&self) -> bool {
        !matches!(self, Classification::ShallowBuild)
    }

    /// Derives the classification from the process environment: hosted
    /// builds set `DEPLOY_ENV` to `production` or `preview`, CI sets `CI`,
    /// and everything else is a developer's machine.
    pub fn detect() -> Result<Classification> {
        Classification::classify(
            std::env::var("DEPLOY_ENV").ok().as_deref(),
            std::env::var_os("CI").is_some(),
        )
    }

    fn classify(deploy_env: Option<&str>, ci: bool) -> Result<Classification> {
        match deploy_env {
            Some("production") | Some("preview") => {
                Ok(Classification::ShallowBuild)
            }
            Some(other) => {
                Err(Error::UnknownDeployEnvironment(other.to_owned()))
            }
            None if ci => Ok(Classification::FullHistoryBuild),
            None => Ok(Classification::Development),
        }
    }

    /// Checks the classification against the clone the build can actually
    /// see. Each classification implies a clone depth; a mismatch means
    /// either the host changed its cloning behavior or the build is running
    /// somewhere it wasn't meant to.
    pub fn verify<H: RevisionHistory>(&self, history: &H) -> Result<()> {
        match self {
            Classification::ShallowBuild => {
                if history.is_complete() {
                    Err(Error::UnexpectedFullClone)
                } else {
                    Ok(())
                }
            }
            Classification::Development | Classification::FullHistoryBuild => {
                if history.is_complete() {
                    Ok(())
                } else {
                    Err(Error::UnexpectedShallowClone)
                }
            }
        }
    }
}

/// The result of a fallible environment operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a contradiction between what the environment claims to be and
/// what the build can observe.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Returned when `DEPLOY_ENV` is set to something unrecognized.
    UnknownDeployEnvironment(String),

    /// Returned when a hosted build can reach the origin commit. Hosted
    /// builds are expected to be shallow; a full clone means the hosting
    /// setup changed out from under us.
    UnexpectedFullClone,

    /// Returned when a local or CI build can't reach the origin commit.
    /// The resolver would be unable to establish dates for new posts.
    UnexpectedShallowClone,
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownDeployEnvironment(value) => {
                write!(f, "unexpected DEPLOY_ENV value: `{}`", value)
            }
            Error::UnexpectedFullClone => write!(
                f,
                "found the origin commit, but this environment was expected \
                 to be a shallow clone"
            ),
            Error::UnexpectedShallowClone => write!(
                f,
                "could not find the origin commit (is this a shallow \
                 clone?); local and CI builds need the full history"
            ),
        }
    }
}

impl std::error::Error for Error {}
