//! The library code for the `bylines` static site generator. The architecture
//! can be generally broken down into three distinct steps:
//!
//! 1. Reading raw posts from markdown source files on disk
//!    ([`crate::content`])
//! 2. Resolving each post's publication dates from the git history
//!    ([`crate::resolver`])
//! 3. Rendering the resolved posts into output files on disk
//!    ([`crate::write`] and [`crate::feed`])
//!
//! Of the three, the second step is the interesting one. A post's `published`
//! and `lastUpdated` dates are not written into its front matter; they are
//! derived from the commits that touched the post's source file. The catch is
//! that no single environment can see the whole picture: local development has
//! the full history, but production hosting builds from a shallow clone that
//! only contains a recent window of commits. The [`crate::cache`] module
//! persists dates observed while full history was visible so that
//! shallow-history builds can recover them, and the [`crate::resolver`] module
//! reconciles the three sources (history, cache, and the current environment)
//! into a single authoritative answer -- or refuses to build rather than
//! publish a fabricated date.
//!
//! The remaining modules are supporting cast: [`crate::history`] wraps git
//! behind a small trait, [`crate::environment`] classifies the build
//! environment, [`crate::tags`] validates post tags against a closed
//! vocabulary, [`crate::assemble`] glues content and dates together, and
//! [`crate::markdown`] converts post bodies to HTML.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod assemble;
pub mod build;
pub mod cache;
pub mod config;
pub mod content;
pub mod environment;
pub mod feed;
pub mod history;
pub mod markdown;
pub mod resolver;
pub mod tags;
pub mod util;
pub mod write;
