//! Exports the [`build_site`] function which stitches together the
//! high-level steps of building the output static site: reading the posts
//! ([`crate::content`]), resolving their dates against the git history and
//! the provenance cache ([`crate::assemble`]), rendering post and index
//! pages ([`crate::write`]), and generating the Atom feed
//! ([`crate::feed`]).

use crate::assemble::{self, assemble};
use crate::cache::Cache;
use crate::config::Config;
use crate::content::{self, read_records};
use crate::environment::{self, Classification};
use crate::feed::{write_feed, Error as FeedError, FeedConfig};
use crate::history::{self, GitHistory, RevisionHistory};
use crate::resolver::Resolver;
use crate::tags::{self, Vocabulary};
use crate::write::{Error as WriteError, Writer};
use gtmpl::Template;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Builds the site from a [`Config`] object and the environment
/// classification computed at process start. This calls into
/// [`read_records`], [`assemble`], [`Writer::write_posts`], and
/// [`write_feed`] which do the heavy-lifting.
pub fn build_site(config: Config, environment: Classification) -> Result<()> {
    let history = GitHistory::discover(
        &config.project_root,
        &config.origin_commit,
        &config.merge_pattern,
    )?;
    environment.verify(&history)?;
    info!(
        "building in {:?} (history complete: {})",
        environment,
        history.is_complete()
    );

    let mut cache = Cache::open(&config.cache_file);
    let records = read_records(&config.content_directory, config.threads)?;
    let vocabulary = Vocabulary::load(&config.tags_file)?;

    let mut resolver = Resolver::new(&history, &mut cache, environment);
    let posts =
        assemble(records, &vocabulary, &mut resolver, &config.posts_url)?;

    // Parse the template files.
    let post_template = parse_template(config.post_template.iter())?;
    let index_template = parse_template(config.index_template.iter())?;

    // Blow away the old post output directory so renamed or deleted posts
    // don't leave stale pages behind. The root output directory is left
    // alone in case the user passed a directory that holds other things.
    rmdir(&config.posts_output_directory)?;

    let writer = Writer {
        post_template: &post_template,
        index_template: &index_template,
        posts_output_directory: &config.posts_output_directory,
        output_directory: &config.output_directory,
        home_page: &config.site_root,
        title: &config.title,
    };
    writer.write_posts(&posts)?;

    // create the atom feed
    write_feed(
        FeedConfig {
            title: config.title,
            id: config.site_root.to_string(),
            author: config.author,
            home_page: config.site_root,
        },
        &posts,
        File::create(config.output_directory.join("feed.atom"))?,
    )?;

    info!("wrote {} posts to {}", posts.len(), config.output_directory.display());
    Ok(())
}

// Loads the template file contents, appends them to one another, and parses
// the result into a template.
fn parse_template<P: AsRef<Path>>(
    template_files: impl Iterator<Item = P>,
) -> Result<Template> {
    let mut contents = String::new();
    for template_file in template_files {
        use std::io::Read;
        let template_file = template_file.as_ref();
        File::open(&template_file)
            .map_err(|e| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err: e,
            })?
            .read_to_string(&mut contents)?;
        contents.push(' ');
    }

    let mut template = Template::default();
    template.parse(&contents).map_err(Error::ParseTemplate)?;
    Ok(template)
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

/// The result of a fallible site build.
type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during content
/// reading, date resolution, writing, cleaning output directories, parsing
/// template files, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors reading content records.
    Content(content::Error),

    /// Returned for errors validating, resolving, or rendering posts.
    Assemble(assemble::Error),

    /// Returned for errors reading the revision history.
    History(history::Error),

    /// Returned when the environment classification contradicts the
    /// observed clone.
    Environment(environment::Error),

    /// Returned for errors loading the tag vocabulary.
    Tags(tags::Error),

    /// Returned for errors writing post pages to disk as HTML files.
    Write(WriteError),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned for I/O problems while cleaning output directories.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate(String),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Content(err) => err.fmt(f),
            Error::Assemble(err) => err.fmt(f),
            Error::History(err) => err.fmt(f),
            Error::Environment(err) => err.fmt(f),
            Error::Tags(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Content(err) => Some(err),
            Error::Assemble(err) => Some(err),
            Error::History(err) => Some(err),
            Error::Environment(err) => Some(err),
            Error::Tags(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<content::Error> for Error {
    /// Converts [`content::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: content::Error) -> Error {
        Error::Content(err)
    }
}

impl From<assemble::Error> for Error {
    /// Converts [`assemble::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: assemble::Error) -> Error {
        Error::Assemble(err)
    }
}

impl From<history::Error> for Error {
    /// Converts [`history::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: history::Error) -> Error {
        Error::History(err)
    }
}

impl From<environment::Error> for Error {
    /// Converts [`environment::Error`]s into [`Error`]. This allows us to
    /// use the `?` operator.
    fn from(err: environment::Error) -> Error {
        Error::Environment(err)
    }
}

impl From<tags::Error> for Error {
    /// Converts [`tags::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: tags::Error) -> Error {
        Error::Tags(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<FeedError> for Error {
    /// Converts [`FeedError`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
