//! Support for creating Atom feeds from a list of resolved posts. The feed's
//! entry dates come from resolved provenance, so feed readers see the same
//! `published`/`updated` timeline as the site itself.

use crate::assemble::ResolvedPost;
use crate::config::Author;
use atom_syndication::{Entry, Error as AtomError, Feed, Link, Person, Text};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use std::io::Write;
use url::Url;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub id: String,
    pub author: Option<Author>,
    pub home_page: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// [`ResolvedPost`]s and writes the result to a [`std::io::Write`]. This
/// function takes ownership of the provided [`FeedConfig`].
pub fn write_feed<W: Write>(
    config: FeedConfig,
    posts: &[ResolvedPost],
    w: W,
) -> Result<()> {
    feed(config, posts).write_to(w)?;
    Ok(())
}

fn feed(config: FeedConfig, posts: &[ResolvedPost]) -> Feed {
    let mut feed = Feed::default();
    feed.set_entries(feed_entries(&config, posts));
    feed.set_title(Text::plain(config.title));
    feed.set_id(config.id);
    feed.set_updated(fixed(
        posts
            .iter()
            .map(|post| post.last_updated)
            .max()
            .unwrap_or_else(Utc::now),
    ));
    feed.set_authors(author_to_people(config.author));
    feed.set_links(vec![alternate_link(config.home_page.as_str())]);
    feed
}

fn feed_entries(config: &FeedConfig, posts: &[ResolvedPost]) -> Vec<Entry> {
    let mut entries: Vec<Entry> = Vec::with_capacity(posts.len());
    for post in posts {
        let mut entry = Entry::default();
        entry.set_id(post.url.to_string());
        entry.set_title(Text::plain(post.title.clone()));
        entry.set_updated(fixed(post.last_updated));
        entry.set_published(fixed(post.published));
        entry.set_authors(author_to_people(config.author.clone()));
        entry.set_links(vec![alternate_link(post.url.as_str())]);
        entry.set_summary(Some(Text::plain(post.description.clone())));
        entries.push(entry);
    }
    entries
}

fn alternate_link(href: &str) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

fn fixed(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&FixedOffset::east(0))
}

fn author_to_people(author: Option<Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name);
            person.set_email(author.email);
            vec![person]
        }
        None => Vec::new(),
    }
}

/// The result of a fallible feed operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}
