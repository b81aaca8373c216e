//! Responsible for templating and writing HTML pages to disk from
//! [`ResolvedPost`]s: one page per post, plus a single index page listing
//! every post newest-first.

use crate::assemble::ResolvedPost;
use gtmpl::{Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use url::Url;

/// Writes post and index pages. See [`Writer::write_posts`].
pub struct Writer<'a> {
    /// The template for post pages.
    pub post_template: &'a Template,

    /// The template for the index page.
    pub index_template: &'a Template,

    /// The directory post pages are written into, as
    /// `{posts_output_directory}/{slug}.html`.
    pub posts_output_directory: &'a Path,

    /// The directory the index page is written into, as
    /// `{output_directory}/index.html`.
    pub output_directory: &'a Path,

    /// The URL for the site's home page, made available to every template,
    /// typically as the destination for the site-header link.
    pub home_page: &'a Url,

    /// The site title, made available to every template.
    pub title: &'a str,
}

impl Writer<'_> {
    /// Renders every post page and the index page. Output directories are
    /// created as needed.
    pub fn write_posts(&self, posts: &[ResolvedPost]) -> Result<()> {
        std::fs::create_dir_all(self.posts_output_directory)?;
        std::fs::create_dir_all(self.output_directory)?;

        for post in posts {
            self.write_page(
                self.post_template,
                post.to_value(),
                &self
                    .posts_output_directory
                    .join(format!("{}.html", post.slug)),
            )?;
        }

        self.write_page(
            self.index_template,
            Value::Array(posts.iter().map(|post| post.to_value()).collect()),
            &self.output_directory.join("index.html"),
        )
    }

    /// Templates a single page and writes it to `file_path`. The template
    /// sees an object with `item` (the page's main value), `home_page`, and
    /// `title` fields.
    fn write_page(
        &self,
        template: &Template,
        item: Value,
        file_path: &Path,
    ) -> Result<()> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("item".to_owned(), item);
        m.insert(
            "home_page".to_owned(),
            Value::String(self.home_page.to_string()),
        );
        m.insert("title".to_owned(), Value::String(self.title.to_owned()));

        let context = gtmpl::Context::from(Value::Object(m))?;
        template.execute(&mut std::fs::File::create(file_path)?, &context)?;
        Ok(())
    }
}

/// The result of a fallible page-writing operation.
type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating.
    Template(String),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<String> for Error {
    /// Converts a template error message ([`String`]) into an [`Error`]. This
    /// allows us to use the `?` operator for fallible template operations.
    fn from(err: String) -> Error {
        Error::Template(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}
