//! Reads raw posts from markdown source files. Each source file is YAML
//! front matter between `---` fences followed by a markdown body; the post's
//! slug is its file name less the `.md` extension. No dates appear in the
//! front matter -- those come from the git history via
//! [`crate::resolver`] -- and nothing here renders markdown; records carry
//! the raw body for [`crate::markdown`] to process later.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::{read_dir, File};
use std::path::{Path, PathBuf};
use url::Url;

const MARKDOWN_EXTENSION: &str = ".md";

/// One post as read from disk: identity, front-matter metadata, and the
/// unprocessed markdown body. Re-created on every read and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The post's stable identifier, derived from its file name.
    pub slug: String,

    /// The source file the record was read from, kept for history lookups
    /// and error messages.
    pub path: PathBuf,

    pub title: String,
    pub description: String,

    /// The post's tags. Validated against the closed vocabulary in
    /// [`crate::tags`] before anything is rendered.
    pub tags: HashSet<String>,

    /// The markdown body, exactly as it appears after the closing fence.
    pub body: String,

    /// Overrides the canonical URL for posts first published elsewhere.
    pub canonical: Option<Url>,

    /// Social-preview image and its alt text.
    pub image: Option<String>,
    pub image_alt: Option<String>,
}

#[derive(Deserialize)]
struct Frontmatter {
    title: String,
    description: String,

    #[serde(default)]
    tags: HashSet<String>,

    #[serde(default)]
    canonical: Option<Url>,

    #[serde(default)]
    image: Option<String>,

    #[serde(default, rename = "imageAlt")]
    image_alt: Option<String>,
}

impl Record {
    /// Parses a [`Record`] from a source file's contents. The file must be
    /// structured as follows:
    ///
    /// 1. Initial front-matter fence (`---`)
    /// 2. YAML front matter with fields `title`, `description`, and
    ///    optionally `tags`, `canonical`, `image`, and `imageAlt`
    /// 3. Terminal front-matter fence (`---`)
    /// 4. Post body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: 'Hello, world!'
    /// description: 'The obligatory first post.'
    /// tags: [ 'meta' ]
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    pub fn from_str(slug: &str, path: &Path, input: &str) -> Result<Record> {
        fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
            const FENCE: &str = "---";
            if !input.starts_with(FENCE) {
                return Err(Error::FrontmatterMissingStartFence);
            }
            match input[FENCE.len()..].find("---") {
                None => Err(Error::FrontmatterMissingEndFence),
                Some(offset) => Ok((
                    FENCE.len(),                        // yaml_start
                    FENCE.len() + offset,               // yaml_stop
                    FENCE.len() + offset + FENCE.len(), // body_start
                )),
            }
        }

        let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
        let frontmatter: Frontmatter =
            serde_yaml::from_str(&input[yaml_start..yaml_stop])?;

        Ok(Record {
            slug: slug.to_owned(),
            path: path.to_owned(),
            title: frontmatter.title,
            description: frontmatter.description,
            tags: frontmatter.tags,
            body: input[body_start..].to_owned(),
            canonical: frontmatter.canonical,
            image: frontmatter.image,
            image_alt: frontmatter.image_alt,
        })
    }
}

/// Reads every post under `dir`, delegating to the single- or multi-threaded
/// variant depending on `threads`. Records come back sorted by slug so a
/// build processes posts in a stable order regardless of how the file system
/// ordered the directory listing.
pub fn read_records(dir: &Path, threads: usize) -> Result<Vec<Record>> {
    let mut records = if threads < 2 {
        read_records_singlethreaded(dir)?
    } else {
        read_records_parallel(dir, threads)?
    };
    records.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(records)
}

fn read_records_singlethreaded(dir: &Path) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for result in read_dir(dir)? {
        let entry = result?;
        let os_file_name = entry.file_name();
        let file_name = os_file_name.to_string_lossy();
        if file_name.ends_with(MARKDOWN_EXTENSION) {
            records.push(process_entry(&file_name, &entry.path())?);
        }
    }
    Ok(records)
}

fn read_records_parallel(dir: &Path, threads: usize) -> Result<Vec<Record>> {
    use crossbeam_channel::unbounded;
    use std::thread;

    let (tx, rx) = unbounded::<(String, PathBuf)>();
    let mut handles = Vec::with_capacity(threads);

    for _ in 0..handles.capacity() {
        let rx = rx.clone();
        handles.push(thread::spawn(move || -> Result<Vec<Record>> {
            let mut records = Vec::new();
            for (file_name, full_path) in rx {
                records.push(process_entry(&file_name, &full_path)?);
            }
            Ok(records)
        }))
    }

    for result in read_dir(dir)? {
        let entry = result?;
        let os_file_name = entry.file_name();
        let file_name = os_file_name.to_string_lossy();
        if file_name.ends_with(MARKDOWN_EXTENSION) {
            tx.send((file_name.to_string(), entry.path()))
                .expect("reader threads outlive the send loop");
        }
    }
    drop(tx);

    let mut records = Vec::new();
    for handle in handles {
        records.extend(handle.join().expect("reader thread panicked")?);
    }
    Ok(records)
}

fn process_entry(file_name: &str, full_path: &Path) -> Result<Record> {
    use std::io::Read;
    let slug = file_name.trim_end_matches(MARKDOWN_EXTENSION);
    let mut contents = String::new();
    File::open(full_path)?.read_to_string(&mut contents)?;
    Record::from_str(slug, full_path, &contents).map_err(|e| {
        Error::Annotated(
            format!("reading post `{}`", full_path.display()),
            Box::new(e),
        )
    })
}

/// The result of a fallible content-reading operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error reading a [`Record`] from disk.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post source file is missing its starting front-matter
    /// fence (`---`).
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal front-matter
    /// fence (`---` i.e., the starting fence was found but the ending one
    /// was missing).
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the front matter as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for I/O errors reading source files.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "Post must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "Missing closing `---`")
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
