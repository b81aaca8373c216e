//! Project configuration. A site is described by a `bylines.yaml` file at
//! the project root; builds may be invoked from any directory beneath it,
//! so configuration loading walks upward until it finds the file. All
//! relative paths in the file are resolved against the project root, never
//! against the invocation directory.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const PROJECT_FILE: &str = "bylines.yaml";

/// The site's author, carried into the Atom feed.
#[derive(Clone, Debug, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

/// The on-disk shape of `bylines.yaml`.
#[derive(Deserialize)]
struct Project {
    /// The root URL the site will be served from, e.g.
    /// `https://example.com/`. Must end in a trailing slash so URL joins
    /// treat it as a directory.
    site_root: Url,

    /// The site title, used by the index template and the feed.
    title: String,

    #[serde(default)]
    author: Option<Author>,

    /// The id of the repository's first commit. If this commit can't be
    /// found, the clone is shallow.
    origin_commit: String,

    /// Commits whose messages start with this prefix are merge/integration
    /// commits and never count as content changes.
    #[serde(default = "default_merge_pattern")]
    merge_pattern: String,

    #[serde(default = "default_content_directory")]
    content_directory: PathBuf,

    #[serde(default = "default_cache_file")]
    cache_file: PathBuf,

    #[serde(default = "default_tags_file")]
    tags_file: PathBuf,

    /// Template files concatenated, in order, to form the post template.
    post_template: Vec<PathBuf>,

    /// Template files concatenated, in order, to form the index template.
    index_template: Vec<PathBuf>,
}

fn default_merge_pattern() -> String {
    "Merge branch".to_owned()
}

fn default_content_directory() -> PathBuf {
    PathBuf::from("blog")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("caches/posts.json")
}

fn default_tags_file() -> PathBuf {
    PathBuf::from("tags/data.json")
}

/// Fully-resolved configuration for one build.
pub struct Config {
    pub project_root: PathBuf,
    pub content_directory: PathBuf,
    pub cache_file: PathBuf,
    pub tags_file: PathBuf,

    pub site_root: Url,
    pub posts_url: Url,
    pub title: String,
    pub author: Option<Author>,

    pub origin_commit: String,
    pub merge_pattern: String,

    pub post_template: Vec<PathBuf>,
    pub index_template: Vec<PathBuf>,

    pub output_directory: PathBuf,
    pub posts_output_directory: PathBuf,

    pub threads: usize,
}

impl Config {
    /// Searches `dir` and its ancestors for a project file and loads it.
    pub fn from_directory(
        dir: &Path,
        output_directory: &Path,
        threads: Option<usize>,
    ) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            match Config::from_project_file(&path, output_directory, threads) {
                Ok(config) => Ok(config),
                Err(e) => Err(anyhow!("Loading configuration: {:?}", e)),
            }
        } else {
            match dir.parent() {
                Some(parent) => {
                    Config::from_directory(parent, output_directory, threads)
                }
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    /// Loads configuration from a specific project file.
    pub fn from_project_file(
        path: &Path,
        output_directory: &Path,
        threads: Option<usize>,
    ) -> Result<Config> {
        use crate::util::open;
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        let project_root = match path.parent() {
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{:?}'",
                    path
                ))
            }
            Some(project_root) => project_root.to_owned(),
        };

        Ok(Config {
            content_directory: project_root.join(&project.content_directory),
            cache_file: project_root.join(&project.cache_file),
            tags_file: project_root.join(&project.tags_file),
            posts_url: project.site_root.join("blog/")?,
            site_root: project.site_root,
            title: project.title,
            author: project.author,
            origin_commit: project.origin_commit,
            merge_pattern: project.merge_pattern,
            post_template: project
                .post_template
                .iter()
                .map(|relpath| project_root.join(relpath))
                .collect(),
            index_template: project
                .index_template
                .iter()
                .map(|relpath| project_root.join(relpath))
                .collect(),
            posts_output_directory: output_directory.join("blog"),
            output_directory: output_directory.to_owned(),
            project_root,
            threads: match threads {
                None => num_cpus::get(),
                Some(threads) => threads,
            },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PROJECT: &str = "site_root: 'https://example.com/'
title: 'Example Site'
author:
  name: 'A. Author'
origin_commit: '0144e41379907302837d1f780b65e3ab2844afce'
post_template:
  - 'theme/base.html'
  - 'theme/post.html'
index_template:
  - 'theme/base.html'
  - 'theme/index.html'
";

    #[test]
    fn test_from_directory_walks_upward() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(PROJECT_FILE), PROJECT)?;
        let nested = dir.path().join("blog/drafts");
        std::fs::create_dir_all(&nested)?;

        let config =
            Config::from_directory(&nested, Path::new("out"), Some(2))?;
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.content_directory, dir.path().join("blog"));
        assert_eq!(config.cache_file, dir.path().join("caches/posts.json"));
        assert_eq!(config.posts_url.as_str(), "https://example.com/blog/");
        assert_eq!(config.merge_pattern, "Merge branch");
        assert_eq!(config.threads, 2);
        assert_eq!(
            config.post_template,
            vec![
                dir.path().join("theme/base.html"),
                dir.path().join("theme/post.html"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_project_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            Config::from_directory(dir.path(), Path::new("out"), None).is_err()
        );
    }
}
