//! Fixed pages and static files served by the front end.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::config::SiteConfig;
use crate::error::{Error, Result};

/// Content type used when the file name gives no hint.
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// One of the three fixed HTML pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Served for `GET /`.
    Index,
    /// Served for `GET /message.html`.
    Message,
    /// Served with 404 responses.
    Error,
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Message => write!(f, "message"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A static file read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// File contents.
    pub body: Vec<u8>,
    /// Guessed content type.
    pub content_type: &'static str,
}

/// Read-only view of the site directory.
#[derive(Debug, Clone)]
pub struct Site {
    base_dir: PathBuf,
    index: PathBuf,
    message: PathBuf,
    error: PathBuf,
}

impl Site {
    /// Build the site from configuration.
    #[must_use]
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            index: config.resolve(&config.index_page),
            message: config.resolve(&config.message_page),
            error: config.resolve(&config.error_page),
        }
    }

    /// Directory static files are looked up in.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Location of a fixed page.
    #[must_use]
    pub fn page_path(&self, page: Page) -> &Path {
        match page {
            Page::Index => &self.index,
            Page::Message => &self.message,
            Page::Error => &self.error,
        }
    }

    /// Read a fixed page.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the page file cannot be read.
    pub async fn page(&self, page: Page) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.page_path(page)).await?)
    }

    /// Read the static file named by a request path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path escapes the base directory,
    /// names something other than a regular file, or cannot be read.
    pub async fn static_file(&self, request_path: &str) -> Result<StaticFile> {
        let path = resolve_static(&self.base_dir, request_path)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| Error::not_found(request_path))?;
        if !metadata.is_file() {
            return Err(Error::not_found(request_path));
        }

        let body = tokio::fs::read(&path).await.map_err(|e| {
            debug!("Failed to read {}: {e}", path.display());
            Error::not_found(request_path)
        })?;

        Ok(StaticFile {
            body,
            content_type: guess_content_type(&path),
        })
    }
}

/// Map a request path onto a file below `base_dir`.
///
/// The path is percent-decoded; only plain name components are accepted.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for empty paths and paths containing `..`,
/// root or prefix components.
pub fn resolve_static(base_dir: &Path, request_path: &str) -> Result<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8_lossy();
    let relative = Path::new(decoded.trim_start_matches('/'));

    let mut resolved = base_dir.to_path_buf();
    let mut depth = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::not_found(request_path));
            }
        }
    }

    if depth == 0 {
        return Err(Error::not_found(request_path));
    }
    Ok(resolved)
}

/// Guess a content type from the file name, defaulting to `text/plain`.
#[must_use]
pub fn guess_content_type(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}
