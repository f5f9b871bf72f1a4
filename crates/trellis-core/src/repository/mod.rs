//! Repository capability consumed by the resolution core.
//!
//! A resolver never knows how bytes move: it substitutes patterns into
//! paths and hands them to a [`Repository`]. The "kind" of a resolver
//! (filesystem, HTTP) is only the choice of repository implementation.

mod file;
#[cfg(feature = "network")]
mod url;

pub use file::FileRepository;
#[cfg(feature = "network")]
pub use url::UrlRepository;

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use trellis_schema::Artifact;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("destination already exists: {0}")]
    AlreadyExists(String),

    #[error("{operation} is not supported by repository {repository}")]
    Unsupported {
        operation: &'static str,
        repository: String,
    },
}

impl RepositoryError {
    pub(crate) fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Snapshot of a repository resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Full location inside the repository.
    pub name: String,
    pub exists: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_length: u64,
    /// Whether the resource lives on the local filesystem.
    pub local: bool,
}

impl Resource {
    pub fn missing(name: impl Into<String>, local: bool) -> Self {
        Self {
            name: name.into(),
            exists: false,
            last_modified: None,
            content_length: 0,
            local,
        }
    }
}

pub trait Repository: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Look up the resource at `path`. A missing resource is not an error.
    fn resource(&self, path: &str) -> Result<Resource, RepositoryError>;

    /// Copy the resource at `path` into `destination`, creating parent directories.
    fn get(&self, path: &str, destination: &Path) -> Result<(), RepositoryError>;

    /// Store `source` at `destination`.
    fn put(
        &self,
        artifact: &Artifact,
        source: &Path,
        destination: &str,
        overwrite: bool,
    ) -> Result<(), RepositoryError>;

    /// Entry names directly under `parent`, or `None` if it cannot be listed.
    fn list(&self, parent: &str) -> Result<Option<Vec<String>>, RepositoryError>;

    fn exists(&self, path: &str) -> Result<bool, RepositoryError> {
        Ok(self.resource(path)?.exists)
    }

    fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.resource(path)?.last_modified)
    }

    /// Remove a file or directory tree.
    fn delete(&self, _path: &str) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unsupported {
            operation: "delete",
            repository: self.name().to_string(),
        })
    }

    /// Move a file or directory tree.
    fn rename(&self, _from: &str, _to: &str) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unsupported {
            operation: "rename",
            repository: self.name().to_string(),
        })
    }

    /// Whether `delete` and `rename` are implemented, which publish transactions need.
    fn supports_transactions(&self) -> bool {
        false
    }
}

/// Repository able to serve an explicit artifact location (`file:`, absolute path or http URL).
pub fn for_location(location: &str) -> Option<Arc<dyn Repository>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        #[cfg(feature = "network")]
        {
            return UrlRepository::new().ok().map(|r| Arc::new(r) as Arc<dyn Repository>);
        }
        #[cfg(not(feature = "network"))]
        {
            return None;
        }
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    let path = path.strip_prefix("file:").unwrap_or(path);
    Path::new(path)
        .is_absolute()
        .then(|| Arc::new(FileRepository::new()) as Arc<dyn Repository>)
}

/// Strip a `file:` scheme from a location.
pub(crate) fn file_path(location: &str) -> &str {
    let path = location.strip_prefix("file://").unwrap_or(location);
    path.strip_prefix("file:").unwrap_or(path)
}
