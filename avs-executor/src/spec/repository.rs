use std::path::PathBuf;

use mockall::automock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Resource {resource} of {name} not found")]
    NotFound { name: String, resource: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of specification documents and their ABI resources.
#[automock]
pub trait Repository: Send + Sync {
    fn load_resource(&self, name: &str, resource: &str) -> Result<Vec<u8>, RepositoryError>;
}

/// Repository laid out on disk as `<root>/<name>/<resource>`.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Repository for FileRepository {
    fn load_resource(&self, name: &str, resource: &str) -> Result<Vec<u8>, RepositoryError> {
        let path = self.root.join(name).join(resource);
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => {
                RepositoryError::NotFound { name: name.to_string(), resource: resource.to_string() }
            }
            _ => RepositoryError::Io { path, source },
        })
    }
}
