//! Local provider error types

use std::path::PathBuf;
use tessera_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Missing required attribute '{0}'")]
    MissingAttribute(&'static str),

    #[error("Attribute '{attribute}' must be {expected}")]
    InvalidAttribute {
        attribute: &'static str,
        expected: &'static str,
    },

    #[error("Expected a {expected} at {path}")]
    WrongKind { path: PathBuf, expected: &'static str },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LocalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Convert into the engine's error type for a resource
    pub fn into_provider_error(self, resource_type: &str, id: &str) -> ProviderError {
        match self {
            Self::NotFound(_) => ProviderError::not_found(resource_type, id),
            Self::MissingAttribute(_) | Self::InvalidAttribute { .. } => {
                ProviderError::InvalidAttributes(self.to_string())
            }
            Self::WrongKind { .. } | Self::Io { .. } => ProviderError::Failed(self.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
