use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
///
/// All of these are raised before any state is read or any provider is
/// called, so a failing configuration never has side effects.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("duplicate resource address: {0}")]
    DuplicateAddress(String),

    #[error("unresolved reference in {from}: resource '{address}' is not declared")]
    UnresolvedReference { from: String, address: String },

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("undefined variable '{name}' in {address}")]
    UndefinedVariable { name: String, address: String },

    #[error(
        "project root not found\nsearched from: {0}\nhint: run inside a directory containing tessera.kdl"
    )]
    ProjectRootNotFound(PathBuf),
}

impl ConfigError {
    /// Addresses this error is about, for operator-facing reports
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            ConfigError::DuplicateAddress(address) => vec![address.as_str()],
            ConfigError::UnresolvedReference { from, address } => {
                vec![from.as_str(), address.as_str()]
            }
            ConfigError::Cycle(members) => members.iter().map(String::as_str).collect(),
            ConfigError::UndefinedVariable { address, .. } => vec![address.as_str()],
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
