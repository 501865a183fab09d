//! Engine error types

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// State store errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file is corrupt ({path}): {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("State is locked by {holder} since {acquired_at} (lock id: {lock_id})")]
    Locked {
        holder: String,
        lock_id: String,
        acquired_at: DateTime<Utc>,
    },

    #[error(
        "Stale lock held by {holder} expired at {expired_at}; run `tessera force-unlock {lock_id}` once the holder is confirmed dead"
    )]
    StaleLock {
        holder: String,
        lock_id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Timed out after {waited_secs}s waiting for the lock held by {holder}")]
    LockTimeout { holder: String, waited_secs: u64 },

    #[error("State format {found} requires migration (supported: {supported})")]
    MigrationRequired { found: String, supported: String },

    #[error("Lock id mismatch: requested {requested}, current lock is {current}")]
    LockIdMismatch { requested: String, current: String },

    #[error("State is not locked")]
    NotLocked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Planning errors
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Plan conflict: no valid order for {}", .0.join(", "))]
    Conflict(Vec<String>),

    #[error("{address}: attribute '{attribute}' is immutable and cannot change")]
    ImmutableAttribute { address: String, attribute: String },

    #[error("{address}: no provider serves resource type '{resource_type}'")]
    UnknownResourceType {
        address: String,
        resource_type: String,
    },

    #[error("Saved plan is stale: planned against state serial {expected}, current serial is {found}")]
    StalePlan { expected: u64, found: u64 },

    #[error("{address}: reference ${{{reference}}} has no value in state")]
    MissingAttribute { address: String, reference: String },
}

/// Errors reported by provider operations
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{resource_type} '{id}' not found")]
    NotFound { resource_type: String, id: String },

    #[error("Unsupported resource type: {0}")]
    UnsupportedType(String),

    #[error("Invalid attributes: {0}")]
    InvalidAttributes(String),

    /// Transient failure; eligible for retry
    #[error("API error: {0}")]
    Api(String),

    #[error("Operation failed: {0}")]
    Failed(String),
}

impl ProviderError {
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api(_))
    }
}

/// Top-level engine error
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] tessera_core::ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("{address}: {source}")]
    Provider {
        address: String,
        #[source]
        source: ProviderError,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
