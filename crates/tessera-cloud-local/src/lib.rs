//! Local filesystem provider for Tessera
//!
//! This crate implements the `ResourceProvider` trait over the local
//! filesystem, so a project can be planned and applied without any cloud
//! account.
//!
//! # Resource types
//!
//! - `local_directory`: a directory (`path`)
//! - `local_file`: a file (`path`, `content`, `mode`; computed `size`)
//!
//! Relative paths resolve against the provider's base directory, normally the
//! project root. The provider id of a resource is its `path` as declared.
//!
//! # Example
//!
//! ```ignore
//! use tessera_cloud::ProviderRegistry;
//! use tessera_cloud_local::LocalProvider;
//! use std::sync::Arc;
//!
//! let registry = ProviderRegistry::new()
//!     .with_provider(Arc::new(LocalProvider::new(project_root)));
//! ```

pub mod error;
pub mod fs;
pub mod provider;

pub use error::{LocalError, Result};
pub use fs::LocalFs;
pub use provider::{LOCAL_DIRECTORY, LOCAL_FILE, LocalProvider};
