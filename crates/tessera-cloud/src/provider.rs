//! Provider plugin interface

use crate::error::ProviderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::Attributes;

/// How a change to an attribute is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeClass {
    /// Cannot change after creation (a difference is a plan error)
    Immutable,
    /// Changed in place with `update`
    Updatable,
    /// Changed by destroying and recreating the resource
    ForcesReplacement,
}

/// Result of a successful `create`
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Provider-assigned identifier
    pub id: String,
    /// Attributes reported by the provider (computed values included)
    pub attributes: Attributes,
}

impl Created {
    pub fn new(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

/// Resource provider abstraction
///
/// Every provider implements this trait; the engine never talks to a
/// backend any other way. Attribute maps passed in are fully resolved.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Resource types served by this provider
    fn resource_types(&self) -> Vec<String>;

    /// Classify an attribute of a resource type
    fn classify_attribute(&self, resource_type: &str, attribute: &str) -> AttributeClass;

    /// Whether a replacement creates the new resource before deleting the old one
    fn create_before_destroy(&self, _resource_type: &str) -> bool {
        false
    }

    async fn create(&self, resource_type: &str, attributes: &Attributes)
    -> ProviderResult<Created>;

    /// Read current attributes; `ProviderError::NotFound` when the resource is gone
    async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Attributes>;

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Attributes>;

    async fn delete(&self, resource_type: &str, id: &str) -> ProviderResult<()>;
}

/// Resource type to provider mapping
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for every type it serves
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        for resource_type in provider.resource_types() {
            tracing::debug!(
                provider = provider.name(),
                resource_type = %resource_type,
                "Registered resource type"
            );
            self.providers.insert(resource_type, Arc::clone(&provider));
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn provider_for(&self, resource_type: &str) -> Option<&Arc<dyn ResourceProvider>> {
        self.providers.get(resource_type)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.providers.iter().map(|(t, p)| (t, p.name())))
            .finish()
    }
}
