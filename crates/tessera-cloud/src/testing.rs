//! Test helpers

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{AttributeClass, Created, ResourceProvider};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tessera_core::Attributes;

/// Provider with fixed attribute classes and trivial operations
pub(crate) struct StaticProvider {
    name: String,
    types: Vec<String>,
    forces_replacement: BTreeSet<String>,
    immutable: BTreeSet<String>,
}

impl StaticProvider {
    pub(crate) fn new(name: &str, types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            forces_replacement: BTreeSet::new(),
            immutable: BTreeSet::new(),
        }
    }

    pub(crate) fn forcing(mut self, attribute: &str) -> Self {
        self.forces_replacement.insert(attribute.to_string());
        self
    }

    pub(crate) fn immutable(mut self, attribute: &str) -> Self {
        self.immutable.insert(attribute.to_string());
        self
    }
}

#[async_trait]
impl ResourceProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn classify_attribute(&self, _resource_type: &str, attribute: &str) -> AttributeClass {
        if self.immutable.contains(attribute) {
            AttributeClass::Immutable
        } else if self.forces_replacement.contains(attribute) {
            AttributeClass::ForcesReplacement
        } else {
            AttributeClass::Updatable
        }
    }

    async fn create(
        &self,
        resource_type: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Created> {
        Ok(Created::new(
            format!("{}-id", resource_type),
            attributes.clone(),
        ))
    }

    async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Attributes> {
        Err(ProviderError::not_found(resource_type, id))
    }

    async fn update(
        &self,
        _resource_type: &str,
        _id: &str,
        attributes: &Attributes,
    ) -> ProviderResult<Attributes> {
        Ok(attributes.clone())
    }

    async fn delete(&self, _resource_type: &str, _id: &str) -> ProviderResult<()> {
        Ok(())
    }
}
