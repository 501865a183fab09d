use super::reference::{Reference, extract_references};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute map of a resource
///
/// Values are JSON values; strings may embed `${address.attribute}` references.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Desired-state description of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Unique address (`type.name` for KDL declarations)
    pub address: String,

    /// Resource type, used to pick the provider
    pub resource_type: String,

    /// Desired attributes
    #[serde(default)]
    pub attributes: Attributes,

    /// Explicit dependencies
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Declaration {
    pub fn new(address: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            resource_type: resource_type.into(),
            attributes: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, address: impl Into<String>) -> Self {
        self.depends_on.push(address.into());
        self
    }

    /// All references embedded in the attributes, sorted and without duplicates
    pub fn references(&self) -> Vec<Reference> {
        let refs: BTreeSet<Reference> = self
            .attributes
            .values()
            .flat_map(extract_references)
            .collect();
        refs.into_iter().collect()
    }
}

/// Build the address of a resource declared as `resource "<type>" "<name>"`
pub fn resource_address(resource_type: &str, name: &str) -> String {
    format!("{}.{}", resource_type, name)
}
