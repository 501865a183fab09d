//! Differ: desired graph vs. stored state

use crate::action::{Change, ChangeAction, ChangeSet};
use crate::error::PlanError;
use crate::provider::{AttributeClass, ProviderRegistry, ResourceProvider};
use crate::state::{StateRecord, StateSnapshot};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tessera_core::{Reference, ResourceGraph, ResourceNode, resolve_value};
use tracing::debug;

/// What the diff is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Converge state to the declarations
    Apply,
    /// Remove everything in state
    Destroy,
}

/// Resolved desired attributes; `None` is a value unknown until apply
type Resolved = BTreeMap<String, Option<Value>>;

/// Compute a change for every node in the graph and every orphaned record
pub fn diff(
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    registry: &ProviderRegistry,
    mode: DiffMode,
) -> Result<ChangeSet, PlanError> {
    match mode {
        DiffMode::Apply => diff_apply(graph, snapshot, registry),
        DiffMode::Destroy => diff_destroy(graph, snapshot, registry),
    }
}

fn provider_for<'a>(
    registry: &'a ProviderRegistry,
    address: &str,
    resource_type: &str,
) -> Result<&'a Arc<dyn ResourceProvider>, PlanError> {
    registry
        .provider_for(resource_type)
        .ok_or_else(|| PlanError::UnknownResourceType {
            address: address.to_string(),
            resource_type: resource_type.to_string(),
        })
}

fn diff_apply(
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    registry: &ProviderRegistry,
) -> Result<ChangeSet, PlanError> {
    let mut changes = ChangeSet::new();
    let mut resolved_by_address: BTreeMap<String, Resolved> = BTreeMap::new();

    for address in graph.topological_order() {
        let Some(node) = graph.node(address) else {
            continue;
        };
        let provider = provider_for(registry, address, &node.resource_type)?;
        let resolved = resolve_desired(node, &changes, &resolved_by_address, snapshot)?;

        let record = snapshot.get(address);
        let (action, changed) = match record {
            None => (ChangeAction::Create, Vec::new()),
            Some(record) if record.resource_type != node.resource_type => (
                ChangeAction::Replace {
                    forced_by: vec!["resource_type".to_string()],
                },
                vec!["resource_type".to_string()],
            ),
            Some(record) => classify_changes(node, record, &resolved, provider.as_ref())?,
        };

        debug!(address, action = %action, changed = ?changed, "Diffed resource");
        changes.insert(Change {
            address: address.to_string(),
            resource_type: node.resource_type.clone(),
            action,
            attributes: node.attributes.clone(),
            dependencies: graph
                .dependencies(address)
                .into_iter()
                .map(str::to_string)
                .collect(),
            changed,
            prior: record.cloned(),
        });
        resolved_by_address.insert(address.to_string(), resolved);
    }

    for record in snapshot.records.values() {
        if graph.contains(&record.address) {
            continue;
        }
        provider_for(registry, &record.address, &record.resource_type)?;
        debug!(address = %record.address, "Orphaned record will be destroyed");
        changes.insert(destroy_change(record, record.dependencies.clone()));
    }

    Ok(changes)
}

fn diff_destroy(
    graph: &ResourceGraph,
    snapshot: &StateSnapshot,
    registry: &ProviderRegistry,
) -> Result<ChangeSet, PlanError> {
    let mut changes = ChangeSet::new();
    for record in snapshot.records.values() {
        provider_for(registry, &record.address, &record.resource_type)?;
        let mut dependencies: BTreeSet<String> = record.dependencies.iter().cloned().collect();
        dependencies.extend(
            graph
                .dependencies(&record.address)
                .into_iter()
                .map(str::to_string),
        );
        changes.insert(destroy_change(record, dependencies.into_iter().collect()));
    }
    Ok(changes)
}

fn destroy_change(record: &StateRecord, dependencies: Vec<String>) -> Change {
    Change {
        address: record.address.clone(),
        resource_type: record.resource_type.clone(),
        action: ChangeAction::Destroy,
        attributes: Default::default(),
        dependencies,
        changed: Vec::new(),
        prior: Some(record.clone()),
    }
}

/// Resolve a node's references against already-diffed dependencies
///
/// An unchanged target resolves from its record; a changing target resolves
/// from its desired value when known.
fn resolve_desired(
    node: &ResourceNode,
    changes: &ChangeSet,
    resolved_by_address: &BTreeMap<String, Resolved>,
    snapshot: &StateSnapshot,
) -> Result<Resolved, PlanError> {
    let mut lookup = |reference: &Reference| -> Result<Option<Value>, PlanError> {
        let missing = || PlanError::MissingAttribute {
            address: node.address.clone(),
            reference: reference.to_string(),
        };
        let target = changes.get(&reference.address).ok_or_else(missing)?;
        if target.action.is_noop() {
            return snapshot
                .get(&reference.address)
                .and_then(|r| r.attributes.get(&reference.attribute))
                .cloned()
                .map(Some)
                .ok_or_else(missing);
        }
        Ok(resolved_by_address
            .get(&reference.address)
            .and_then(|attrs| attrs.get(&reference.attribute))
            .cloned()
            .flatten())
    };

    let mut resolved = Resolved::new();
    for (name, value) in &node.attributes {
        resolved.insert(name.clone(), resolve_value(value, &mut lookup)?);
    }
    Ok(resolved)
}

fn classify_changes(
    node: &ResourceNode,
    record: &StateRecord,
    resolved: &Resolved,
    provider: &dyn ResourceProvider,
) -> Result<(ChangeAction, Vec<String>), PlanError> {
    let keys: BTreeSet<&String> = resolved.keys().chain(record.inputs.keys()).collect();

    let mut forced = Vec::new();
    let mut changed = Vec::new();
    for key in keys {
        let differs = match resolved.get(key) {
            Some(Some(desired)) => record.attributes.get(key) != Some(desired),
            // Unknown until apply, or removed from configuration
            Some(None) | None => true,
        };
        if !differs {
            continue;
        }

        match provider.classify_attribute(&node.resource_type, key) {
            AttributeClass::Immutable => {
                return Err(PlanError::ImmutableAttribute {
                    address: node.address.clone(),
                    attribute: key.clone(),
                });
            }
            AttributeClass::ForcesReplacement => forced.push(key.clone()),
            AttributeClass::Updatable => {}
        }
        changed.push(key.clone());
    }

    let action = if !forced.is_empty() {
        ChangeAction::Replace { forced_by: forced }
    } else if !changed.is_empty() {
        ChangeAction::Update
    } else {
        ChangeAction::NoOp
    };
    Ok((action, changed))
}
