//! Planner: layered topological batching of a change set

use crate::action::{Batch, ChangeSet, PLAN_FORMAT_VERSION, Plan};
use crate::error::PlanError;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Order changes into batches
///
/// NoOp changes never appear in a batch; dependency paths through them are
/// projected onto the changed nodes. Destroys run in reverse dependency order.
pub fn plan(changes: ChangeSet, state_serial: u64, destroy: bool) -> Result<Plan, PlanError> {
    let active: BTreeSet<&str> = changes
        .iter()
        .filter(|c| !c.action.is_noop())
        .map(|c| c.address.as_str())
        .collect();

    // before[x] = nodes that must run before x
    let mut before: BTreeMap<&str, BTreeSet<&str>> =
        active.iter().map(|a| (*a, BTreeSet::new())).collect();
    for &address in &active {
        let Some(change) = changes.get(address) else {
            continue;
        };
        for dep in projected_dependencies(&changes, address) {
            let Some(dep_change) = changes.get(dep) else {
                continue;
            };
            match (change.action.is_destroy(), dep_change.action.is_destroy()) {
                (false, false) => {
                    if let Some(set) = before.get_mut(address) {
                        set.insert(dep);
                    }
                }
                // A node is destroyed before anything it depends on. A replace
                // deletes its prior resource too.
                (true, true) => {
                    if let Some(set) = before.get_mut(dep) {
                        set.insert(address);
                    }
                }
                (true, false) if dep_change.action.is_replace() => {
                    if let Some(set) = before.get_mut(dep) {
                        set.insert(address);
                    }
                }
                _ => {}
            }
        }
    }

    let batches = layered_sort(before)?;
    debug!(batches = batches.len(), changes = active.len(), "Planned changes");

    let mut planned = BTreeMap::new();
    let mut unchanged = Vec::new();
    for (address, change) in changes.changes {
        if change.action.is_noop() {
            unchanged.push(address);
        } else {
            planned.insert(address, change);
        }
    }

    Ok(Plan {
        format_version: PLAN_FORMAT_VERSION.to_string(),
        state_serial,
        destroy,
        created_at: Utc::now(),
        batches,
        changes: planned,
        unchanged,
    })
}

/// Nearest changed dependencies, walking through NoOp nodes
fn projected_dependencies<'a>(changes: &'a ChangeSet, address: &str) -> BTreeSet<&'a str> {
    let mut result = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut stack: Vec<&'a str> = changes
        .get(address)
        .map(|c| c.dependencies.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(dep) = stack.pop() {
        if !visited.insert(dep) {
            continue;
        }
        let Some(change) = changes.get(dep) else {
            continue;
        };
        if change.action.is_noop() {
            stack.extend(change.dependencies.iter().map(String::as_str));
        } else {
            result.insert(dep);
        }
    }
    result
}

/// Layered Kahn sort; each layer sorted by address
fn layered_sort<'a>(
    mut before: BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> Result<Vec<Batch>, PlanError> {
    let mut batches = Vec::new();
    while !before.is_empty() {
        let ready: Vec<&str> = before
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(address, _)| *address)
            .collect();

        if ready.is_empty() {
            let remaining = before.keys().map(|a| a.to_string()).collect();
            return Err(PlanError::Conflict(remaining));
        }

        for address in &ready {
            before.remove(address);
        }
        for deps in before.values_mut() {
            for address in &ready {
                deps.remove(address);
            }
        }
        batches.push(Batch {
            addresses: ready.into_iter().map(str::to_string).collect(),
        });
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Change, ChangeAction};

    fn change(address: &str, action: ChangeAction, deps: &[&str]) -> Change {
        Change {
            address: address.to_string(),
            resource_type: "thing".to_string(),
            action,
            attributes: Default::default(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            changed: Vec::new(),
            prior: None,
        }
    }

    fn change_set(changes: Vec<Change>) -> ChangeSet {
        let mut set = ChangeSet::new();
        for c in changes {
            set.insert(c);
        }
        set
    }

    fn batch_addresses(plan: &Plan) -> Vec<Vec<&str>> {
        plan.batches
            .iter()
            .map(|b| b.addresses.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_creates_fan_out() {
        let changes = change_set(vec![
            change("A", ChangeAction::Create, &[]),
            change("B", ChangeAction::Create, &["A"]),
            change("C", ChangeAction::Create, &["A"]),
        ]);
        let plan = plan(changes, 0, false).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["A"], vec!["B", "C"]]);
    }

    #[test]
    fn test_destroys_run_in_reverse() {
        let changes = change_set(vec![
            change("A", ChangeAction::Destroy, &[]),
            change("B", ChangeAction::Destroy, &["A"]),
            change("C", ChangeAction::Destroy, &["A"]),
        ]);
        let plan = plan(changes, 3, true).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["B", "C"], vec!["A"]]);
        assert_eq!(plan.state_serial, 3);
        assert!(plan.destroy);
    }

    #[test]
    fn test_noop_nodes_are_projected_through() {
        // C -> B(no-op) -> A: C still waits for A
        let changes = change_set(vec![
            change("A", ChangeAction::Update, &[]),
            change("B", ChangeAction::NoOp, &["A"]),
            change("C", ChangeAction::Update, &["B"]),
            change("D", ChangeAction::Create, &[]),
        ]);
        let plan = plan(changes, 0, false).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["A", "D"], vec!["C"]]);
        assert_eq!(plan.unchanged, vec!["B"]);
        assert!(plan.change("B").is_none());
    }

    #[test]
    fn test_mixed_create_and_destroy_are_independent() {
        let changes = change_set(vec![
            change("A", ChangeAction::Create, &[]),
            change("old", ChangeAction::Destroy, &["A"]),
        ]);
        let plan = plan(changes, 0, false).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["A", "old"]]);
    }

    #[test]
    fn test_removed_dependent_is_destroyed_before_replacement() {
        let changes = change_set(vec![
            change("A", ChangeAction::Replace { forced_by: vec!["name".into()] }, &[]),
            change("B", ChangeAction::Create, &[]),
            change("old", ChangeAction::Destroy, &["A", "B"]),
        ]);
        let plan = plan(changes, 0, false).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["B", "old"], vec!["A"]]);
    }

    #[test]
    fn test_chain_of_replacements() {
        let changes = change_set(vec![
            change("A", ChangeAction::Replace { forced_by: vec!["name".into()] }, &[]),
            change("B", ChangeAction::Update, &["A"]),
            change("C", ChangeAction::Create, &["B"]),
        ]);
        let plan = plan(changes, 0, false).unwrap();
        assert_eq!(batch_addresses(&plan), vec![vec!["A"], vec!["B"], vec!["C"]]);
    }

    #[test]
    fn test_cycle_is_conflict() {
        let changes = change_set(vec![
            change("A", ChangeAction::Create, &["B"]),
            change("B", ChangeAction::Create, &["A"]),
            change("C", ChangeAction::Create, &[]),
        ]);
        let err = plan(changes, 0, false).unwrap_err();
        match err {
            PlanError::Conflict(addresses) => assert_eq!(addresses, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_changes_is_empty_plan() {
        let changes = change_set(vec![
            change("A", ChangeAction::NoOp, &[]),
            change("B", ChangeAction::NoOp, &["A"]),
        ]);
        let plan = plan(changes, 7, false).unwrap();
        assert!(plan.batches.is_empty());
        assert!(!plan.has_changes());
        assert_eq!(plan.summary().no_change, 2);
    }
}
