//! Change, plan and apply report types

use crate::state::StateRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tessera_core::Attributes;

/// Saved plan format version
pub const PLAN_FORMAT_VERSION: &str = "1";

/// Typed change for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    /// Destroy and recreate; `forced_by` names the attributes that required it
    Replace {
        forced_by: Vec<String>,
    },
    Destroy,
    NoOp,
}

impl ChangeAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    pub fn is_destroy(&self) -> bool {
        matches!(self, Self::Destroy)
    }

    pub fn is_replace(&self) -> bool {
        matches!(self, Self::Replace { .. })
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Replace { .. } => write!(f, "replace"),
            ChangeAction::Destroy => write!(f, "destroy"),
            ChangeAction::NoOp => write!(f, "no-op"),
        }
    }
}

/// Planned change for one address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub address: String,

    pub resource_type: String,

    pub action: ChangeAction,

    /// Desired attributes, references unresolved
    #[serde(default)]
    pub attributes: Attributes,

    /// Addresses this change depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Attributes that differ from state
    #[serde(default)]
    pub changed: Vec<String>,

    /// Record before the change
    #[serde(default)]
    pub prior: Option<StateRecord>,
}

/// Every change from one diff, NoOp included
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changes: BTreeMap<String, Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, change: Change) {
        self.changes.insert(change.address.clone(), change);
    }

    pub fn get(&self, address: &str) -> Option<&Change> {
        self.changes.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.values()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Addresses with no dependency edges among them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub addresses: Vec<String>,
}

/// Ordered execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub format_version: String,

    /// State serial the plan was computed against
    pub state_serial: u64,

    /// Whether this is a destroy plan
    #[serde(default)]
    pub destroy: bool,

    pub created_at: DateTime<Utc>,

    pub batches: Vec<Batch>,

    /// Changes that appear in a batch
    pub changes: BTreeMap<String, Change>,

    /// Addresses with nothing to do
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl Plan {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn change(&self, address: &str) -> Option<&Change> {
        self.changes.get(address)
    }

    /// Changes in execution order
    pub fn ordered_changes(&self) -> impl Iterator<Item = &Change> {
        self.batches
            .iter()
            .flat_map(|b| b.addresses.iter())
            .filter_map(|a| self.changes.get(a))
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.batches
            .iter()
            .flat_map(|b| b.addresses.iter().map(String::as_str))
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            no_change: self.unchanged.len(),
            ..PlanSummary::default()
        };
        for change in self.changes.values() {
            match change.action {
                ChangeAction::Create => summary.create += 1,
                ChangeAction::Update => summary.update += 1,
                ChangeAction::Replace { .. } => summary.replace += 1,
                ChangeAction::Destroy => summary.destroy += 1,
                ChangeAction::NoOp => summary.no_change += 1,
            }
        }
        summary
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub destroy: usize,
    pub no_change: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to destroy, {} unchanged",
            self.create, self.update, self.replace, self.destroy, self.no_change
        )
    }
}

/// Result of one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub address: String,

    pub action: ChangeAction,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Report of an apply run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionResult>,

    pub failed: Vec<ActionResult>,

    /// Started but stopped before completing
    pub interrupted: Vec<String>,

    /// Never started
    pub not_attempted: Vec<String>,

    /// Stopped by the cancellation signal
    pub cancelled: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.interrupted.is_empty()
            && self.not_attempted.is_empty()
            && !self.cancelled
    }

    pub fn add_success(&mut self, address: String, action: ChangeAction, message: String) {
        self.succeeded.push(ActionResult {
            address,
            action,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, address: String, action: ChangeAction, error: String) {
        self.failed.push(ActionResult {
            address,
            action,
            message: String::new(),
            error: Some(error),
        });
    }

    pub fn succeeded_addresses(&self) -> Vec<&str> {
        self.succeeded.iter().map(|r| r.address.as_str()).collect()
    }

    pub fn failed_addresses(&self) -> Vec<&str> {
        self.failed.iter().map(|r| r.address.as_str()).collect()
    }
}
