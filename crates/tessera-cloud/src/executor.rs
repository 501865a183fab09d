//! Executor: runs a plan batch by batch
//!
//! Batches run strictly in sequence. Nodes inside a batch run as tokio tasks
//! bounded by a semaphore. Every confirmed provider operation is committed to
//! the state session before the next batch starts.

use crate::action::{ApplyResult, Batch, Change, ChangeAction, Plan};
use crate::error::ProviderError;
use crate::provider::{ProviderRegistry, ResourceProvider};
use crate::state::{StateRecord, StateSession, StateSnapshot};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tessera_core::{Attributes, Reference, resolve_value};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of concurrent node operations
pub const DEFAULT_PARALLELISM: usize = 10;

/// Triggers cancellation of a running apply
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancelSignal { receiver })
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Observes a [`CancelHandle`]
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// State mutation produced by a node
#[derive(Debug)]
struct Commit {
    node: String,
    action: ChangeAction,
    address: String,
    record: Option<StateRecord>,
}

/// State address holding a replaced resource until its delete succeeds
fn deposed_address(address: &str, provider_id: &str) -> String {
    format!("{}#deposed-{}", address, provider_id)
}

#[derive(Debug)]
enum NodeOutcome {
    Succeeded(String),
    Failed(String),
    Interrupted,
    NotAttempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchStatus {
    Completed,
    Failed,
    Cancelled,
}

/// One node, ready to run
struct NodeJob {
    change: Change,
    inputs: Attributes,
    provider: Arc<dyn ResourceProvider>,
    prior_provider: Option<Arc<dyn ResourceProvider>>,
    commits: mpsc::UnboundedSender<Commit>,
}

impl NodeJob {
    fn address(&self) -> &str {
        &self.change.address
    }

    fn prior(&self) -> Result<&StateRecord, ProviderError> {
        self.change.prior.as_ref().ok_or_else(|| {
            ProviderError::Failed(format!("{} has no prior state record", self.address()))
        })
    }

    fn record(&self, provider_id: String, reported: Attributes) -> StateRecord {
        let mut record = StateRecord::new(
            self.change.address.clone(),
            self.change.resource_type.clone(),
            provider_id,
        )
        .with_inputs(self.inputs.clone())
        .with_dependencies(self.change.dependencies.clone());
        record.set_reported(reported);
        record
    }

    fn commit(&self, record: Option<StateRecord>) {
        self.commit_at(&self.change.address, record);
    }

    fn commit_at(&self, address: &str, record: Option<StateRecord>) {
        // Receiver lives as long as the batch
        let _ = self.commits.send(Commit {
            node: self.change.address.clone(),
            action: self.change.action.clone(),
            address: address.to_string(),
            record,
        });
    }

    async fn create(&self) -> Result<String, ProviderError> {
        let created = self
            .provider
            .create(&self.change.resource_type, &self.inputs)
            .await?;
        let id = created.id.clone();
        self.commit(Some(self.record(created.id, created.attributes)));
        Ok(id)
    }

    /// Delete the prior resource; already gone counts as success
    async fn delete_prior(&self) -> Result<(), ProviderError> {
        let prior = self.prior()?;
        let provider = self.prior_provider.as_ref().unwrap_or(&self.provider);
        match provider.delete(&prior.resource_type, &prior.provider_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                info!(
                    address = %self.address(),
                    id = %prior.provider_id,
                    "Resource already gone"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn execute(&self) -> Result<String, ProviderError> {
        info!(
            address = %self.address(),
            action = %self.change.action,
            "Applying change"
        );
        match &self.change.action {
            ChangeAction::Create => {
                let id = self.create().await?;
                Ok(format!("created {}", id))
            }
            ChangeAction::Update => {
                let prior = self.prior()?;
                let reported = self
                    .provider
                    .update(&self.change.resource_type, &prior.provider_id, &self.inputs)
                    .await?;
                self.commit(Some(self.record(prior.provider_id.clone(), reported)));
                Ok(format!("updated {}", prior.provider_id))
            }
            ChangeAction::Destroy => {
                let prior = self.prior()?;
                self.delete_prior().await?;
                self.commit(None);
                Ok(format!("destroyed {}", prior.provider_id))
            }
            ChangeAction::Replace { .. } => {
                let prior = self.prior()?;
                let same_type = prior.resource_type == self.change.resource_type;
                if same_type && self.provider.create_before_destroy(&self.change.resource_type) {
                    let created = self
                        .provider
                        .create(&self.change.resource_type, &self.inputs)
                        .await?;
                    let id = created.id.clone();

                    // The prior stays tracked until its delete succeeds
                    let deposed = deposed_address(self.address(), &prior.provider_id);
                    let mut parked = prior.clone();
                    parked.address = deposed.clone();
                    self.commit_at(&deposed, Some(parked));
                    self.commit(Some(self.record(created.id, created.attributes)));

                    self.delete_prior().await.map_err(|e| {
                        ProviderError::Failed(format!(
                            "replacement {} created but {} was not deleted: {}",
                            id, prior.provider_id, e
                        ))
                    })?;
                    self.commit_at(&deposed, None);
                    Ok(format!("replaced {} with {}", prior.provider_id, id))
                } else {
                    self.delete_prior().await?;
                    self.commit(None);
                    let id = self.create().await?;
                    Ok(format!("replaced {} with {}", prior.provider_id, id))
                }
            }
            ChangeAction::NoOp => Ok("no changes".to_string()),
        }
    }
}

/// Resolve references against committed state
fn resolve_inputs(attributes: &Attributes, snapshot: &StateSnapshot) -> Result<Attributes, String> {
    let mut lookup = |reference: &Reference| -> Result<Option<Value>, String> {
        snapshot
            .get(&reference.address)
            .and_then(|r| r.attributes.get(&reference.attribute))
            .cloned()
            .map(Some)
            .ok_or_else(|| format!("reference ${{{}}} has no value in state", reference))
    };

    let mut resolved = Attributes::new();
    for (name, value) in attributes {
        match resolve_value(value, &mut lookup)? {
            Some(value) => {
                resolved.insert(name.clone(), value);
            }
            None => return Err(format!("attribute '{}' could not be resolved", name)),
        }
    }
    Ok(resolved)
}

/// Runs plans against a provider registry
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<ProviderRegistry>,
    parallelism: usize,
}

impl Executor {
    pub fn new(registry: Arc<ProviderRegistry>, parallelism: usize) -> Self {
        Self {
            registry,
            parallelism: parallelism.max(1),
        }
    }

    /// Apply `plan`, committing into `session`
    pub async fn run(
        &self,
        session: &mut StateSession,
        plan: &Plan,
        cancel: CancelSignal,
    ) -> ApplyResult {
        let started = Instant::now();
        let mut result = ApplyResult::new();
        let mut halted = false;

        for (index, batch) in plan.batches.iter().enumerate() {
            if halted || cancel.is_cancelled() {
                result.cancelled |= cancel.is_cancelled();
                result.not_attempted.extend(batch.addresses.iter().cloned());
                continue;
            }

            info!(
                batch = index + 1,
                total = plan.batches.len(),
                size = batch.addresses.len(),
                "Running batch"
            );
            match self
                .run_batch(session, plan, batch, &cancel, &mut result)
                .await
            {
                BatchStatus::Completed => {}
                BatchStatus::Failed => halted = true,
                BatchStatus::Cancelled => {
                    result.cancelled = true;
                    halted = true;
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            interrupted = result.interrupted.len(),
            not_attempted = result.not_attempted.len(),
            duration_ms = result.duration_ms,
            "Apply finished"
        );
        result
    }

    fn prepare(
        &self,
        change: &Change,
        snapshot: &StateSnapshot,
        commits: &mpsc::UnboundedSender<Commit>,
    ) -> Result<NodeJob, String> {
        let provider = self
            .registry
            .provider_for(&change.resource_type)
            .cloned()
            .ok_or_else(|| format!("no provider serves resource type '{}'", change.resource_type))?;
        let prior_provider = match &change.prior {
            Some(prior) => Some(
                self.registry
                    .provider_for(&prior.resource_type)
                    .cloned()
                    .ok_or_else(|| {
                        format!("no provider serves resource type '{}'", prior.resource_type)
                    })?,
            ),
            None => None,
        };
        let inputs = if change.action.is_destroy() {
            Attributes::new()
        } else {
            resolve_inputs(&change.attributes, snapshot)?
        };

        Ok(NodeJob {
            change: change.clone(),
            inputs,
            provider,
            prior_provider,
            commits: commits.clone(),
        })
    }

    async fn run_batch(
        &self,
        session: &mut StateSession,
        plan: &Plan,
        batch: &Batch,
        cancel: &CancelSignal,
        result: &mut ApplyResult,
    ) -> BatchStatus {
        let (commit_tx, mut commit_rx) = mpsc::unbounded_channel();

        let mut jobs = Vec::with_capacity(batch.addresses.len());
        let mut prepare_failed = false;
        for address in &batch.addresses {
            let Some(change) = plan.change(address) else {
                result.add_failure(
                    address.clone(),
                    ChangeAction::NoOp,
                    "missing from plan".to_string(),
                );
                prepare_failed = true;
                continue;
            };
            match self.prepare(change, session.snapshot(), &commit_tx) {
                Ok(job) => jobs.push(job),
                Err(message) => {
                    error!(address = %address, error = %message, "Cannot start change");
                    result.add_failure(address.clone(), change.action.clone(), message);
                    prepare_failed = true;
                }
            }
        }
        if prepare_failed {
            result
                .not_attempted
                .extend(jobs.into_iter().map(|job| job.change.address));
            return BatchStatus::Failed;
        }

        let (abort, abort_signal) = CancelHandle::new();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<String> = BTreeSet::new();

        for job in jobs {
            let address = job.change.address.clone();
            let action = job.change.action.clone();
            let semaphore = Arc::clone(&semaphore);
            let abort_signal = abort_signal.clone();
            let cancel = cancel.clone();
            pending.insert(address.clone());

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = abort_signal.cancelled() => return (address, action, NodeOutcome::NotAttempted),
                    _ = cancel.cancelled() => return (address, action, NodeOutcome::NotAttempted),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (address, action, NodeOutcome::NotAttempted),
                    },
                };

                let outcome = tokio::select! {
                    biased;
                    _ = abort_signal.cancelled() => NodeOutcome::Interrupted,
                    _ = cancel.cancelled() => NodeOutcome::Interrupted,
                    executed = job.execute() => match executed {
                        Ok(message) => NodeOutcome::Succeeded(message),
                        Err(e) => NodeOutcome::Failed(e.to_string()),
                    },
                };
                (address, action, outcome)
            });
        }

        let mut failed = false;
        let mut stopped = false;
        let mut commit_failures = BTreeSet::new();
        while let Some(joined) = tasks.join_next().await {
            if !self
                .drain_commits(session, &mut commit_rx, &mut commit_failures, result)
                .await
            {
                failed = true;
                abort.cancel();
            }

            let (address, action, outcome) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!(error = %e, "Node task panicked");
                    failed = true;
                    abort.cancel();
                    continue;
                }
            };
            pending.remove(&address);

            if commit_failures.contains(&address) {
                continue;
            }
            match outcome {
                NodeOutcome::Succeeded(message) => {
                    info!(address = %address, action = %action, "{}", message);
                    result.add_success(address, action, message);
                }
                NodeOutcome::Failed(message) => {
                    error!(address = %address, action = %action, error = %message, "Change failed");
                    result.add_failure(address, action, message);
                    failed = true;
                    abort.cancel();
                }
                NodeOutcome::Interrupted => {
                    warn!(address = %address, action = %action, "Change interrupted");
                    result.interrupted.push(address);
                    stopped = true;
                }
                NodeOutcome::NotAttempted => {
                    debug!(address = %address, "Change not attempted");
                    result.not_attempted.push(address);
                    stopped = true;
                }
            }
        }
        if !self
            .drain_commits(session, &mut commit_rx, &mut commit_failures, result)
            .await
        {
            failed = true;
        }

        for address in pending {
            let action = plan
                .change(&address)
                .map(|c| c.action.clone())
                .unwrap_or(ChangeAction::NoOp);
            result.add_failure(address, action, "task panicked".to_string());
        }

        if failed {
            BatchStatus::Failed
        } else if stopped && cancel.is_cancelled() {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        }
    }

    /// Commit everything received so far; `false` once a commit fails
    ///
    /// Later commits from a node whose commit failed are dropped.
    async fn drain_commits(
        &self,
        session: &mut StateSession,
        commits: &mut mpsc::UnboundedReceiver<Commit>,
        failures: &mut BTreeSet<String>,
        result: &mut ApplyResult,
    ) -> bool {
        while let Ok(commit) = commits.try_recv() {
            if failures.contains(&commit.node) {
                continue;
            }
            if let Err(e) = session.commit(&commit.address, commit.record).await {
                error!(
                    address = %commit.address,
                    node = %commit.node,
                    error = %e,
                    "State commit failed"
                );
                result.add_failure(
                    commit.node.clone(),
                    commit.action,
                    format!("state commit failed for {}: {}", commit.address, e),
                );
                failures.insert(commit.node);
                return false;
            }
        }
        true
    }
}
