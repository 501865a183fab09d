//! Engine: refresh, diff, plan and apply against one state store

use crate::action::{ApplyResult, Plan};
use crate::differ::{DiffMode, diff};
use crate::error::{EngineError, PlanError, Result};
use crate::executor::{CancelSignal, DEFAULT_PARALLELISM, Executor};
use crate::planner;
use crate::provider::ProviderRegistry;
use crate::state::{LockOptions, StateSession, StateSnapshot, StateStore};
use std::sync::Arc;
use tessera_core::ResourceGraph;
use tracing::{debug, info, warn};

/// Engine options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Concurrent node operations per batch
    pub parallelism: usize,
    /// Read every record from its provider before diffing
    pub refresh: bool,
    pub lock: LockOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            refresh: true,
            lock: LockOptions::default(),
        }
    }
}

/// Reconciliation engine
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<ProviderRegistry>,
    store: StateStore,
    options: EngineOptions,
}

impl Engine {
    pub fn new(registry: ProviderRegistry, store: StateStore, options: EngineOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            options,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Plan without taking the lock
    pub async fn plan(&self, graph: &ResourceGraph, mode: DiffMode) -> Result<Plan> {
        let snapshot = self.store.load().await?;
        self.plan_against(graph, &snapshot, mode).await
    }

    async fn plan_against(
        &self,
        graph: &ResourceGraph,
        snapshot: &StateSnapshot,
        mode: DiffMode,
    ) -> Result<Plan> {
        let working = if self.options.refresh {
            self.refresh(graph, snapshot, mode).await?
        } else {
            snapshot.clone()
        };
        let changes = diff(graph, &working, &self.registry, mode)?;
        let plan = planner::plan(changes, snapshot.serial, mode == DiffMode::Destroy)?;
        info!(summary = %plan.summary(), batches = plan.batches.len(), "Plan ready");
        Ok(plan)
    }

    /// Read every record from its provider into a working copy
    ///
    /// A desired resource reported gone is dropped so it plans as a create.
    /// Gone records outside the desired set stay so their destroy clears them.
    async fn refresh(
        &self,
        graph: &ResourceGraph,
        snapshot: &StateSnapshot,
        mode: DiffMode,
    ) -> Result<StateSnapshot> {
        let mut working = snapshot.clone();
        for (address, record) in &snapshot.records {
            let Some(provider) = self.registry.provider_for(&record.resource_type) else {
                continue;
            };
            match provider
                .read(&record.resource_type, &record.provider_id)
                .await
            {
                Ok(reported) => {
                    let mut refreshed = record.clone();
                    refreshed.set_reported(reported);
                    if refreshed.attributes != record.attributes {
                        warn!(address = %address, "Drift detected");
                    }
                    working.records.insert(address.clone(), refreshed);
                }
                Err(e) if e.is_not_found() => {
                    warn!(address = %address, id = %record.provider_id, "Resource no longer exists");
                    if mode == DiffMode::Apply && graph.contains(address) {
                        working.records.remove(address);
                    }
                }
                Err(source) => {
                    return Err(EngineError::Provider {
                        address: address.clone(),
                        source,
                    });
                }
            }
        }
        debug!(records = working.len(), "Refreshed state");
        Ok(working)
    }

    /// Take the lock and open a session
    pub async fn begin(&self) -> Result<EngineSession<'_>> {
        let state = self.store.open_session(&self.options.lock).await?;
        Ok(EngineSession {
            engine: self,
            state,
        })
    }
}

/// Engine operations under the state lock
#[derive(Debug)]
pub struct EngineSession<'a> {
    engine: &'a Engine,
    state: StateSession,
}

impl EngineSession<'_> {
    pub fn snapshot(&self) -> &StateSnapshot {
        self.state.snapshot()
    }

    pub fn lock_id(&self) -> &str {
        self.state.lock().id()
    }

    pub async fn plan(&self, graph: &ResourceGraph, mode: DiffMode) -> Result<Plan> {
        self.engine
            .plan_against(graph, self.state.snapshot(), mode)
            .await
    }

    /// Apply a plan computed against the current state serial
    pub async fn apply(&mut self, plan: &Plan, cancel: CancelSignal) -> Result<ApplyResult> {
        let serial = self.state.snapshot().serial;
        if plan.state_serial != serial {
            return Err(PlanError::StalePlan {
                expected: plan.state_serial,
                found: serial,
            }
            .into());
        }

        let executor = Executor::new(
            Arc::clone(&self.engine.registry),
            self.engine.options.parallelism,
        );
        Ok(executor.run(&mut self.state, plan, cancel).await)
    }

    pub async fn release(self) -> Result<()> {
        Ok(self.state.release().await?)
    }
}
