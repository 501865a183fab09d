//! Tessera reconciliation engine
//!
//! This crate holds everything between the resource graph and the providers:
//! the state store, the differ, the planner and the executor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   tessera CLI                   │
//! │          (plan / apply / destroy / state)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 tessera-cloud                   │
//! │  ┌────────┐  ┌─────────┐  ┌──────────┐          │
//! │  │ Differ │─▶│ Planner │─▶│ Executor │          │
//! │  └────▲───┘  └─────────┘  └────┬─────┘          │
//! │       │      ┌─────────────┐   │                │
//! │       └──────│ State Store │◀──┘                │
//! │              └─────────────┘                    │
//! │  trait ResourceProvider { create/read/... }     │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │ local provider│
//!           └───────────────┘
//! ```

pub mod action;
pub mod differ;
pub mod engine;
pub mod error;
pub mod executor;
pub mod planner;
pub mod provider;
pub mod retry;
pub mod state;

#[cfg(test)]
mod testing;

// Re-exports
pub use action::{
    ActionResult, ApplyResult, Batch, Change, ChangeAction, ChangeSet, PLAN_FORMAT_VERSION,
    Plan, PlanSummary,
};
pub use differ::{DiffMode, diff};
pub use engine::{Engine, EngineOptions, EngineSession};
pub use error::{EngineError, PlanError, ProviderError, ProviderResult, Result, StateError};
pub use executor::{CancelHandle, CancelSignal, DEFAULT_PARALLELISM, Executor};
pub use provider::{AttributeClass, Created, ProviderRegistry, ResourceProvider};
pub use retry::{RetryConfig, RetryingProvider};
pub use state::{
    LockInfo, LockOptions, STATE_FORMAT_VERSION, StateLock, StateRecord, StateSession,
    StateSnapshot, StateStore,
};
