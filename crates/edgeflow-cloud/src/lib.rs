//! edgeflow cloud
//!
//! Convergence planning and provisioning execution on top of
//! `edgeflow-core`'s gated resource graph.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  edgeflow CLI                    │
//! │              (plan / apply)                      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                edgeflow-cloud                    │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │   Planner    │  │   Executor   │──► Output   │
//! │  │ (hash diff)  │  │ (waves)      │    Resolver │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! └─────────┼─────────────────┼─────────────────────┘
//!           │                 │
//! ┌─────────▼───────┐ ┌───────▼───────────────┐
//! │  StateStore     │ │ ProvisioningProvider  │
//! │  (file/memory)  │ │ (submit / poll)       │
//! └─────────────────┘ └───────────────────────┘
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod executor;
pub mod outputs;
pub mod planner;
pub mod provider;
pub mod report;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, InvalidNode, Plan, PlanSummary, SkippedNode};
pub use engine::{Engine, PlannedRun};
pub use error::{CloudError, ErrorClass, NotReadyError, ProvisioningError, Result};
pub use executor::{Execution, Executor, ExecutorOptions};
pub use outputs::OutputResolver;
pub use planner::{ConvergencePlanner, content_hash};
pub use provider::{
    OperationTicket, Outcome, ProvisionRequest, ProvisioningProvider, ResultProperties,
    RetryConfig,
};
pub use report::{NodeReport, RunReport, RunStatus};
pub use state::{
    FileStateStore, MemoryStateStore, NodeOutcome, RemoteRecord, RemoteSnapshot, StateLock,
    StateStore,
};
