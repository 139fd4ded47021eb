//! Wave executor
//!
//! Applies a plan one dependency wave at a time. Actions inside a wave run
//! concurrently (bounded by `max_parallel`); the next wave starts only when
//! every action of the current one is terminal. A failed node poisons its
//! dependents, which fail without ever being submitted.

use edgeflow_core::{GatedGraph, NodeState};
use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ActionType, Plan};
use crate::error::{ProvisioningError, Result};
use crate::outputs::OutputResolver;
use crate::planner::content_hash;
use crate::provider::{Outcome, ProvisionRequest, ProvisioningProvider, ResultProperties, RetryConfig};
use crate::report::NodeReport;
use crate::state::{NodeOutcome, RemoteRecord, RemoteSnapshot, StateStore};

/// Executor tuning
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Concurrent operations within one wave
    pub max_parallel: usize,

    pub retry: RetryConfig,

    /// Delay between polls of an `InProgress` operation
    pub poll_interval: Duration,

    /// Polls before an operation is treated as a transient timeout
    pub max_polls: u32,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(2),
            max_polls: 900,
        }
    }
}

/// Per-node results of an execution, in topological order.
#[derive(Debug, Clone)]
pub struct Execution {
    pub nodes: IndexMap<String, NodeReport>,
    pub cancelled: bool,
}

struct ActionOutcome {
    node: String,
    action: ActionType,
    state: NodeState,
    attempts: u32,
    error: Option<String>,
}

impl ActionOutcome {
    fn new(action: &Action, state: NodeState) -> Self {
        Self {
            node: action.node.clone(),
            action: action.action_type,
            state,
            attempts: 0,
            error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub struct Executor<'a> {
    provider: &'a dyn ProvisioningProvider,
    store: &'a dyn StateStore,
    resolver: &'a OutputResolver,
    options: &'a ExecutorOptions,
    cancel: CancellationToken,
    /// Node ids already dispatched in this run
    claimed: Mutex<HashSet<String>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        provider: &'a dyn ProvisioningProvider,
        store: &'a dyn StateStore,
        resolver: &'a OutputResolver,
        options: &'a ExecutorOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            store,
            resolver,
            options,
            cancel,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Execute `plan`. `snapshot` is the baseline the plan was computed
    /// against; unchanged nodes take their outputs from it.
    pub async fn execute(
        &self,
        gated: &GatedGraph,
        plan: &Plan,
        snapshot: &RemoteSnapshot,
    ) -> Result<Execution> {
        let mut reports: IndexMap<String, NodeReport> = IndexMap::new();
        let mut failed: HashSet<String> = HashSet::new();
        for node in gated.nodes() {
            let mut report = NodeReport::new(&node.id, &node.kind, node.state);
            report.skip_reason = node.skip_reason.clone();
            report.action = plan.action(&node.id).map(|a| a.action_type);
            if node.is_failed() {
                report.error = node.error.as_ref().map(ToString::to_string);
                failed.insert(node.id.clone());
            }
            self.resolver.set_state(&node.id, node.state);
            reports.insert(node.id.clone(), report);
        }

        let mut cancelled = false;

        for (index, wave) in plan.waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(wave = index, "Run cancelled, not starting remaining waves");
                cancelled = true;
                break;
            }

            let mut ready = Vec::with_capacity(wave.len());
            for action in wave {
                let Some(dependency) = action.dependencies.iter().find(|d| failed.contains(*d)) else {
                    ready.push(action);
                    continue;
                };
                let mut state = NodeState::Planned;
                state.advance(&action.node, NodeState::Failed)?;
                warn!(node = %action.node, dependency = %dependency, "Skipping submission, dependency failed");
                if let Some(report) = reports.get_mut(&action.node) {
                    report.state = state;
                    report.poisoned_by = Some(dependency.clone());
                    report.error = Some(format!("dependency '{dependency}' failed"));
                }
                self.resolver.set_state(&action.node, state);
                failed.insert(action.node.clone());
            }

            info!(wave = index, actions = ready.len(), "Executing wave");
            let outcomes: Vec<Result<ActionOutcome>> = stream::iter(
                ready
                    .into_iter()
                    .map(|action| self.run_action(gated, action, snapshot)),
            )
            .buffer_unordered(self.options.max_parallel.max(1))
            .collect()
            .await;

            for outcome in outcomes {
                let outcome = outcome?;
                match outcome.state {
                    NodeState::Failed => {
                        failed.insert(outcome.node.clone());
                    }
                    NodeState::Planned => cancelled = true,
                    _ => {}
                }
                if let Some(report) = reports.get_mut(&outcome.node) {
                    report.state = outcome.state;
                    report.action = Some(outcome.action);
                    report.attempts = outcome.attempts;
                    report.error = outcome.error;
                }
            }
        }

        Ok(Execution {
            nodes: reports,
            cancelled: cancelled || self.cancel.is_cancelled(),
        })
    }

    fn claim(&self, node: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.to_string())
    }

    async fn run_action(
        &self,
        gated: &GatedGraph,
        action: &Action,
        snapshot: &RemoteSnapshot,
    ) -> Result<ActionOutcome> {
        let node = action.node.as_str();
        let mut state = NodeState::Planned;

        if self.cancel.is_cancelled() {
            debug!(node = %node, "Not dispatching, run cancelled");
            return Ok(ActionOutcome::new(action, state));
        }
        if !self.claim(node) {
            state.advance(node, NodeState::Failed)?;
            return Ok(ActionOutcome::new(action, state).with_error("node was already dispatched in this run"));
        }

        // Dependencies are terminal now, so their outputs can be substituted.
        let resolved = match gated.resolve(node, self.resolver) {
            Ok(resolved) => resolved,
            Err(e) => {
                state.advance(node, NodeState::Failed)?;
                self.resolver.set_state(node, state);
                return Ok(ActionOutcome::new(action, state).with_error(e.to_string()));
            }
        };
        let hash = content_hash(&action.kind, &action.api_version, &resolved);

        let mut outcome = ActionOutcome::new(action, state);
        if action.action_type == ActionType::NoOp {
            if action.previous_hash.as_deref() == Some(hash.as_str()) {
                state.advance(node, NodeState::Provisioned)?;
                let outputs = snapshot
                    .get(node)
                    .map(|r| r.outputs.clone())
                    .unwrap_or_default();
                self.resolver.provisioned(node, outputs);
                outcome.state = state;
                return Ok(outcome);
            }
            info!(node = %node, "Upstream outputs changed, promoting to update");
            outcome.action = ActionType::Update;
        }

        let properties = match resolved.to_json() {
            Ok(properties) => properties,
            Err(e) => {
                state.advance(node, NodeState::Failed)?;
                self.resolver.set_state(node, state);
                outcome.state = state;
                return Ok(outcome.with_error(e.to_string()));
            }
        };

        let request = ProvisionRequest {
            node: node.to_string(),
            kind: action.kind.clone(),
            api_version: action.api_version.clone(),
            action: outcome.action,
            properties: properties.clone(),
            hash: hash.clone(),
        };

        state.advance(node, NodeState::Submitted)?;
        self.resolver.set_state(node, state);

        let (result, attempts) = self.submit_with_retry(&request).await;
        outcome.attempts = attempts;

        match result {
            Ok(outputs) => {
                let record = RemoteRecord::new(&action.kind, &action.api_version, properties, hash)
                    .with_outputs(outputs.clone());
                if let Err(e) = self.store.commit(node, &NodeOutcome::Provisioned(record)).await {
                    error!(node = %node, error = %e, "Provisioned but failed to commit state");
                    state.advance(node, NodeState::Failed)?;
                    self.resolver.set_state(node, state);
                    outcome.state = state;
                    return Ok(outcome.with_error(format!("state commit failed: {e}")));
                }
                state.advance(node, NodeState::Provisioned)?;
                self.resolver.provisioned(node, outputs);
                info!(node = %node, action = %outcome.action, attempts, "Provisioned");
                outcome.state = state;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(e) = self.store.commit(node, &NodeOutcome::Failed(err.to_string())).await {
                    warn!(node = %node, error = %e, "Failed to record failure in state");
                }
                error!(node = %node, error = %err, attempts, "Provisioning failed");
                state.advance(node, NodeState::Failed)?;
                self.resolver.set_state(node, state);
                outcome.state = state;
                Ok(outcome.with_error(err.to_string()))
            }
        }
    }

    /// Submit until success, a permanent failure, or the retry budget runs
    /// out. Returns the terminal result and the number of submissions.
    async fn submit_with_retry(
        &self,
        request: &ProvisionRequest,
    ) -> (std::result::Result<ResultProperties, ProvisioningError>, u32) {
        let retry = &self.options.retry;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.provider.submit(request).await;
            match self.await_terminal(outcome).await {
                Outcome::Succeeded(outputs) => return (Ok(outputs), attempts),
                Outcome::Failed(err) if err.is_transient() && attempts < retry.max_attempts => {
                    let delay = retry.delay_for_attempt(attempts - 1);
                    warn!(
                        node = %request.node,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    // No new submission once the run is cancelled, even mid-backoff.
                    let cancelled = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => true,
                        _ = tokio::time::sleep(delay) => self.cancel.is_cancelled(),
                    };
                    if cancelled {
                        debug!(node = %request.node, "Retry abandoned, run cancelled");
                        let message = format!("{} (retry cancelled)", err.message);
                        return (Err(ProvisioningError { message, ..err }), attempts);
                    }
                }
                Outcome::Failed(err) => return (Err(err), attempts),
                Outcome::InProgress(ticket) => {
                    let err = ProvisioningError::transient(format!(
                        "operation {} did not reach a terminal state",
                        ticket.token
                    ));
                    return (Err(err), attempts);
                }
            }
        }
    }

    /// Poll an `InProgress` operation until it is terminal.
    async fn await_terminal(&self, mut outcome: Outcome) -> Outcome {
        let mut polls = 0;
        while let Outcome::InProgress(ticket) = &outcome {
            if polls >= self.options.max_polls {
                return Outcome::Failed(ProvisioningError::transient(format!(
                    "operation {} did not finish after {polls} polls",
                    ticket.token
                )));
            }
            let ticket = ticket.clone();
            tokio::time::sleep(self.options.poll_interval).await;
            polls += 1;
            debug!(node = %ticket.node, polls, "Polling operation");
            outcome = self.provider.poll(&ticket).await;
        }
        outcome
    }
}
