//! Engine orchestration
//!
//! `validate -> graph -> gate -> plan -> execute -> outputs`. Anything that
//! fails before execution rejects the run with zero provisioning calls.

use edgeflow_core::{Expr, GatedGraph, RawParameters, Template, Value, prepare};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::action::Plan;
use crate::error::{CloudError, Result};
use crate::executor::{Executor, ExecutorOptions};
use crate::outputs::OutputResolver;
use crate::planner::ConvergencePlanner;
use crate::provider::ProvisioningProvider;
use crate::report::{RunReport, RunStatus};
use crate::state::{RemoteSnapshot, StateStore};

/// Everything decided before the first provisioning call.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub gated: GatedGraph,
    pub plan: Plan,
    /// Baseline the plan was computed against
    pub snapshot: RemoteSnapshot,
    /// Template output declarations
    pub outputs: IndexMap<String, Expr>,
}

pub struct Engine {
    provider: Arc<dyn ProvisioningProvider>,
    store: Arc<dyn StateStore>,
    options: ExecutorOptions,
    resolver: Arc<OutputResolver>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(provider: Arc<dyn ProvisioningProvider>, store: Arc<dyn StateStore>) -> Self {
        Self {
            provider,
            store,
            options: ExecutorOptions::default(),
            resolver: Arc::new(OutputResolver::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Token that aborts the current run: no new operations are issued,
    /// in-flight ones are awaited.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Late-bound values of the current (or last) run.
    pub fn outputs(&self) -> Arc<OutputResolver> {
        Arc::clone(&self.resolver)
    }

    /// Validate, gate and diff without calling the provider.
    #[instrument(skip_all, fields(resources = template.resources.len()))]
    pub async fn plan(&self, template: &Template, raw: &RawParameters) -> Result<PlannedRun> {
        let gated = prepare(template, raw)?;
        let snapshot = self.store.load().await?;
        let plan = ConvergencePlanner::new(&snapshot).plan(&gated)?;
        Ok(PlannedRun {
            gated,
            plan,
            snapshot,
            outputs: template.outputs.clone(),
        })
    }

    /// Plan and apply. Pre-execution failures come back as a `Rejected`
    /// report; only state store failures are errors.
    #[instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn run(&self, template: &Template, raw: &RawParameters) -> Result<RunReport> {
        let started = Instant::now();
        self.resolver.reset();

        let planned = match self.plan(template, raw).await {
            Ok(planned) => planned,
            Err(CloudError::Rejected(e)) => {
                warn!(error = %e, "Run rejected before execution");
                return Ok(RunReport::rejected(e.to_string(), elapsed_ms(started)));
            }
            Err(e) => return Err(e),
        };

        self.apply_planned(&planned, started).await
    }

    /// Apply an already computed plan.
    pub async fn apply(&self, planned: &PlannedRun) -> Result<RunReport> {
        self.resolver.reset();
        self.apply_planned(planned, Instant::now()).await
    }

    async fn apply_planned(&self, planned: &PlannedRun, started: Instant) -> Result<RunReport> {
        info!(summary = %planned.plan.summary(), "Applying plan");
        let executor = Executor::new(
            self.provider.as_ref(),
            self.store.as_ref(),
            &self.resolver,
            &self.options,
            self.cancel.clone(),
        );
        let execution = executor
            .execute(&planned.gated, &planned.plan, &planned.snapshot)
            .await?;

        let mut values = IndexMap::new();
        for (name, expr) in &planned.outputs {
            match planned.gated.resolve_expr(expr, self.resolver.as_ref()) {
                Ok(value) => {
                    values.insert(name.clone(), value);
                }
                Err(e) => {
                    warn!(output = %name, error = %e, "Output could not be evaluated");
                    values.insert(name.clone(), Value::Unset);
                }
            }
        }
        self.resolver.publish(values);

        let nodes: Vec<_> = execution.nodes.into_values().collect();
        let status = RunStatus::from_nodes(&nodes);
        info!(status = %status, cancelled = execution.cancelled, "Run finished");

        Ok(RunReport {
            status,
            nodes,
            outputs: self.resolver.template_outputs()?,
            cancelled: execution.cancelled,
            duration_ms: elapsed_ms(started),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
