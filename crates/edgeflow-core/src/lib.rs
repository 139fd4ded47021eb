//! edgeflow core
//!
//! Turns a parsed template plus raw parameter values into a gated resource
//! graph: every node tagged `Planned` or `Skipped`, with its desired
//! properties evaluated and provider-assigned values left pending.
//!
//! # Pipeline
//!
//! ```text
//! raw parameters ──► schema ──► variables ──► graph ──► gate
//!                  (validate)   (evaluate)    (DAG +    (Planned /
//!                                              waves)    Skipped)
//! ```
//!
//! Everything here is side-effect free. Provisioning, diffing against remote
//! state and output resolution live in `edgeflow-cloud`.

pub mod error;
pub mod eval;
pub mod expr;
pub mod gate;
pub mod graph;
pub mod model;
pub mod schema;

use tracing::instrument;

// Re-exports
pub use error::{EvaluationError, FlowError, GraphError, Result, SchemaError, SchemaErrors};
pub use eval::{Evaluator, FieldRead, Scope, Variables, evaluate_variables};
pub use expr::Expr;
pub use gate::{GatedGraph, GatedNode, NoOutputs, OutputSource};
pub use graph::{GraphNode, ResourceGraph};
pub use model::*;
pub use schema::{ParameterSet, validate_parameters};

/// Run every pre-provisioning stage: validate parameters, evaluate
/// variables, build the graph and gate it.
///
/// Any error here rejects the run before a single provisioning call.
#[instrument(skip_all, fields(resources = template.resources.len()))]
pub fn prepare(template: &Template, raw: &RawParameters) -> Result<GatedGraph> {
    let params = validate_parameters(template, raw)?;
    let variables = evaluate_variables(template, &params)?;
    let graph = ResourceGraph::build(template)?;
    GatedGraph::evaluate(graph, params, variables)
}
