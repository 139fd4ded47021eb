//! Condition gate
//!
//! Evaluates every node's inclusion predicate once, in topological order, and
//! tags the node `Planned` or `Skipped`. Skipped nodes stay in the graph: a
//! dependent reading one gets unset through an optional reference and an
//! error through a required one.
//!
//! A node whose condition or properties cannot be evaluated (a required read
//! of a skipped node, a missing field) is marked `Failed` with the error and
//! never submitted; the executor poisons its dependents. A condition that
//! reads a provider-assigned value is a template error and rejects the run.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{EvaluationError, FlowError, Result};
use crate::eval::{Evaluator, FieldRead, Scope, Variables};
use crate::expr::Expr;
use crate::graph::ResourceGraph;
use crate::model::{FieldRef, NodeState, Value};
use crate::schema::ParameterSet;

/// Source of provider-assigned output values.
pub trait OutputSource {
    fn output(&self, node: &str, field: &str) -> Option<serde_json::Value>;
}

/// Nothing is provisioned yet; every output reads as pending.
pub struct NoOutputs;

impl OutputSource for NoOutputs {
    fn output(&self, _node: &str, _field: &str) -> Option<serde_json::Value> {
        None
    }
}

impl<F> OutputSource for F
where
    F: Fn(&str, &str) -> Option<serde_json::Value>,
{
    fn output(&self, node: &str, field: &str) -> Option<serde_json::Value> {
        self(node, field)
    }
}

/// A node after gating.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedNode {
    pub id: String,
    pub kind: String,
    pub api_version: String,
    /// `Planned`, `Skipped`, or `Failed` when its properties cannot be
    /// evaluated
    pub state: NodeState,
    /// Desired properties evaluated against desired state only; provider
    /// outputs of other nodes appear as pending. `None` unless planned.
    pub desired: Option<Value>,
    /// Why the node was skipped
    pub skip_reason: Option<String>,
    /// Why the node's properties could not be evaluated
    pub error: Option<EvaluationError>,
}

impl GatedNode {
    pub fn is_skipped(&self) -> bool {
        self.state == NodeState::Skipped
    }

    pub fn is_failed(&self) -> bool {
        self.state == NodeState::Failed
    }
}

/// The resource graph with every inclusion decision made.
#[derive(Debug, Clone)]
pub struct GatedGraph {
    graph: ResourceGraph,
    params: ParameterSet,
    variables: Variables,
    nodes: IndexMap<String, GatedNode>,
    skipped: HashSet<String>,
}

impl GatedGraph {
    /// Gate every node of `graph`.
    ///
    /// A node is skipped when its condition is false or its parent was
    /// skipped. Explicit `depends_on` edges to a skipped node are ignored.
    pub fn evaluate(graph: ResourceGraph, params: ParameterSet, variables: Variables) -> Result<Self> {
        let mut skipped: HashSet<String> = HashSet::new();
        let mut decisions: Vec<(String, NodeState, Option<String>, Option<EvaluationError>)> =
            Vec::new();

        for id in graph.topological_order() {
            let Some(node) = graph.node(id) else { continue };
            let mut state = NodeState::Defined;
            state.advance(id, NodeState::Validated)?;

            let scope = GraphScope {
                graph: &graph,
                params: &params,
                variables: &variables,
                skipped: &skipped,
                outputs: &NoOutputs,
            };
            let evaluator = Evaluator::new(&params, &variables).with_scope(&scope);

            let mut error = None;
            let skip_reason = match (&node.def.parent, &node.def.condition) {
                (Some(parent), _) if skipped.contains(parent) => {
                    Some(format!("parent '{parent}' is skipped"))
                }
                (_, Some(condition)) => match evaluator.condition(condition) {
                    Ok(included) => (!included).then(|| "condition is false".to_string()),
                    Err(e @ EvaluationError::PendingCondition(_)) => {
                        return Err(e.in_node(id).into());
                    }
                    Err(e) => {
                        warn!(node = %id, error = %e, "Condition cannot be evaluated");
                        error = Some(e.in_node(id));
                        None
                    }
                },
                (_, None) => None,
            };

            if skip_reason.is_some() {
                state.advance(id, NodeState::Skipped)?;
                skipped.insert(id.to_string());
            } else {
                state.advance(id, NodeState::Planned)?;
                if error.is_some() {
                    state.advance(id, NodeState::Failed)?;
                }
            }
            debug!(node = %id, state = %state, "Condition gate decision");
            decisions.push((id.to_string(), state, skip_reason, error));
        }

        let mut gated = Self {
            graph,
            params,
            variables,
            nodes: IndexMap::new(),
            skipped,
        };

        let mut nodes = IndexMap::new();
        for (id, mut state, skip_reason, mut error) in decisions {
            let mut desired = None;
            if state == NodeState::Planned {
                match gated.resolve(&id, &NoOutputs) {
                    Ok(value) => desired = Some(value),
                    Err(FlowError::Evaluation(e)) => {
                        warn!(node = %id, error = %e, "Properties cannot be evaluated");
                        state.advance(&id, NodeState::Failed)?;
                        error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            let Some(node) = gated.graph.node(&id) else { continue };
            nodes.insert(
                id.clone(),
                GatedNode {
                    id,
                    kind: node.def.kind.clone(),
                    api_version: node.def.api_version.clone(),
                    state,
                    desired,
                    skip_reason,
                    error,
                },
            );
        }
        gated.nodes = nodes;

        info!(
            planned = gated.planned().count(),
            skipped = gated.skipped.len(),
            failed = gated.failed().count(),
            "Condition gate evaluated"
        );
        Ok(gated)
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn node(&self, id: &str) -> Option<&GatedNode> {
        self.nodes.get(id)
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &GatedNode> {
        self.nodes.values()
    }

    pub fn planned(&self) -> impl Iterator<Item = &GatedNode> {
        self.nodes.values().filter(|n| n.state == NodeState::Planned)
    }

    /// Nodes whose properties could not be evaluated.
    pub fn failed(&self) -> impl Iterator<Item = &GatedNode> {
        self.nodes.values().filter(|n| n.is_failed())
    }

    pub fn is_skipped(&self, id: &str) -> bool {
        self.skipped.contains(id)
    }

    /// Evaluate a node's properties, reading provider outputs from `outputs`.
    /// Outputs it cannot answer remain pending.
    pub fn resolve(&self, id: &str, outputs: &dyn OutputSource) -> Result<Value> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| EvaluationError::Unresolved(id.to_string()))?;
        let scope = self.scope(outputs);
        let evaluator = Evaluator::new(&self.params, &self.variables).with_scope(&scope);

        let mut properties = IndexMap::with_capacity(node.def.properties.len());
        for (key, expr) in &node.def.properties {
            let value = evaluator.evaluate(expr).map_err(|e| e.in_node(id))?;
            properties.insert(key.clone(), value);
        }
        Ok(Value::Object(properties))
    }

    /// Evaluate a free-standing expression (e.g., a template output) against
    /// the gated graph.
    pub fn resolve_expr(&self, expr: &Expr, outputs: &dyn OutputSource) -> Result<Value> {
        let scope = self.scope(outputs);
        let value = Evaluator::new(&self.params, &self.variables)
            .with_scope(&scope)
            .evaluate(expr)?;
        Ok(value)
    }

    fn scope<'s>(&'s self, outputs: &'s dyn OutputSource) -> GraphScope<'s> {
        GraphScope {
            graph: &self.graph,
            params: &self.params,
            variables: &self.variables,
            skipped: &self.skipped,
            outputs,
        }
    }
}

/// Resource reads backed by the graph: properties are evaluated on demand,
/// outputs come from `outputs` or stay pending.
struct GraphScope<'s> {
    graph: &'s ResourceGraph,
    params: &'s ParameterSet,
    variables: &'s Variables,
    skipped: &'s HashSet<String>,
    outputs: &'s dyn OutputSource,
}

impl Scope for GraphScope<'_> {
    fn read(&self, node: &str, field: &str) -> std::result::Result<FieldRead, EvaluationError> {
        if self.skipped.contains(node) {
            return Ok(FieldRead::Skipped);
        }
        let unresolved = || EvaluationError::Unresolved(FieldRef::new(node, field).to_string());
        let def = &self.graph.node(node).ok_or_else(unresolved)?.def;

        if def.is_output(field) {
            let value = match self.outputs.output(node, field) {
                Some(json) => Value::from_json(&json),
                None => Value::Pending(FieldRef::new(node, field)),
            };
            return Ok(FieldRead::Value(value));
        }

        let expr = def.properties.get(field).ok_or_else(unresolved)?;
        let value = Evaluator::new(self.params, self.variables)
            .with_scope(self)
            .evaluate(expr)
            .map_err(|e| e.in_node(node))?;
        Ok(FieldRead::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceDef, Template};
    use serde_json::json;

    fn gate(template: &Template) -> Result<GatedGraph> {
        let graph = ResourceGraph::build(template)?;
        GatedGraph::evaluate(graph, ParameterSet::default(), Variables::new())
    }

    fn resource(id: &str) -> ResourceDef {
        ResourceDef::new(id, "Test/things", "2024-01-01").with_outputs(&["id"])
    }

    #[test]
    fn test_false_condition_skips_and_cascades_to_children() {
        let template = Template {
            resources: vec![
                resource("diag").with_condition(Expr::lit(false)),
                resource("child").with_parent("diag"),
                resource("other").with_dependency("diag"),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        assert!(gated.is_skipped("diag"));
        assert!(gated.is_skipped("child"));
        assert!(!gated.is_skipped("other"));
        assert_eq!(
            gated.node("child").unwrap().skip_reason.as_deref(),
            Some("parent 'diag' is skipped")
        );
    }

    #[test]
    fn test_condition_reads_gated_dependency() {
        let template = Template {
            resources: vec![
                resource("a")
                    .with_condition(Expr::lit(false))
                    .with_property("enabled", Expr::lit(true)),
                resource("b").with_condition(Expr::not(Expr::empty(Expr::optional_reference(
                    "a", "enabled",
                )))),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        assert!(gated.is_skipped("a"));
        assert!(gated.is_skipped("b"));
    }

    #[test]
    fn test_required_read_of_skipped_node_fails_reader() {
        let template = Template {
            resources: vec![
                resource("a").with_condition(Expr::lit(false)),
                resource("b").with_property("target", Expr::reference("a", "id")),
                resource("c"),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        let b = gated.node("b").unwrap();
        assert_eq!(b.state, NodeState::Failed);
        assert!(b.desired.is_none());
        assert!(matches!(
            b.error,
            Some(EvaluationError::InNode { ref node, ref source })
                if node == "b" && matches!(**source, EvaluationError::SkippedDependency { .. })
        ));
        assert_eq!(gated.planned().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_condition_reading_skipped_node_fails_only_that_node() {
        let template = Template {
            resources: vec![
                resource("a").with_condition(Expr::lit(false)),
                resource("b").with_condition(Expr::not(Expr::empty(Expr::reference("a", "id")))),
                resource("child").with_parent("b"),
                resource("c"),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        let b = gated.node("b").unwrap();
        assert_eq!(b.state, NodeState::Failed);
        assert!(matches!(
            b.error,
            Some(EvaluationError::InNode { ref node, ref source })
                if node == "b" && matches!(**source, EvaluationError::SkippedDependency { .. })
        ));
        let mut planned: Vec<_> = gated.planned().map(|n| n.id.as_str()).collect();
        planned.sort();
        assert_eq!(planned, vec!["c", "child"]);
    }

    #[test]
    fn test_ternary_over_output_stays_pending() {
        let template = Template {
            resources: vec![
                resource("endpoint").with_outputs(&["id", "hostName"]),
                resource("route").with_property(
                    "host",
                    Expr::if_else(
                        Expr::eq(Expr::reference("endpoint", "hostName"), Expr::lit("")),
                        Expr::lit("none"),
                        Expr::reference("endpoint", "hostName"),
                    ),
                ),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        let route = gated.node("route").unwrap();
        assert_eq!(route.state, NodeState::Planned);
        assert!(route.error.is_none());
        let desired = route.desired.clone().unwrap();
        assert_eq!(desired.pending_refs(), vec![FieldRef::new("endpoint", "hostName")]);

        let outputs = |node: &str, field: &str| {
            (node == "endpoint" && field == "hostName").then(|| json!("edge.azurefd.net"))
        };
        let resolved = gated.resolve("route", &outputs).unwrap();
        assert_eq!(resolved.to_json().unwrap(), json!({"host": "edge.azurefd.net"}));
    }

    #[test]
    fn test_condition_on_output_rejects() {
        let template = Template {
            resources: vec![
                resource("a"),
                resource("b").with_condition(Expr::eq(Expr::reference("a", "id"), Expr::lit("x"))),
            ],
            ..Template::new()
        };
        let err = gate(&template).unwrap_err();
        assert!(err.to_string().contains("provider-assigned"));
    }

    #[test]
    fn test_desired_keeps_outputs_pending_until_resolved() {
        let template = Template {
            resources: vec![
                resource("profile"),
                resource("endpoint")
                    .with_parent("profile")
                    .with_property("profileId", Expr::reference("profile", "id")),
            ],
            ..Template::new()
        };
        let gated = gate(&template).unwrap();

        let desired = gated.node("endpoint").unwrap().desired.clone().unwrap();
        assert_eq!(desired.pending_refs(), vec![FieldRef::new("profile", "id")]);

        let outputs = |node: &str, field: &str| {
            (node == "profile" && field == "id").then(|| json!("/local/profiles/profile"))
        };
        let resolved = gated.resolve("endpoint", &outputs).unwrap();
        assert_eq!(
            resolved.to_json().unwrap(),
            json!({"profileId": "/local/profiles/profile"})
        );
    }
}
