//! Output resolver
//!
//! Tracks every node's lifecycle state during a run and exposes
//! provider-assigned fields only once their node is `Provisioned`. Template
//! outputs become readable when the run publishes them at completion.

use edgeflow_core::{NodeState, OutputSource, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::NotReadyError;
use crate::provider::ResultProperties;

#[derive(Debug, Clone)]
struct NodeEntry {
    state: NodeState,
    outputs: ResultProperties,
}

#[derive(Debug, Default)]
pub struct OutputResolver {
    nodes: RwLock<HashMap<String, NodeEntry>>,
    published: RwLock<Option<IndexMap<String, Value>>>,
}

impl OutputResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything from a previous run.
    pub fn reset(&self) {
        self.nodes.write().unwrap_or_else(|e| e.into_inner()).clear();
        *self.published.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Record a lifecycle transition for `node`.
    pub fn set_state(&self, node: &str, state: NodeState) {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes
            .entry(node.to_string())
            .and_modify(|entry| entry.state = state)
            .or_insert_with(|| NodeEntry {
                state,
                outputs: ResultProperties::new(),
            });
    }

    /// Mark `node` provisioned with the outputs its provider returned.
    pub fn provisioned(&self, node: &str, outputs: ResultProperties) {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes.insert(
            node.to_string(),
            NodeEntry {
                state: NodeState::Provisioned,
                outputs,
            },
        );
    }

    pub fn state(&self, node: &str) -> Option<NodeState> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        nodes.get(node).map(|entry| entry.state)
    }

    /// Read a provider-assigned field.
    ///
    /// Fails with [`NotReadyError`] unless the node is `Provisioned`; a
    /// provisioned node that did not return the field yields `None`.
    pub fn field(&self, node: &str, field: &str) -> Result<Option<serde_json::Value>, NotReadyError> {
        let nodes = self.nodes.read().unwrap_or_else(|e| e.into_inner());
        let entry = nodes.get(node).ok_or_else(|| NotReadyError::UnknownNode {
            node: node.to_string(),
            field: field.to_string(),
        })?;
        if entry.state != NodeState::Provisioned {
            return Err(NotReadyError::Output {
                node: node.to_string(),
                field: field.to_string(),
                state: entry.state,
            });
        }
        Ok(entry.outputs.get(field).cloned())
    }

    /// Publish the template outputs; the run is complete from here on.
    pub fn publish(&self, outputs: IndexMap<String, Value>) {
        *self.published.write().unwrap_or_else(|e| e.into_inner()) = Some(outputs);
    }

    pub fn is_complete(&self) -> bool {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Read a declared template output.
    ///
    /// Before the run completes this is always [`NotReadyError::RunIncomplete`].
    /// After completion, an output that still waits on a node which never
    /// reached `Provisioned` reports that node. Unknown names yield `None`.
    pub fn template_output(&self, name: &str) -> Result<Option<serde_json::Value>, NotReadyError> {
        let published = self.published.read().unwrap_or_else(|e| e.into_inner());
        let outputs = published.as_ref().ok_or(NotReadyError::RunIncomplete)?;
        let Some(value) = outputs.get(name) else {
            return Ok(None);
        };
        if let Some(pending) = value.pending_refs().into_iter().next() {
            let state = self.state(&pending.node).unwrap_or(NodeState::Planned);
            return Err(NotReadyError::Output {
                node: pending.node,
                field: pending.field,
                state,
            });
        }
        Ok(Some(value.to_json().unwrap_or(serde_json::Value::Null)))
    }

    /// Every template output that resolved, in declaration order.
    pub fn template_outputs(&self) -> Result<IndexMap<String, serde_json::Value>, NotReadyError> {
        let published = self.published.read().unwrap_or_else(|e| e.into_inner());
        let outputs = published.as_ref().ok_or(NotReadyError::RunIncomplete)?;
        Ok(outputs
            .iter()
            .filter_map(|(name, value)| value.to_json().ok().map(|json| (name.clone(), json)))
            .collect())
    }
}

impl OutputSource for OutputResolver {
    fn output(&self, node: &str, field: &str) -> Option<serde_json::Value> {
        self.field(node, field).ok().flatten()
    }
}
