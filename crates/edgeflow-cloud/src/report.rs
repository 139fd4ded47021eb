//! Run report

use edgeflow_core::NodeState;
use indexmap::IndexMap;
use serde::Serialize;

use crate::action::ActionType;

/// Terminal record of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub kind: String,
    /// `Skipped`, `Provisioned` or `Failed`; a node left `Planned` was never
    /// attempted because the run was cancelled
    pub state: NodeState,
    pub action: Option<ActionType>,
    /// Number of `submit` calls made
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed dependency that prevented this node from being attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poisoned_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl NodeReport {
    pub fn new(node: impl Into<String>, kind: impl Into<String>, state: NodeState) -> Self {
        Self {
            node: node.into(),
            kind: kind.into(),
            state,
            action: None,
            attempts: 0,
            error: None,
            poisoned_by: None,
            skip_reason: None,
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned_by.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    FullyConverged,
    PartiallyConverged {
        /// Nodes whose own operation failed
        failed: Vec<String>,
        /// Nodes failed without an attempt because a dependency failed
        poisoned: Vec<String>,
        /// Nodes never attempted because the run was cancelled
        not_attempted: Vec<String>,
    },
    Rejected {
        reason: String,
    },
}

impl RunStatus {
    /// Derive the status from per-node terminal states.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeReport>) -> Self {
        let mut failed = Vec::new();
        let mut poisoned = Vec::new();
        let mut not_attempted = Vec::new();
        for node in nodes {
            match node.state {
                NodeState::Failed if node.is_poisoned() => poisoned.push(node.node.clone()),
                NodeState::Failed => failed.push(node.node.clone()),
                NodeState::Skipped | NodeState::Provisioned => {}
                _ => not_attempted.push(node.node.clone()),
            }
        }
        if failed.is_empty() && poisoned.is_empty() && not_attempted.is_empty() {
            RunStatus::FullyConverged
        } else {
            RunStatus::PartiallyConverged {
                failed,
                poisoned,
                not_attempted,
            }
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::FullyConverged => write!(f, "fully converged"),
            RunStatus::PartiallyConverged {
                failed,
                poisoned,
                not_attempted,
            } => {
                write!(f, "partially converged")?;
                let groups = [
                    ("failed", failed),
                    ("failed due to dependency", poisoned),
                    ("not attempted", not_attempted),
                ];
                for (label, nodes) in groups {
                    if !nodes.is_empty() {
                        write!(f, "; {label}: {}", nodes.join(", "))?;
                    }
                }
                Ok(())
            }
            RunStatus::Rejected { reason } => write!(f, "rejected before execution: {reason}"),
        }
    }
}

/// Outcome of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Nodes in topological order
    pub nodes: Vec<NodeReport>,
    /// Template outputs that resolved
    pub outputs: IndexMap<String, serde_json::Value>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn rejected(reason: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Rejected {
                reason: reason.into(),
            },
            nodes: Vec::new(),
            outputs: IndexMap::new(),
            cancelled: false,
            duration_ms,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == id)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::FullyConverged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_nodes() {
        let mut waf = NodeReport::new("waf", "policy", NodeState::Failed);
        waf.error = Some("denied".into());
        let mut association = NodeReport::new("association", "securityPolicy", NodeState::Failed);
        association.poisoned_by = Some("waf".into());
        let nodes = vec![
            NodeReport::new("profile", "profile", NodeState::Provisioned),
            NodeReport::new("diag", "diagnostics", NodeState::Skipped),
            waf,
            association,
            NodeReport::new("late", "thing", NodeState::Planned),
        ];

        let status = RunStatus::from_nodes(&nodes);
        assert_eq!(
            status,
            RunStatus::PartiallyConverged {
                failed: vec!["waf".into()],
                poisoned: vec!["association".into()],
                not_attempted: vec!["late".into()],
            }
        );
        assert_eq!(
            status.to_string(),
            "partially converged; failed: waf; failed due to dependency: association; not attempted: late"
        );
    }

    #[test]
    fn test_all_terminal_success_is_fully_converged() {
        let nodes = [
            NodeReport::new("profile", "profile", NodeState::Provisioned),
            NodeReport::new("diag", "diagnostics", NodeState::Skipped),
        ];
        assert_eq!(RunStatus::from_nodes(&nodes), RunStatus::FullyConverged);
    }
}
