//! Per-node lifecycle state machine

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Lifecycle of a resource node within one run.
///
/// `Defined -> Validated -> {Skipped | Planned} -> Submitted -> {Provisioned | Failed}`
///
/// Two shortcuts leave `Planned` without a submission: an unchanged node goes
/// straight to `Provisioned`, and a node poisoned by a failed dependency (or
/// whose properties cannot be resolved) goes straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Defined,
    Validated,
    Skipped,
    Planned,
    Submitted,
    Provisioned,
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Provisioned | Self::Failed)
    }

    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Defined, Validated)
                | (Validated, Skipped)
                | (Validated, Planned)
                | (Planned, Submitted)
                | (Planned, Provisioned)
                | (Planned, Failed)
                | (Submitted, Provisioned)
                | (Submitted, Failed)
        )
    }

    /// Checked transition.
    pub fn advance(&mut self, node: &str, next: NodeState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(FlowError::IllegalTransition {
                node: node.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Defined => write!(f, "defined"),
            NodeState::Validated => write!(f, "validated"),
            NodeState::Skipped => write!(f, "skipped"),
            NodeState::Planned => write!(f, "planned"),
            NodeState::Submitted => write!(f, "submitted"),
            NodeState::Provisioned => write!(f, "provisioned"),
            NodeState::Failed => write!(f, "failed"),
        }
    }
}
