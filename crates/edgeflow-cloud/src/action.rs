//! Planned actions

use edgeflow_core::{FieldRef, Value};
use serde::{Deserialize, Serialize};

/// Represents a planned action for one resource node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    /// Node id
    pub node: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource kind (e.g., "Microsoft.Cdn/profiles")
    pub kind: String,

    pub api_version: String,

    /// Desired properties as known at planning time
    pub desired: Value,

    /// Content hash of `desired`
    pub hash: String,

    /// Hash recorded by the last successful run, if any
    pub previous_hash: Option<String>,

    /// Provider-assigned values the properties still wait on
    pub pending: Vec<FieldRef>,

    /// Direct dependencies (from the resource graph)
    pub dependencies: Vec<String>,
}

impl Action {
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {} ({})", self.node, self.kind),
            ActionType::Update => format!("Update {} ({})", self.node, self.kind),
            ActionType::NoOp => format!("{} ({}) is up to date", self.node, self.kind),
        }
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A node the condition gate excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedNode {
    pub node: String,
    pub kind: String,
    pub reason: String,
}

/// A node whose desired properties could not be evaluated. It is never
/// submitted and its dependents fail with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidNode {
    pub node: String,
    pub kind: String,
    pub error: String,
}

/// Ordered operation list, grouped into dependency waves
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    /// Waves in execution order; every dependency of an action sits in an
    /// earlier wave
    pub waves: Vec<Vec<Action>>,

    pub skipped: Vec<SkippedNode>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<InvalidNode>,
}

impl Plan {
    /// Whether the plan has any changes
    pub fn has_changes(&self) -> bool {
        self.actions().any(|a| a.action_type != ActionType::NoOp)
    }

    /// Actions in execution order
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.waves.iter().flatten()
    }

    pub fn action(&self, node: &str) -> Option<&Action> {
        self.actions().find(|a| a.node == node)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
            skipped: self.skipped.len(),
            invalid: self.invalid.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub no_change: usize,
    pub skipped: usize,
    pub invalid: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} unchanged, {} skipped",
            self.create, self.update, self.no_change, self.skipped
        )?;
        if self.invalid > 0 {
            write!(f, ", {} invalid", self.invalid)?;
        }
        Ok(())
    }
}
