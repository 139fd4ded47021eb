//! Provisioning error types

use edgeflow_core::{FlowError, NodeState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a failed operation is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Timeouts, throttling, temporary unavailability
    Transient,
    /// Schema rejection, authorization denial
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// A provisioning call that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{class} provisioning error: {message}")]
pub struct ProvisioningError {
    pub class: ErrorClass,
    pub message: String,
}

impl ProvisioningError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

/// Reading a late-bound value before it exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotReadyError {
    #[error("output '{node}.{field}' is not available: '{node}' is {state}, not provisioned")]
    Output {
        node: String,
        field: String,
        state: NodeState,
    },

    #[error("output '{node}.{field}' is not available: '{node}' is not part of this run")]
    UnknownNode { node: String, field: String },

    #[error("run has not completed; template outputs are not available yet")]
    RunIncomplete,
}

/// Cloud errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Run rejected before execution: {0}")]
    Rejected(#[from] FlowError),

    #[error(transparent)]
    NotReady(#[from] NotReadyError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
