//! Provisioning interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::action::ActionType;
use crate::error::ProvisioningError;

/// Provider-assigned values returned by a successful operation
/// (e.g., `id`, `hostName`).
pub type ResultProperties = serde_json::Map<String, serde_json::Value>;

/// Provisioning backend abstraction
///
/// The executor calls `submit` once per attempt and, for long-running
/// operations, `poll` until a terminal outcome arrives.
#[async_trait]
pub trait ProvisioningProvider: Send + Sync {
    /// Returns the provider name (e.g., "local")
    fn name(&self) -> &str;

    /// Start creating or updating a resource
    async fn submit(&self, request: &ProvisionRequest) -> Outcome;

    /// Check on an operation that reported `InProgress`
    async fn poll(&self, ticket: &OperationTicket) -> Outcome;
}

/// A fully resolved create/update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Node id in the template
    pub node: String,

    /// Resource kind (e.g., "Microsoft.Cdn/profiles")
    pub kind: String,

    pub api_version: String,

    pub action: ActionType,

    /// Desired properties with every reference resolved
    pub properties: serde_json::Value,

    /// Content hash of the request; doubles as an idempotency key so a
    /// retried submission can be recognised by the backend
    pub hash: String,
}

/// Handle for an operation that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationTicket {
    pub node: String,
    pub token: String,
}

impl OperationTicket {
    pub fn new(node: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            token: token.into(),
        }
    }
}

/// Result of `submit` or `poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(ResultProperties),
    Failed(ProvisioningError),
    InProgress(OperationTicket),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress(_))
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of submissions, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): exponential, capped at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = (delay as u64).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}
