#![allow(dead_code)]

use async_trait::async_trait;
use edgeflow_cloud::{
    OperationTicket, Outcome, ProvisionRequest, ProvisioningError, ProvisioningProvider,
    ResultProperties,
};
use edgeflow_core::{RawParameters, Template};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const STANDARD: &str = "Standard_AzureFrontDoor";
pub const PREMIUM: &str = "Premium_AzureFrontDoor";

const EDGE_SECURITY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../templates/edge-security.json"
));

pub fn edge_security() -> Template {
    serde_json::from_str(EDGE_SECURITY).unwrap()
}

pub fn params(sku: &str) -> RawParameters {
    let mut raw = RawParameters::new();
    raw.insert("profileName".into(), json!("contoso-edge"));
    raw.insert("skuName".into(), json!(sku));
    raw
}

/// Outputs the mock assigns to a successfully provisioned node.
pub fn outputs_for(node: &str) -> ResultProperties {
    let mut outputs = ResultProperties::new();
    outputs.insert("id".into(), json!(format!("/mock/{node}")));
    outputs.insert("hostName".into(), json!(format!("{node}.example.net")));
    outputs.insert("frontDoorId".into(), json!(format!("fd-{node}")));
    outputs
}

pub fn succeeded(node: &str) -> Outcome {
    Outcome::Succeeded(outputs_for(node))
}

pub fn transient(message: &str) -> Outcome {
    Outcome::Failed(ProvisioningError::transient(message))
}

pub fn permanent(message: &str) -> Outcome {
    Outcome::Failed(ProvisioningError::permanent(message))
}

pub fn in_progress(node: &str) -> Outcome {
    Outcome::InProgress(OperationTicket::new(node, format!("op-{node}")))
}

/// Provider that replays scripted outcomes per node and records every call.
/// Nodes without a script succeed immediately.
#[derive(Default)]
pub struct ScriptedProvider {
    submits: Mutex<HashMap<String, VecDeque<Outcome>>>,
    polls: Mutex<HashMap<String, VecDeque<Outcome>>>,
    requests: Mutex<Vec<ProvisionRequest>>,
    poll_calls: Mutex<Vec<String>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, node: &str, outcomes: Vec<Outcome>) {
        self.submits
            .lock()
            .unwrap()
            .insert(node.to_string(), outcomes.into());
    }

    pub fn script_polls(&self, node: &str, outcomes: Vec<Outcome>) {
        self.polls
            .lock()
            .unwrap()
            .insert(node.to_string(), outcomes.into());
    }

    /// Cancel `token` while `node` is being submitted.
    pub fn cancel_during(&self, node: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((node.to_string(), token));
    }

    pub fn requests(&self) -> Vec<ProvisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Submitted node ids in call order.
    pub fn submitted(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.node).collect()
    }

    pub fn submissions_of(&self, node: &str) -> usize {
        self.submitted().iter().filter(|n| *n == node).count()
    }

    pub fn request(&self, node: &str) -> Option<ProvisionRequest> {
        self.requests().into_iter().rev().find(|r| r.node == node)
    }

    pub fn poll_calls(&self) -> Vec<String> {
        self.poll_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvisioningProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &ProvisionRequest) -> Outcome {
        self.requests.lock().unwrap().push(request.clone());
        if let Some((node, token)) = self.cancel_on.lock().unwrap().as_ref()
            && *node == request.node
        {
            token.cancel();
        }
        self.submits
            .lock()
            .unwrap()
            .get_mut(&request.node)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| succeeded(&request.node))
    }

    async fn poll(&self, ticket: &OperationTicket) -> Outcome {
        self.poll_calls.lock().unwrap().push(ticket.node.clone());
        self.polls
            .lock()
            .unwrap()
            .get_mut(&ticket.node)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| succeeded(&ticket.node))
    }
}
