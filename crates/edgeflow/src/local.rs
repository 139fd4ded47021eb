//! Local simulated provider
//!
//! Deterministic stand-in for a cloud backend: every submission succeeds
//! immediately with ids and host names derived from the request, so a
//! template can be applied end to end without credentials.

use async_trait::async_trait;
use edgeflow_cloud::{
    OperationTicket, Outcome, ProvisionRequest, ProvisioningError, ProvisioningProvider,
    ResultProperties,
};
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

pub struct LocalProvider {
    /// Nodes that always fail permanently
    failures: HashSet<String>,
}

impl LocalProvider {
    pub fn new(failures: impl IntoIterator<Item = String>) -> Self {
        Self {
            failures: failures.into_iter().collect(),
        }
    }

    fn outputs_for(request: &ProvisionRequest) -> ResultProperties {
        let kind = request.kind.rsplit('/').next().unwrap_or(&request.kind);
        let mut outputs = ResultProperties::new();
        outputs.insert(
            "id".into(),
            json!(format!("/local/{}/{}", kind, request.node)),
        );

        let name = request
            .properties
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or(&request.node);
        let digest = blake3::hash(format!("{}/{}", request.node, name).as_bytes()).to_hex();

        if kind.eq_ignore_ascii_case("afdEndpoints") {
            outputs.insert(
                "hostName".into(),
                json!(format!("{name}-{}.z01.azurefd.local", &digest[..16])),
            );
        }
        if kind.eq_ignore_ascii_case("profiles") {
            outputs.insert(
                "frontDoorId".into(),
                json!(format!(
                    "{}-{}-{}-{}-{}",
                    &digest[..8],
                    &digest[8..12],
                    &digest[12..16],
                    &digest[16..20],
                    &digest[20..32]
                )),
            );
        }
        outputs
    }
}

#[async_trait]
impl ProvisioningProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn submit(&self, request: &ProvisionRequest) -> Outcome {
        debug!(node = %request.node, action = %request.action, "Local submit");
        if self.failures.contains(&request.node) {
            return Outcome::Failed(ProvisioningError::permanent(format!(
                "simulated rejection of '{}'",
                request.node
            )));
        }
        Outcome::Succeeded(Self::outputs_for(request))
    }

    async fn poll(&self, ticket: &OperationTicket) -> Outcome {
        Outcome::Failed(ProvisioningError::permanent(format!(
            "unknown operation {}",
            ticket.token
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_cloud::ActionType;

    fn request(node: &str, kind: &str, name: &str) -> ProvisionRequest {
        ProvisionRequest {
            node: node.into(),
            kind: kind.into(),
            api_version: "2024-02-01".into(),
            action: ActionType::Create,
            properties: json!({"name": name}),
            hash: "h".into(),
        }
    }

    #[tokio::test]
    async fn test_outputs_are_deterministic() {
        let provider = LocalProvider::new(Vec::new());
        let endpoint = request("endpoint", "Microsoft.Cdn/profiles/afdEndpoints", "contoso");

        let Outcome::Succeeded(first) = provider.submit(&endpoint).await else {
            panic!("expected success");
        };
        let Outcome::Succeeded(second) = provider.submit(&endpoint).await else {
            panic!("expected success");
        };

        assert_eq!(first, second);
        assert_eq!(first["id"], json!("/local/afdEndpoints/endpoint"));
        let host = first["hostName"].as_str().unwrap();
        assert!(host.starts_with("contoso-"));
        assert!(host.ends_with(".z01.azurefd.local"));
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let provider = LocalProvider::new(["wafPolicy".to_string()]);
        let waf = request(
            "wafPolicy",
            "Microsoft.Network/FrontDoorWebApplicationFirewallPolicies",
            "edgewafpolicy",
        );

        let Outcome::Failed(err) = provider.submit(&waf).await else {
            panic!("expected failure");
        };
        assert!(!err.is_transient());
    }
}
