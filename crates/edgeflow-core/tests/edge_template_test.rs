mod common;

use common::{PREMIUM, STANDARD, edge_security, params};
use edgeflow_core::{
    EvaluationError, Expr, FieldRef, FlowError, GraphError, NodeState, ResourceGraph, Value, prepare,
};
use serde_json::json;

#[test]
fn test_bundled_template_waves() {
    let template = edge_security();
    let graph = ResourceGraph::build(&template).unwrap();

    assert_eq!(
        graph.waves(),
        &[
            vec!["profile".to_string(), "wafPolicy".to_string()],
            vec!["endpoint".to_string(), "diagnostics".to_string()],
            vec!["securityPolicy".to_string()],
        ]
    );
    assert_eq!(
        graph.dependencies("securityPolicy"),
        &["profile".to_string(), "wafPolicy".to_string(), "endpoint".to_string()]
    );
    assert_eq!(graph.downstream("wafPolicy"), vec!["securityPolicy"]);
}

#[test]
fn test_diagnostics_skipped_without_settings() {
    let gated = prepare(&edge_security(), &params(STANDARD, None)).unwrap();

    let diagnostics = gated.node("diagnostics").unwrap();
    assert_eq!(diagnostics.state, NodeState::Skipped);
    assert_eq!(diagnostics.skip_reason.as_deref(), Some("condition is false"));
    assert!(diagnostics.desired.is_none());
    assert_eq!(gated.planned().count(), 4);
}

#[test]
fn test_diagnostics_skipped_with_empty_workspace() {
    let raw = params(STANDARD, Some(json!({"logWorkspaceId": ""})));
    let gated = prepare(&edge_security(), &raw).unwrap();

    assert!(gated.is_skipped("diagnostics"));
}

#[test]
fn test_diagnostics_planned_with_workspace() {
    let raw = params(STANDARD, Some(json!({"logWorkspaceId": "/workspaces/edge-logs"})));
    let gated = prepare(&edge_security(), &raw).unwrap();

    let desired = gated.node("diagnostics").unwrap().desired.clone().unwrap();
    assert_eq!(
        desired.member("workspaceId"),
        Some(&Value::string("/workspaces/edge-logs"))
    );
    assert_eq!(
        desired.member("retentionDays"),
        Some(&Value::Scalar(json!(30)))
    );
    assert_eq!(
        desired.member("scope"),
        Some(&Value::Pending(FieldRef::new("profile", "id")))
    );
}

#[test]
fn test_standard_tier_has_no_managed_rules() {
    let gated = prepare(&edge_security(), &params(STANDARD, None)).unwrap();

    let waf = gated.node("wafPolicy").unwrap().desired.clone().unwrap();
    let rules = waf.to_json().unwrap();
    assert_eq!(rules["managedRules"]["managedRuleSets"], json!([]));
    assert_eq!(rules["policySettings"]["mode"], json!("Prevention"));
}

#[test]
fn test_premium_tier_maps_rule_sets_in_order() {
    let gated = prepare(&edge_security(), &params(PREMIUM, None)).unwrap();

    let waf = gated.node("wafPolicy").unwrap().desired.clone().unwrap();
    let rules = waf.to_json().unwrap();
    assert_eq!(
        rules["managedRules"]["managedRuleSets"],
        json!([
            {
                "ruleSetType": "Microsoft_DefaultRuleSet",
                "ruleSetVersion": "2.1",
                "ruleSetAction": "Block",
                "ruleGroupOverrides": [],
                "exclusions": []
            },
            {
                "ruleSetType": "Microsoft_BotManagerRuleSet",
                "ruleSetVersion": "1.0",
                "ruleSetAction": "Block",
                "ruleGroupOverrides": [],
                "exclusions": []
            }
        ])
    );
}

#[test]
fn test_security_policy_waits_on_provider_outputs() {
    let gated = prepare(&edge_security(), &params(STANDARD, None)).unwrap();

    let policy = gated.node("securityPolicy").unwrap().desired.clone().unwrap();
    assert!(!policy.is_resolved());
    assert_eq!(
        policy.pending_refs(),
        vec![
            FieldRef::new("wafPolicy", "id"),
            FieldRef::new("endpoint", "id"),
        ]
    );
    assert_eq!(
        policy.member("name"),
        Some(&Value::string("contoso-edge-security"))
    );
}

#[test]
fn test_resolve_with_provider_outputs() {
    let gated = prepare(&edge_security(), &params(STANDARD, None)).unwrap();

    let outputs = |node: &str, field: &str| match (node, field) {
        ("wafPolicy", "id") => Some(json!("/waf/edgewafpolicy")),
        ("endpoint", "id") => Some(json!("/profiles/contoso-edge/endpoints/edge-endpoint")),
        _ => None,
    };
    let policy = gated.resolve("securityPolicy", &outputs).unwrap();
    let json = policy.to_json().unwrap();

    assert_eq!(json["parameters"]["wafPolicy"]["id"], json!("/waf/edgewafpolicy"));
    assert_eq!(
        json["parameters"]["associations"][0]["domains"][0]["id"],
        json!("/profiles/contoso-edge/endpoints/edge-endpoint")
    );
}

#[test]
fn test_invalid_sku_rejected_with_every_failure() {
    let mut raw = params("Classic_AzureFrontDoor", None);
    raw.insert("wafMode".into(), json!(3));

    let err = prepare(&edge_security(), &raw).unwrap_err();
    let FlowError::Schema(errors) = err else {
        panic!("expected schema errors, got {err}");
    };
    let failed: Vec<_> = errors.iter().map(|e| e.parameter.as_str()).collect();
    assert_eq!(failed, vec!["skuName", "wafMode"]);
}

#[test]
fn test_malformed_rule_set_element_rejected() {
    let mut raw = params(PREMIUM, None);
    raw.insert(
        "managedRuleSets".into(),
        json!([{"name": "Microsoft_DefaultRuleSet"}]),
    );

    let err = prepare(&edge_security(), &raw).unwrap_err();
    let FlowError::Schema(errors) = err else {
        panic!("expected schema errors, got {err}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|e| e.reason.contains("version")));
}

#[test]
fn test_cyclic_template_rejected() {
    let mut template = edge_security();
    let profile = template
        .resources
        .iter_mut()
        .find(|r| r.id == "profile")
        .unwrap();
    profile.depends_on.push("securityPolicy".into());

    let err = prepare(&template, &params(STANDARD, None)).unwrap_err();
    assert!(matches!(err, FlowError::Graph(GraphError::Cycle { .. })));
}

#[test]
fn test_required_read_of_skipped_node_fails_only_the_reader() {
    let mut template = edge_security();
    let endpoint = template
        .resources
        .iter_mut()
        .find(|r| r.id == "endpoint")
        .unwrap();
    endpoint.properties.insert(
        "diagnosticsScope".into(),
        Expr::reference("diagnostics", "scope"),
    );

    let gated = prepare(&template, &params(STANDARD, None)).unwrap();

    let endpoint = gated.node("endpoint").unwrap();
    assert_eq!(endpoint.state, NodeState::Failed);
    let Some(EvaluationError::InNode { node, source }) = &endpoint.error else {
        panic!("expected an attributed evaluation error");
    };
    assert_eq!(node, "endpoint");
    assert!(matches!(**source, EvaluationError::SkippedDependency { .. }));

    assert_eq!(gated.node("wafPolicy").unwrap().state, NodeState::Planned);
    assert_eq!(gated.node("securityPolicy").unwrap().state, NodeState::Planned);
}
