//! Convergence planner
//!
//! Diffs the gated desired graph against the remote snapshot by content
//! hash. Provider outputs already recorded in the snapshot are substituted
//! before hashing, so an unchanged template against an unchanged snapshot
//! plans nothing but `NoOp`.

use edgeflow_core::{GatedGraph, Value};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::action::{Action, ActionType, InvalidNode, Plan, SkippedNode};
use crate::error::Result;
use crate::state::RemoteSnapshot;

/// Content hash of a node: blake3 over the canonical rendering of
/// `{kind, api_version, properties}`.
pub fn content_hash(kind: &str, api_version: &str, properties: &Value) -> String {
    let mut envelope = IndexMap::new();
    envelope.insert("kind".to_string(), Value::string(kind));
    envelope.insert("api_version".to_string(), Value::string(api_version));
    envelope.insert("properties".to_string(), properties.clone());
    let canonical = Value::Object(envelope).canonical();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

pub struct ConvergencePlanner<'a> {
    snapshot: &'a RemoteSnapshot,
}

impl<'a> ConvergencePlanner<'a> {
    pub fn new(snapshot: &'a RemoteSnapshot) -> Self {
        Self { snapshot }
    }

    /// Produce the ordered operation list for every non-skipped node.
    pub fn plan(&self, gated: &GatedGraph) -> Result<Plan> {
        let mut plan = Plan::default();

        for wave in gated.graph().waves() {
            let mut actions = Vec::new();
            for id in wave {
                let Some(node) = gated.node(id) else { continue };

                if node.is_skipped() {
                    plan.skipped.push(SkippedNode {
                        node: node.id.clone(),
                        kind: node.kind.clone(),
                        reason: node
                            .skip_reason
                            .clone()
                            .unwrap_or_else(|| "condition is false".to_string()),
                    });
                    continue;
                }
                if node.is_failed() {
                    plan.invalid.push(InvalidNode {
                        node: node.id.clone(),
                        kind: node.kind.clone(),
                        error: node
                            .error
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    });
                    continue;
                }

                let desired = gated.resolve(id, self.snapshot)?;
                let hash = content_hash(&node.kind, &node.api_version, &desired);
                let previous_hash = self
                    .snapshot
                    .get(id)
                    .filter(|r| r.exists)
                    .map(|r| r.hash.clone());

                let action_type = match &previous_hash {
                    None => ActionType::Create,
                    Some(previous) if *previous == hash => ActionType::NoOp,
                    Some(_) => ActionType::Update,
                };
                debug!(node = %id, action = %action_type, "Planned action");

                actions.push(Action {
                    node: node.id.clone(),
                    action_type,
                    kind: node.kind.clone(),
                    api_version: node.api_version.clone(),
                    pending: desired.pending_refs(),
                    desired,
                    hash,
                    previous_hash,
                    dependencies: gated.graph().dependencies(id).to_vec(),
                });
            }
            if !actions.is_empty() {
                plan.waves.push(actions);
            }
        }

        info!(summary = %plan.summary(), "Plan computed");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RemoteRecord;
    use edgeflow_core::{Expr, ResourceDef, Template, prepare};
    use serde_json::json;

    fn template() -> Template {
        Template {
            resources: vec![
                ResourceDef::new("profile", "Microsoft.Cdn/profiles", "2024-02-01")
                    .with_property("sku", Expr::lit("Standard_AzureFrontDoor"))
                    .with_outputs(&["id"]),
                ResourceDef::new("endpoint", "Microsoft.Cdn/profiles/afdEndpoints", "2024-02-01")
                    .with_parent("profile")
                    .with_property("profileId", Expr::reference("profile", "id")),
                ResourceDef::new("diag", "Microsoft.Insights/diagnosticSettings", "2021-05-01")
                    .with_condition(Expr::lit(false)),
            ],
            ..Template::new()
        }
    }

    #[test]
    fn test_empty_snapshot_creates_everything() {
        let gated = prepare(&template(), &Default::default()).unwrap();
        let plan = ConvergencePlanner::new(&RemoteSnapshot::new())
            .plan(&gated)
            .unwrap();

        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0][0].node, "profile");
        assert_eq!(plan.waves[1][0].node, "endpoint");
        assert_eq!(plan.skipped[0].node, "diag");
        assert_eq!(
            plan.summary().to_string(),
            "2 to create, 0 to update, 0 unchanged, 1 skipped"
        );
        assert_eq!(
            plan.action("endpoint").unwrap().pending,
            vec![edgeflow_core::FieldRef::new("profile", "id")]
        );
    }

    #[test]
    fn test_replanning_against_recorded_state_is_all_noop() {
        let gated = prepare(&template(), &Default::default()).unwrap();

        // Record what a successful run would have committed.
        let mut snapshot = RemoteSnapshot::new();
        let mut outputs = crate::provider::ResultProperties::new();
        outputs.insert("id".into(), json!("/local/profiles/profile"));
        let profile = gated.resolve("profile", &snapshot).unwrap();
        snapshot.records.insert(
            "profile".into(),
            RemoteRecord::new(
                "Microsoft.Cdn/profiles",
                "2024-02-01",
                profile.to_json().unwrap(),
                content_hash("Microsoft.Cdn/profiles", "2024-02-01", &profile),
            )
            .with_outputs(outputs),
        );
        let endpoint = gated.resolve("endpoint", &snapshot).unwrap();
        snapshot.records.insert(
            "endpoint".into(),
            RemoteRecord::new(
                "Microsoft.Cdn/profiles/afdEndpoints",
                "2024-02-01",
                endpoint.to_json().unwrap(),
                content_hash("Microsoft.Cdn/profiles/afdEndpoints", "2024-02-01", &endpoint),
            ),
        );

        let planner = ConvergencePlanner::new(&snapshot);
        let first = planner.plan(&gated).unwrap();
        let second = planner.plan(&gated).unwrap();

        assert!(!first.has_changes());
        assert_eq!(first, second);
        assert!(second.actions().all(|a| a.action_type == ActionType::NoOp));
    }

    #[test]
    fn test_changed_properties_plan_update() {
        let gated = prepare(&template(), &Default::default()).unwrap();
        let mut snapshot = RemoteSnapshot::new();
        snapshot.records.insert(
            "profile".into(),
            RemoteRecord::new(
                "Microsoft.Cdn/profiles",
                "2024-02-01",
                json!({"sku": "Premium_AzureFrontDoor"}),
                "stale-hash",
            ),
        );

        let plan = ConvergencePlanner::new(&snapshot).plan(&gated).unwrap();
        assert_eq!(plan.action("profile").unwrap().action_type, ActionType::Update);
        assert_eq!(plan.action("endpoint").unwrap().action_type, ActionType::Create);
    }

    #[test]
    fn test_literal_change_beside_pending_output_plans_update() {
        let with_prefix = |prefix: &str| {
            let mut template = template();
            template.resources[1] = template.resources[1].clone().with_property(
                "routeName",
                Expr::Concat(vec![Expr::lit(prefix), Expr::reference("profile", "id")]),
            );
            prepare(&template, &Default::default()).unwrap()
        };

        let before = with_prefix("a-");
        let mut snapshot = RemoteSnapshot::new();
        let endpoint = before.resolve("endpoint", &snapshot).unwrap();
        snapshot.records.insert(
            "endpoint".into(),
            RemoteRecord::new(
                "Microsoft.Cdn/profiles/afdEndpoints",
                "2024-02-01",
                json!({}),
                content_hash("Microsoft.Cdn/profiles/afdEndpoints", "2024-02-01", &endpoint),
            ),
        );
        let unchanged = ConvergencePlanner::new(&snapshot).plan(&before).unwrap();
        assert_eq!(unchanged.action("endpoint").unwrap().action_type, ActionType::NoOp);

        let after = with_prefix("b-");
        let plan = ConvergencePlanner::new(&snapshot).plan(&after).unwrap();
        assert_eq!(plan.action("endpoint").unwrap().action_type, ActionType::Update);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a = Value::from_json(&json!({"x": 1, "y": [true]}));
        let b = Value::from_json(&json!({"y": [true], "x": 1}));
        assert_eq!(content_hash("k", "v", &a), content_hash("k", "v", &b));
        assert_ne!(content_hash("k", "v", &a), content_hash("k", "v2", &a));
    }
}
