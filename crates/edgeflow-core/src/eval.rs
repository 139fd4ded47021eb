//! Expression evaluation
//!
//! Evaluation is pure: the same parameters, variables and resource scope
//! always produce the same [`Value`]. Provider-assigned fields that are not
//! known yet flow through as [`Value::Pending`]; any operation over a pending
//! operand yields that pending value so the whole property stays deferred.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::EvaluationError;
use crate::expr::Expr;
use crate::model::{FieldRef, Template, Value};
use crate::schema::ParameterSet;

/// Result of reading `node.field` from the resource scope.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRead {
    Value(Value),
    /// The owning node was skipped by its condition
    Skipped,
}

/// Resource fields visible to an expression.
pub trait Scope {
    fn read(&self, node: &str, field: &str) -> Result<FieldRead, EvaluationError>;
}

/// Evaluated template variables, in declaration order.
pub type Variables = IndexMap<String, Value>;

/// `map` element bindings, innermost first.
struct Binding<'b> {
    name: &'b str,
    value: &'b Value,
    parent: Option<&'b Binding<'b>>,
}

impl Binding<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        if self.name == name {
            return Some(self.value);
        }
        self.parent.and_then(|p| p.lookup(name))
    }
}

pub struct Evaluator<'a> {
    params: &'a ParameterSet,
    variables: &'a Variables,
    scope: Option<&'a dyn Scope>,
}

impl<'a> Evaluator<'a> {
    /// Evaluator without access to resources.
    pub fn new(params: &'a ParameterSet, variables: &'a Variables) -> Self {
        Self {
            params,
            variables,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: &'a dyn Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvaluationError> {
        self.eval(expr, None)
    }

    /// Evaluate an inclusion predicate. Unset reads as false; a value that is
    /// only known after provisioning is an error.
    pub fn condition(&self, expr: &Expr) -> Result<bool, EvaluationError> {
        let value = self.evaluate(expr)?;
        truth(&value)
    }

    fn eval(&self, expr: &Expr, bindings: Option<&Binding<'_>>) -> Result<Value, EvaluationError> {
        match expr {
            Expr::Lit(json) => Ok(Value::from_json(json)),

            Expr::Param(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UnknownParameter(name.clone())),

            Expr::Var(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UnknownVariable(name.clone())),

            Expr::Item(name) => bindings
                .and_then(|b| b.lookup(name))
                .cloned()
                .ok_or_else(|| EvaluationError::UnboundItem(name.clone())),

            Expr::Ref {
                node,
                field,
                optional,
            } => {
                let scope = self
                    .scope
                    .ok_or_else(|| EvaluationError::Unresolved(FieldRef::new(node, field).to_string()))?;
                match scope.read(node, field)? {
                    FieldRead::Value(value) => Ok(value),
                    FieldRead::Skipped if *optional => Ok(Value::Unset),
                    FieldRead::Skipped => Err(EvaluationError::SkippedDependency {
                        node: node.clone(),
                        field: field.clone(),
                    }),
                }
            }

            Expr::Get { base, path } => {
                let base = self.eval(base, bindings)?;
                access(base, path, true)
            }

            Expr::Opt { base, path } => {
                let base = self.eval(base, bindings)?;
                access(base, path, false)
            }

            Expr::Concat(parts) => {
                let values = parts
                    .iter()
                    .map(|p| self.eval(p, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.iter().any(Value::is_unset) {
                    return Ok(Value::Unset);
                }
                if values.iter().any(Value::is_pending) {
                    return pending_text(values);
                }
                let mut out = String::new();
                for value in &values {
                    out.push_str(&stringify(value)?);
                }
                Ok(Value::string(out))
            }

            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond, bindings)?;
                // The branch is unknown until the value is provisioned.
                if cond.is_pending() {
                    return Ok(cond);
                }
                if cond.is_truthy() {
                    self.eval(then, bindings)
                } else {
                    self.eval(otherwise, bindings)
                }
            }

            Expr::Coalesce(options) => {
                for option in options {
                    let value = self.eval(option, bindings)?;
                    if !value.is_unset() && value != Value::null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Unset)
            }

            Expr::Eq(left, right) | Expr::Ne(left, right) => {
                let left = self.eval(left, bindings)?;
                let right = self.eval(right, bindings)?;
                if let Some(pending) = first_pending([&left, &right]) {
                    return Ok(pending);
                }
                let equal = left == right;
                Ok(Value::bool(if matches!(expr, Expr::Eq(..)) {
                    equal
                } else {
                    !equal
                }))
            }

            Expr::Not(inner) => {
                let value = self.eval(inner, bindings)?;
                if value.is_pending() {
                    return Ok(value);
                }
                Ok(Value::bool(!value.is_truthy()))
            }

            Expr::And(items) => {
                for item in items {
                    let value = self.eval(item, bindings)?;
                    if value.is_pending() {
                        return Ok(value);
                    }
                    if !value.is_truthy() {
                        return Ok(Value::bool(false));
                    }
                }
                Ok(Value::bool(true))
            }

            Expr::Or(items) => {
                for item in items {
                    let value = self.eval(item, bindings)?;
                    if value.is_pending() {
                        return Ok(value);
                    }
                    if value.is_truthy() {
                        return Ok(Value::bool(true));
                    }
                }
                Ok(Value::bool(false))
            }

            Expr::Empty(inner) => {
                let value = self.eval(inner, bindings)?;
                if value.is_pending() {
                    return Ok(value);
                }
                Ok(Value::bool(value.is_empty_value()))
            }

            Expr::Map {
                source,
                binding,
                body,
            } => {
                let source = self.eval(source, bindings)?;
                let items = match source {
                    Value::List(items) => items,
                    Value::Unset | Value::Pending(_) | Value::PendingText(_) => return Ok(source),
                    Value::Scalar(serde_json::Value::Null) => return Ok(Value::Unset),
                    other => {
                        return Err(EvaluationError::TypeMismatch {
                            expected: "list".into(),
                            found: kind_of(&other).into(),
                        });
                    }
                };
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    let frame = Binding {
                        name: binding,
                        value: item,
                        parent: bindings,
                    };
                    out.push(self.eval(body, Some(&frame))?);
                }
                Ok(Value::List(out))
            }

            Expr::Object(fields) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for (key, field) in fields {
                    out.insert(key.clone(), self.eval(field, bindings)?);
                }
                Ok(Value::Object(out))
            }

            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, bindings))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
        }
    }
}

/// Evaluate template variables once, in declaration order. A variable may
/// read parameters and earlier variables; it may never read a resource.
pub fn evaluate_variables(
    template: &Template,
    params: &ParameterSet,
) -> Result<Variables, EvaluationError> {
    let mut variables = Variables::new();
    for (name, expr) in &template.variables {
        if let Some((node, _, _)) = expr.references().first() {
            return Err(EvaluationError::ResourceInVariable {
                variable: name.clone(),
                node: node.to_string(),
            });
        }
        let value = Evaluator::new(params, &variables).evaluate(expr)?;
        debug!(variable = %name, "Variable evaluated");
        variables.insert(name.clone(), value);
    }
    Ok(variables)
}

fn truth(value: &Value) -> Result<bool, EvaluationError> {
    if value.is_pending() {
        let field = value.first_pending().map(|r| r.to_string()).unwrap_or_default();
        return Err(EvaluationError::PendingCondition(field));
    }
    Ok(value.is_truthy())
}

/// Join `concat` parts while some are pending: resolved parts are rendered to
/// text, adjacent text is merged, pending parts are kept in place.
fn pending_text(values: Vec<Value>) -> Result<Value, EvaluationError> {
    let mut parts: Vec<Value> = Vec::new();
    let mut text = String::new();
    for value in values {
        let pieces = match value {
            Value::PendingText(inner) => inner,
            other => vec![other],
        };
        for piece in pieces {
            if piece.is_pending() {
                if !text.is_empty() {
                    parts.push(Value::string(std::mem::take(&mut text)));
                }
                parts.push(piece);
            } else {
                text.push_str(&stringify(&piece)?);
            }
        }
    }
    if !text.is_empty() {
        parts.push(Value::string(text));
    }
    Ok(Value::PendingText(parts))
}

fn first_pending<'v>(values: impl IntoIterator<Item = &'v Value>) -> Option<Value> {
    values.into_iter().find(|v| v.is_pending()).cloned()
}

/// Member access shared by `get` (required) and `opt`.
fn access(base: Value, path: &[String], required: bool) -> Result<Value, EvaluationError> {
    let mut current = base;
    for (depth, segment) in path.iter().enumerate() {
        current = match current {
            Value::Pending(_) | Value::PendingText(_) => return Ok(current),
            Value::Object(mut map) => match map.shift_remove(segment) {
                Some(Value::Unset) | None if !required => return Ok(Value::Unset),
                Some(Value::Unset) | None => {
                    return Err(EvaluationError::MissingField {
                        path: path[..=depth].join("."),
                    });
                }
                Some(next) => next,
            },
            Value::Unset | Value::Scalar(serde_json::Value::Null) if !required => {
                return Ok(Value::Unset);
            }
            Value::Unset | Value::Scalar(serde_json::Value::Null) => {
                return Err(EvaluationError::MissingField {
                    path: path[..=depth].join("."),
                });
            }
            other => {
                return Err(EvaluationError::TypeMismatch {
                    expected: "object".into(),
                    found: kind_of(&other).into(),
                });
            }
        };
    }
    Ok(current)
}

fn stringify(value: &Value) -> Result<String, EvaluationError> {
    match value {
        Value::Scalar(serde_json::Value::String(s)) => Ok(s.clone()),
        Value::Scalar(json @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
            Ok(json.to_string())
        }
        other => Err(EvaluationError::TypeMismatch {
            expected: "string".into(),
            found: kind_of(other).into(),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Scalar(serde_json::Value::Null) => "null",
        Value::Scalar(serde_json::Value::Bool(_)) => "bool",
        Value::Scalar(serde_json::Value::Number(_)) => "number",
        Value::Scalar(serde_json::Value::String(_)) => "string",
        Value::Scalar(serde_json::Value::Array(_)) | Value::List(_) => "list",
        Value::Scalar(serde_json::Value::Object(_)) | Value::Object(_) => "object",
        Value::Unset => "unset",
        Value::Pending(_) | Value::PendingText(_) => "pending value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Parameter, TypeRef};
    use crate::schema::validate_parameters;
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeScope {
        fields: HashMap<(&'static str, &'static str), FieldRead>,
    }

    impl Scope for FakeScope {
        fn read(&self, node: &str, field: &str) -> Result<FieldRead, EvaluationError> {
            self.fields
                .iter()
                .find(|((n, f), _)| *n == node && *f == field)
                .map(|(_, read)| read.clone())
                .ok_or_else(|| EvaluationError::Unresolved(format!("{node}.{field}")))
        }
    }

    fn params(values: serde_json::Value) -> ParameterSet {
        let mut template = Template::new();
        template.parameters.insert(
            "skuName".into(),
            Parameter::of_type(TypeRef::String).with_default(json!("Standard_AzureFrontDoor")),
        );
        template.parameters.insert(
            "ruleSets".into(),
            Parameter::of_type(TypeRef::Array(Box::new(TypeRef::Object))).with_default(json!([])),
        );
        template.parameters.insert(
            "diagnostics".into(),
            Parameter::of_type(TypeRef::Object).nullable(),
        );
        validate_parameters(&template, &serde_json::from_value(values).unwrap()).unwrap()
    }

    fn rule_set_transform() -> Expr {
        Expr::map(
            Expr::param("ruleSets"),
            "rs",
            Expr::object([
                ("ruleSetType", Expr::get(Expr::item("rs"), &["name"])),
                ("ruleSetVersion", Expr::get(Expr::item("rs"), &["version"])),
                ("ruleSetAction", Expr::lit("Block")),
                ("ruleGroupOverrides", Expr::List(vec![])),
                ("exclusions", Expr::List(vec![])),
            ]),
        )
    }

    #[test]
    fn test_map_preserves_order_and_constant_action() {
        let params = params(json!({
            "ruleSets": [{"name": "A", "version": "v1"}, {"name": "B", "version": "v2"}]
        }));
        let vars = Variables::new();
        let value = Evaluator::new(&params, &vars)
            .evaluate(&rule_set_transform())
            .unwrap();

        assert_eq!(
            value.to_json().unwrap(),
            json!([
                {"ruleSetType": "A", "ruleSetVersion": "v1", "ruleSetAction": "Block",
                 "ruleGroupOverrides": [], "exclusions": []},
                {"ruleSetType": "B", "ruleSetVersion": "v2", "ruleSetAction": "Block",
                 "ruleGroupOverrides": [], "exclusions": []},
            ])
        );
    }

    #[test]
    fn test_premium_gate_yields_empty_list() {
        let expr = Expr::if_else(
            Expr::eq(Expr::param("skuName"), Expr::lit("Premium_AzureFrontDoor")),
            rule_set_transform(),
            Expr::List(vec![]),
        );
        let params = params(json!({
            "skuName": "Standard_AzureFrontDoor",
            "ruleSets": [{"name": "A", "version": "v1"}, {"name": "B", "version": "v2"}]
        }));
        let vars = Variables::new();
        let value = Evaluator::new(&params, &vars).evaluate(&expr).unwrap();

        assert_eq!(value, Value::List(vec![]));
    }

    #[test]
    fn test_optional_access_short_circuits() {
        let params = params(json!({}));
        let vars = Variables::new();
        let eval = Evaluator::new(&params, &vars);

        let opt = Expr::opt(Expr::param("diagnostics"), &["logWorkspaceId", "inner"]);
        assert_eq!(eval.evaluate(&opt).unwrap(), Value::Unset);

        let get = Expr::get(Expr::param("diagnostics"), &["logWorkspaceId"]);
        assert_eq!(
            eval.evaluate(&get).unwrap_err(),
            EvaluationError::MissingField {
                path: "logWorkspaceId".into()
            }
        );
    }

    #[test]
    fn test_untaken_branch_is_not_evaluated() {
        let params = params(json!({}));
        let vars = Variables::new();
        let expr = Expr::if_else(
            Expr::lit(true),
            Expr::lit("ok"),
            Expr::get(Expr::param("diagnostics"), &["missing"]),
        );

        let value = Evaluator::new(&params, &vars).evaluate(&expr).unwrap();
        assert_eq!(value, Value::string("ok"));
    }

    #[test]
    fn test_concat_and_pending() {
        let params = params(json!({}));
        let vars = Variables::new();
        let scope = FakeScope {
            fields: HashMap::from([
                (("profile", "name"), FieldRead::Value(Value::string("edge"))),
                (
                    ("endpoint", "hostName"),
                    FieldRead::Value(Value::Pending(FieldRef::new("endpoint", "hostName"))),
                ),
                (("diag", "name"), FieldRead::Skipped),
            ]),
        };
        let eval = Evaluator::new(&params, &vars).with_scope(&scope);

        let name = Expr::Concat(vec![Expr::reference("profile", "name"), Expr::lit("-ep")]);
        assert_eq!(eval.evaluate(&name).unwrap(), Value::string("edge-ep"));

        let url = Expr::Concat(vec![
            Expr::lit("https://"),
            Expr::reference("endpoint", "hostName"),
            Expr::lit("/"),
            Expr::lit("health"),
        ]);
        assert_eq!(
            eval.evaluate(&url).unwrap(),
            Value::PendingText(vec![
                Value::string("https://"),
                Value::Pending(FieldRef::new("endpoint", "hostName")),
                Value::string("/health"),
            ])
        );

        let nested = Expr::Concat(vec![url.clone(), Expr::lit("?v=1")]);
        assert_eq!(
            eval.evaluate(&nested).unwrap().canonical(),
            "\"https://${endpoint.hostName}/health?v=1\""
        );

        let cond = Expr::eq(Expr::reference("endpoint", "hostName"), Expr::lit("x"));
        assert_eq!(
            eval.condition(&cond).unwrap_err(),
            EvaluationError::PendingCondition("endpoint.hostName".into())
        );

        assert_eq!(
            eval.evaluate(&Expr::optional_reference("diag", "name")).unwrap(),
            Value::Unset
        );
        assert!(matches!(
            eval.evaluate(&Expr::reference("diag", "name")).unwrap_err(),
            EvaluationError::SkippedDependency { .. }
        ));
    }

    #[test]
    fn test_ternary_over_pending_value_stays_pending() {
        let params = params(json!({}));
        let vars = Variables::new();
        let host = FieldRef::new("endpoint", "hostName");
        let scope = FakeScope {
            fields: HashMap::from([(
                ("endpoint", "hostName"),
                FieldRead::Value(Value::Pending(host.clone())),
            )]),
        };
        let eval = Evaluator::new(&params, &vars).with_scope(&scope);

        let expr = Expr::if_else(
            Expr::eq(Expr::reference("endpoint", "hostName"), Expr::lit("")),
            Expr::lit("none"),
            Expr::reference("endpoint", "hostName"),
        );
        assert_eq!(eval.evaluate(&expr).unwrap(), Value::Pending(host));

        // As an inclusion predicate the same read is still rejected.
        assert_eq!(
            eval.condition(&Expr::eq(Expr::reference("endpoint", "hostName"), Expr::lit("")))
                .unwrap_err(),
            EvaluationError::PendingCondition("endpoint.hostName".into())
        );
    }

    #[test]
    fn test_coalesce_and_boolean_short_circuit() {
        let params = params(json!({}));
        let vars = Variables::new();
        let eval = Evaluator::new(&params, &vars);

        let coalesce = Expr::Coalesce(vec![
            Expr::opt(Expr::param("diagnostics"), &["name"]),
            Expr::lit(serde_json::Value::Null),
            Expr::lit("default"),
        ]);
        assert_eq!(eval.evaluate(&coalesce).unwrap(), Value::string("default"));

        // The second operand would fail if evaluated.
        let and = Expr::And(vec![
            Expr::lit(false),
            Expr::get(Expr::param("diagnostics"), &["missing"]),
        ]);
        assert_eq!(eval.evaluate(&and).unwrap(), Value::bool(false));
    }

    #[test]
    fn test_variables_in_declaration_order() {
        let mut template = Template::new();
        template
            .variables
            .insert("prefix".into(), Expr::lit("edge"));
        template.variables.insert(
            "profileName".into(),
            Expr::Concat(vec![Expr::var("prefix"), Expr::lit("-profile")]),
        );
        let params = ParameterSet::default();

        let vars = evaluate_variables(&template, &params).unwrap();
        assert_eq!(vars["profileName"], Value::string("edge-profile"));

        template
            .variables
            .insert("early".into(), Expr::var("late"));
        template.variables.insert("late".into(), Expr::lit(1));
        assert_eq!(
            evaluate_variables(&template, &params).unwrap_err(),
            EvaluationError::UnknownVariable("late".into())
        );
    }

    #[test]
    fn test_variables_cannot_read_resources() {
        let mut template = Template::new();
        template
            .variables
            .insert("id".into(), Expr::reference("profile", "id"));

        assert_eq!(
            evaluate_variables(&template, &ParameterSet::default()).unwrap_err(),
            EvaluationError::ResourceInVariable {
                variable: "id".into(),
                node: "profile".into(),
            }
        );
    }
}
