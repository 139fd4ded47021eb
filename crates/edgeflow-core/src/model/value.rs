//! Evaluated values
//!
//! Expressions evaluate to a [`Value`] tree rather than plain JSON so that two
//! markers can travel through properties untouched: `Unset` (an optional read
//! found nothing) and `Pending` (a provider-assigned field that only exists
//! once its owning resource is provisioned).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EvaluationError;

/// Reference to a field of another resource node (`node.field`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub node: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            field: field.into(),
        }
    }

    /// Symbolic form used in hashes and display (`${node.field}`).
    pub fn placeholder(&self) -> String {
        format!("${{{}.{}}}", self.node, self.field)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Scalar(serde_json::Value),
    Object(IndexMap<String, Value>),
    List(Vec<Value>),
    Unset,
    Pending(FieldRef),
    /// String built by `concat` while some of its parts are still pending.
    /// Parts are resolved strings and `Pending` markers, in order.
    PendingText(Vec<Value>),
}

impl Value {
    pub fn null() -> Self {
        Self::Scalar(serde_json::Value::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(serde_json::Value::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::Scalar(serde_json::Value::Bool(b))
    }

    /// Lift plain JSON into the value tree.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            other => Self::Scalar(other.clone()),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_) | Self::PendingText(_))
    }

    /// First provider-assigned field this value waits on.
    pub fn first_pending(&self) -> Option<FieldRef> {
        self.pending_refs().into_iter().next()
    }

    /// True when no `Pending` marker remains anywhere in the tree.
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Pending(_) | Self::PendingText(_) => false,
            Self::Object(map) => map.values().all(Value::is_resolved),
            Self::List(items) => items.iter().all(Value::is_resolved),
            Self::Scalar(_) | Self::Unset => true,
        }
    }

    /// Every pending reference in the tree, in encounter order.
    pub fn pending_refs(&self) -> Vec<FieldRef> {
        let mut refs = Vec::new();
        self.collect_pending(&mut refs);
        refs
    }

    fn collect_pending(&self, out: &mut Vec<FieldRef>) {
        match self {
            Self::Pending(field_ref) => {
                if !out.contains(field_ref) {
                    out.push(field_ref.clone());
                }
            }
            Self::Object(map) => map.values().for_each(|v| v.collect_pending(out)),
            Self::List(items) | Self::PendingText(items) => {
                items.iter().for_each(|v| v.collect_pending(out))
            }
            Self::Scalar(_) | Self::Unset => {}
        }
    }

    /// Truthiness used by conditions: `Unset`, null, false, 0, "" and empty
    /// collections are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Unset | Self::Pending(_) | Self::PendingText(_) => false,
            Self::Object(map) => !map.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Scalar(json) => match json {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Array(a) => !a.is_empty(),
                serde_json::Value::Object(o) => !o.is_empty(),
            },
        }
    }

    /// `empty()` semantics: unset, null, "" and empty collections.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Unset => true,
            Self::Pending(_) | Self::PendingText(_) => false,
            Self::Object(map) => map.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Scalar(json) => match json {
                serde_json::Value::Null => true,
                serde_json::Value::String(s) => s.is_empty(),
                serde_json::Value::Array(a) => a.is_empty(),
                serde_json::Value::Object(o) => o.is_empty(),
                _ => false,
            },
        }
    }

    /// Look up a single member of an object value.
    pub fn member(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Render to JSON. `Unset` object members are dropped, `Unset` list
    /// elements become null, and any remaining `Pending` is an error.
    pub fn to_json(&self) -> Result<serde_json::Value, EvaluationError> {
        match self {
            Self::Scalar(json) => Ok(json.clone()),
            Self::Unset => Ok(serde_json::Value::Null),
            Self::Pending(field_ref) => Err(EvaluationError::Unresolved(field_ref.to_string())),
            Self::PendingText(_) => Err(EvaluationError::Unresolved(
                self.first_pending().map(|r| r.to_string()).unwrap_or_default(),
            )),
            Self::List(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Self::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    if value.is_unset() {
                        continue;
                    }
                    out.insert(key.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
        }
    }

    /// Text of a pending string with each pending part written as its
    /// placeholder, e.g. `https://${endpoint.hostName}/`.
    fn template_text(&self) -> String {
        match self {
            Self::PendingText(parts) => parts.iter().map(Value::template_text).collect(),
            Self::Pending(field_ref) => field_ref.placeholder(),
            Self::Scalar(serde_json::Value::String(s)) => s.clone(),
            other => other.canonical(),
        }
    }

    /// Deterministic text used for content hashing: object keys sorted,
    /// pending references written as their placeholder.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Scalar(json) => write_canonical_json(json, out),
            Self::Unset => out.push_str("null"),
            Self::Pending(field_ref) => {
                out.push_str(&serde_json::Value::String(field_ref.placeholder()).to_string());
            }
            Self::PendingText(_) => {
                out.push_str(&serde_json::Value::String(self.template_text()).to_string());
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Self::Object(map) => {
                let mut keys: Vec<&String> = map
                    .iter()
                    .filter(|(_, v)| !v.is_unset())
                    .map(|(k, _)| k)
                    .collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                    out.push(':');
                    map[key.as_str()].write_canonical(out);
                }
                out.push('}');
            }
        }
    }
}

fn write_canonical_json(json: &serde_json::Value, out: &mut String) {
    match json {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical_json(&map[key.as_str()], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(&json)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "(unset)"),
            Self::Pending(field_ref) => write!(f, "(known after apply: {field_ref})"),
            Self::PendingText(_) => write!(f, "(known after apply: {})", self.template_text()),
            Self::Scalar(serde_json::Value::String(s)) => write!(f, "{s}"),
            other => write!(f, "{}", other.canonical()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json_drops_unset_members() {
        let mut map = IndexMap::new();
        map.insert("name".to_string(), Value::string("edge"));
        map.insert("workspace".to_string(), Value::Unset);
        let value = Value::Object(map);

        assert_eq!(value.to_json().unwrap(), json!({"name": "edge"}));
    }

    #[test]
    fn test_to_json_rejects_pending() {
        let value = Value::List(vec![Value::Pending(FieldRef::new("profile", "id"))]);
        let err = value.to_json().unwrap_err();
        assert_eq!(err, EvaluationError::Unresolved("profile.id".into()));
    }

    #[test]
    fn test_canonical_is_key_order_independent() {
        let a = Value::from_json(&json!({"b": 1, "a": {"y": true, "x": [1, 2]}}));
        let mut inner = IndexMap::new();
        inner.insert("x".to_string(), Value::from_json(&json!([1, 2])));
        inner.insert("y".to_string(), Value::bool(true));
        let mut outer = IndexMap::new();
        outer.insert("a".to_string(), Value::Object(inner));
        outer.insert("b".to_string(), Value::from_json(&json!(1)));
        let b = Value::Object(outer);

        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_pending_text_keeps_literal_parts() {
        let a = Value::PendingText(vec![
            Value::string("a-"),
            Value::Pending(FieldRef::new("endpoint", "hostName")),
        ]);
        let b = Value::PendingText(vec![
            Value::string("b-"),
            Value::Pending(FieldRef::new("endpoint", "hostName")),
        ]);

        assert_eq!(a.canonical(), "\"a-${endpoint.hostName}\"");
        assert_ne!(a.canonical(), b.canonical());
        assert!(a.is_pending());
        assert_eq!(a.pending_refs(), vec![FieldRef::new("endpoint", "hostName")]);
        assert_eq!(
            a.to_json().unwrap_err(),
            EvaluationError::Unresolved("endpoint.hostName".into())
        );
    }

    #[test]
    fn test_empty_value() {
        assert!(Value::Unset.is_empty_value());
        assert!(Value::string("").is_empty_value());
        assert!(Value::from_json(&json!([])).is_empty_value());
        assert!(!Value::string("ws").is_empty_value());
        assert!(!Value::Pending(FieldRef::new("a", "b")).is_empty_value());
    }
}
