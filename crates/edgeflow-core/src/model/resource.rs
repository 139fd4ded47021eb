//! Resource definitions as declared in a template

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// A resource declared in a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Unique identifier within the template
    pub id: String,

    /// Resource kind (e.g., "Microsoft.Cdn/profiles")
    pub kind: String,

    /// API shape the properties are written against
    pub api_version: String,

    /// Parent resource; a child is scoped to (and depends on) its parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Explicit dependencies in addition to inferred ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Inclusion predicate; absent means always included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,

    /// Desired properties
    #[serde(default)]
    pub properties: IndexMap<String, Expr>,

    /// Fields assigned by the provider once the resource is provisioned
    /// (e.g., "id", "hostName")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

impl ResourceDef {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            api_version: api_version.into(),
            parent: None,
            depends_on: Vec::new(),
            condition: None,
            properties: IndexMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Expr) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether `field` is assigned by the provider rather than declared.
    pub fn is_output(&self, field: &str) -> bool {
        self.outputs.iter().any(|o| o == field)
    }

    /// Whether `field` names something other resources may read.
    pub fn exposes(&self, field: &str) -> bool {
        self.is_output(field) || self.properties.contains_key(field)
    }
}
