//! The abstract template document

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::parameter::{Parameter, RecordType};
use super::resource::ResourceDef;
use crate::expr::Expr;

/// Raw parameter values as supplied by the caller.
pub type RawParameters = IndexMap<String, serde_json::Value>;

/// An already-parsed declarative template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub parameters: IndexMap<String, Parameter>,

    /// Named record types
    #[serde(default)]
    pub types: IndexMap<String, RecordType>,

    /// Derived values, evaluated in declaration order
    #[serde(default)]
    pub variables: IndexMap<String, Expr>,

    /// Resources in declaration order
    #[serde(default)]
    pub resources: Vec<ResourceDef>,

    #[serde(default)]
    pub outputs: IndexMap<String, Expr>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.id == id)
    }
}

/// Wrapper accepted by parameter files: either a bare map or
/// `{"parameters": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParameterFile {
    Wrapped { parameters: RawParameters },
    Bare(RawParameters),
}

impl ParameterFile {
    pub fn into_values(self) -> RawParameters {
        match self {
            Self::Wrapped { parameters } => parameters,
            Self::Bare(values) => values,
        }
    }
}
