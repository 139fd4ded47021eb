//! Parameter and type declarations

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a parameter or record field.
///
/// Written in documents as a string: `string`, `int`, `bool`, `object`,
/// `any`, `array`, `<T>[]`, or the name of a record declared under `types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    String,
    Int,
    Bool,
    Object,
    Any,
    Array(Box<TypeRef>),
    Named(String),
}

impl TryFrom<String> for TypeRef {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("type name cannot be empty".to_string());
        }
        if let Some(element) = raw.strip_suffix("[]") {
            return Ok(Self::Array(Box::new(Self::try_from(element.to_string())?)));
        }
        Ok(match raw {
            "string" => Self::String,
            "int" => Self::Int,
            "bool" => Self::Bool,
            "object" => Self::Object,
            "any" => Self::Any,
            "array" => Self::Array(Box::new(Self::Any)),
            name if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                Self::Named(name.to_string())
            }
            other => return Err(format!("invalid type name: {other}")),
        })
    }
}

impl From<TypeRef> for String {
    fn from(ty: TypeRef) -> Self {
        ty.to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::String => write!(f, "string"),
            TypeRef::Int => write!(f, "int"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Object => write!(f, "object"),
            TypeRef::Any => write!(f, "any"),
            TypeRef::Array(element) => write!(f, "{element}[]"),
            TypeRef::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub ty: TypeRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Absent values are allowed and read as unset.
    #[serde(default)]
    pub nullable: bool,

    /// Allowed-value set; empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn of_type(ty: TypeRef) -> Self {
        Self {
            ty,
            default: None,
            nullable: false,
            allowed: Vec::new(),
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed(mut self, allowed: Vec<serde_json::Value>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A structured record declared under `types`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    pub fields: IndexMap<String, FieldDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    #[serde(rename = "type")]
    pub ty: TypeRef,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<serde_json::Value>,
}

impl FieldDecl {
    pub fn required(ty: TypeRef) -> Self {
        Self {
            ty,
            nullable: false,
            allowed: Vec::new(),
        }
    }

    pub fn optional(ty: TypeRef) -> Self {
        Self {
            nullable: true,
            ..Self::required(ty)
        }
    }
}
