//! Expression grammar
//!
//! A fixed set of forms: literals, references, boolean conditions and
//! list/map transforms. Each form is written as a single-key object, e.g.
//! `{"param": "skuName"}` or `{"if": {"cond": .., "then": .., "else": ..}}`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal JSON value.
    Lit(serde_json::Value),
    /// Validated parameter value.
    Param(String),
    /// Derived template variable.
    Var(String),
    /// Element bound by the nearest enclosing `map` with this name.
    Item(String),
    /// A field of another resource: a computed property or a
    /// provider-assigned output.
    Ref {
        node: String,
        field: String,
        /// Optional reads of a skipped resource yield unset instead of failing.
        #[serde(default)]
        optional: bool,
    },
    /// Required member access; a missing segment is an error.
    Get { base: Box<Expr>, path: Vec<String> },
    /// Optional member access; a missing base or segment yields unset.
    Opt { base: Box<Expr>, path: Vec<String> },
    /// String interpolation.
    Concat(Vec<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        otherwise: Box<Expr>,
    },
    /// First operand that is neither unset nor null.
    Coalesce(Vec<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// True for unset, null, "" and empty collections.
    Empty(Box<Expr>),
    /// List transform: evaluates `body` once per element of `source`, with
    /// the element bound to `as`.
    Map {
        source: Box<Expr>,
        #[serde(rename = "as")]
        binding: String,
        body: Box<Expr>,
    },
    Object(IndexMap<String, Expr>),
    List(Vec<Expr>),
}

impl Expr {
    pub fn lit(value: impl Into<serde_json::Value>) -> Self {
        Self::Lit(value.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn item(name: impl Into<String>) -> Self {
        Self::Item(name.into())
    }

    pub fn reference(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Ref {
            node: node.into(),
            field: field.into(),
            optional: false,
        }
    }

    pub fn optional_reference(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Ref {
            node: node.into(),
            field: field.into(),
            optional: true,
        }
    }

    pub fn get(base: Expr, path: &[&str]) -> Self {
        Self::Get {
            base: Box::new(base),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn opt(base: Expr, path: &[&str]) -> Self {
        Self::Opt {
            base: Box::new(base),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::Eq(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Expr) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn empty(inner: Expr) -> Self {
        Self::Empty(Box::new(inner))
    }

    pub fn map(source: Expr, binding: impl Into<String>, body: Expr) -> Self {
        Self::Map {
            source: Box::new(source),
            binding: binding.into(),
            body: Box::new(body),
        }
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Every `ref` in this expression, in encounter order, as
    /// `(node, field, optional)`.
    pub fn references(&self) -> Vec<(&str, &str, bool)> {
        let mut out = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Ref {
                node,
                field,
                optional,
            } = expr
            {
                out.push((node.as_str(), field.as_str(), *optional));
            }
        });
        out
    }

    /// Names of every variable this expression reads.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Var(name) = expr {
                out.push(name.as_str());
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Lit(_) | Expr::Param(_) | Expr::Var(_) | Expr::Item(_) | Expr::Ref { .. } => {}
            Expr::Get { base, .. } | Expr::Opt { base, .. } => base.walk(visit),
            Expr::Not(inner) | Expr::Empty(inner) => inner.walk(visit),
            Expr::Eq(left, right) | Expr::Ne(left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
            Expr::Map { source, body, .. } => {
                source.walk(visit);
                body.walk(visit);
            }
            Expr::Concat(items)
            | Expr::Coalesce(items)
            | Expr::And(items)
            | Expr::Or(items)
            | Expr::List(items) => items.iter().for_each(|e| e.walk(visit)),
            Expr::Object(fields) => fields.values().for_each(|e| e.walk(visit)),
        }
    }
}
