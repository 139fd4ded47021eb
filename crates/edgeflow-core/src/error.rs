use thiserror::Error;

/// A single parameter that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parameter '{parameter}': {reason}")]
pub struct SchemaError {
    pub parameter: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Every parameter failure found in one validation pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} parameter(s) failed validation: {}", .0.len(), join_schema_errors(.0))]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl SchemaErrors {
    pub fn iter(&self) -> impl Iterator<Item = &SchemaError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn join_schema_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Template definition errors detected while building the resource graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("resource '{from}' references unknown resource '{target}'")]
    DanglingReference { from: String, target: String },

    #[error("resource '{from}' references unknown field '{field}' of resource '{target}'")]
    UnknownField {
        from: String,
        target: String,
        field: String,
    },

    #[error("duplicate resource id: {0}")]
    DuplicateNode(String),

    #[error("resource '{0}' cannot depend on itself")]
    SelfDependency(String),
}

/// An expression that cannot be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("'{0}' is not bound by any enclosing map")]
    UnboundItem(String),

    #[error("required field '{path}' is missing")]
    MissingField { path: String },

    #[error("required value from skipped resource '{node}' (field '{field}')")]
    SkippedDependency { node: String, field: String },

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("condition depends on provider-assigned value '{0}'")]
    PendingCondition(String),

    #[error("variables cannot reference resources (variable '{variable}' reads '{node}')")]
    ResourceInVariable { variable: String, node: String },

    #[error("value still pending on '{0}'")]
    Unresolved(String),

    #[error("resource '{node}': {source}")]
    InNode {
        node: String,
        #[source]
        source: Box<EvaluationError>,
    },
}

impl EvaluationError {
    /// Attribute the error to the node whose expression failed.
    pub fn in_node(self, node: impl Into<String>) -> Self {
        match self {
            already @ Self::InNode { .. } => already,
            other => Self::InNode {
                node: node.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Errors that reject a run before any provisioning happens.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Schema(#[from] SchemaErrors),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("illegal lifecycle transition for '{node}': {from} -> {to}")]
    IllegalTransition {
        node: String,
        from: String,
        to: String,
    },
}

pub type Result<T> = std::result::Result<T, FlowError>;
