use crate::core::BoxError;
use thiserror::Error;

/// Every failure the engine reports.
///
/// Structural problems surface as [`OrchestratorError::Connection`], data that
/// breaks a field contract as [`OrchestratorError::Validation`] and failures
/// raised by node bodies as [`OrchestratorError::Execution`]. A graph run
/// reports a failing node as [`OrchestratorError::Invocation`], naming the
/// placement and keeping the node error as its source. The remaining variants
/// come from building descriptors and prototypes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("duplicate field: '{0}' is already declared")]
    DuplicateField(String),

    #[error("field not found: '{0}' is not declared")]
    FieldNotFound(String),

    #[error("invalid field declaration: {0}")]
    InvalidDeclaration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("execution error in node '{node}': {source}")]
    Execution {
        node: String,
        #[source]
        source: BoxError,
    },

    #[error("invocation '{label}' failed: {source}")]
    Invocation {
        label: String,
        #[source]
        source: BoxError,
    },
}

/// Coarse classification of an [`OrchestratorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Declaration,
    Connection,
    Validation,
    Execution,
}

impl OrchestratorError {
    /// Wraps an arbitrary failure as an execution error of `node`.
    pub fn execution(node: impl Into<String>, source: impl Into<BoxError>) -> Self {
        OrchestratorError::Execution {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Wraps the failure of a node run as the failure of one graph invocation.
    pub(crate) fn invocation(label: impl Into<String>, source: OrchestratorError) -> Self {
        OrchestratorError::Invocation {
            label: label.into(),
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Configuration(_) => ErrorKind::Configuration,
            OrchestratorError::DuplicateField(_)
            | OrchestratorError::FieldNotFound(_)
            | OrchestratorError::InvalidDeclaration(_) => ErrorKind::Declaration,
            OrchestratorError::Connection(_) => ErrorKind::Connection,
            OrchestratorError::Validation(_) => ErrorKind::Validation,
            OrchestratorError::Execution { .. } | OrchestratorError::Invocation { .. } => {
                ErrorKind::Execution
            }
        }
    }

    /// The innermost error of the `source` chain (`self` when there is none).
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// The bare message of a variant, without the kind prefix added by `Display`.
    pub(crate) fn detail(&self) -> String {
        match self {
            OrchestratorError::Configuration(msg)
            | OrchestratorError::InvalidDeclaration(msg)
            | OrchestratorError::Connection(msg)
            | OrchestratorError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
