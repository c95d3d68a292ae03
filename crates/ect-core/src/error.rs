//! Error types shared by the registry, dispatch and graph layers.

/// Errors raised by the core.
///
/// Validation-class errors (`Argument`, `Validation`, `UnboundInput`) are
/// raised before an operation body runs. `Execution` wraps a failure from
/// inside an operation body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("operation '{0}' is already registered with a different signature")]
    Conflict(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid graph: {0}")]
    GraphFormat(String),

    #[error("input '{input}' required by step '{step}' is not bound")]
    UnboundInput { input: String, step: String },

    #[error("{}", execution_message(.operation, .step.as_deref(), .source))]
    Execution {
        operation: String,
        step: Option<String>,
        #[source]
        source: OpError,
    },

    #[error("step '{step}' failed: {source}")]
    InStep {
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

fn execution_message(operation: &str, step: Option<&str>, source: &OpError) -> String {
    match step {
        Some(step) => format!("step '{step}' (operation '{operation}') failed: {source}"),
        None => format!("operation '{operation}' failed: {source}"),
    }
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// The graph step this error was annotated with, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::Execution { step, .. } => step.as_deref(),
            Error::InStep { step, .. } | Error::UnboundInput { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Attach a step identity when crossing a graph boundary.
    ///
    /// Execution errors carry the step directly; everything else is wrapped.
    pub(crate) fn in_step(self, step_id: &str) -> Self {
        match self {
            Error::Execution {
                operation,
                step: None,
                source,
            } => Error::Execution {
                operation,
                step: Some(step_id.to_string()),
                source,
            },
            Error::Cancelled => Error::Cancelled,
            other => Error::InStep {
                step: step_id.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Errors raised from inside an operation body.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl OpError {
    pub fn failed(msg: impl Into<String>) -> Self {
        OpError::Failed(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_step_annotates_execution() {
        let err = Error::Execution {
            operation: "boom".into(),
            step: None,
            source: OpError::failed("kaput"),
        }
        .in_step("b");

        assert_eq!(err.step(), Some("b"));
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(
            err.to_string(),
            "step 'b' (operation 'boom') failed: kaput"
        );
    }

    #[test]
    fn test_in_step_wraps_validation() {
        let err = Error::Validation("bad".into()).in_step("a");
        assert_eq!(err.step(), Some("a"));
        match err {
            Error::InStep { source, .. } => assert!(matches!(*source, Error::Validation(_))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_stays_cancelled() {
        assert!(matches!(Error::Cancelled.in_step("a"), Error::Cancelled));
    }
}
