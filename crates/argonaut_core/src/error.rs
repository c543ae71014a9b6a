//! Core error types for ARGONAUT.
//!
//! Every variant describes a programmer error in a traced workflow
//! definition or a failure surfaced while running a task directly. None of
//! them is retried: a compile pass either fully succeeds or fails.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A call does not match the callee's declared signature
    ArgumentBinding {
        /// Function that was invoked
        function: String,
        /// Rendered signature of the function
        signature: String,
        /// Rendered call-site arguments
        call: String,
        /// Why binding failed
        reason: String,
    },

    /// An argument value cannot be turned into a reference
    Argument {
        /// Argument name
        name: String,
        /// Why the argument is invalid
        reason: String,
    },

    /// More than one fan-out argument on a single node
    NestedLoop {
        /// Function that was invoked
        function: String,
    },

    /// Projection through a reserved attribute name
    InvalidReference {
        /// Offending attribute
        attribute: String,
    },

    /// Type-directed parameter handling without a type hint
    MissingAnnotation {
        /// Parameter without annotation
        parameter: String,
        /// Function declaring the parameter
        function: String,
    },

    /// A DAG returned something other than node output references
    UnsupportedReturnShape {
        /// DAG function
        function: String,
        /// Description of what was returned
        found: String,
    },

    /// Entrypoint is not a DAG or workflow template
    InvalidEntrypoint {
        /// Name of the rejected callable
        name: String,
    },

    /// A body asked for an argument that was never bound
    MissingArgument {
        /// Function being executed
        function: String,
        /// Missing argument
        name: String,
    },

    /// A task body failed while running directly
    TaskFailed {
        /// Task name
        task: String,
        /// Failure message
        message: String,
    },

    /// Invalid encoding
    Encoding {
        /// Failure message
        message: String,
    },

    /// Validation error
    Validation {
        /// Field or entity that failed validation
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Reading or writing a task parameter file failed
    Io {
        /// File path
        path: String,
        /// Failure message
        message: String,
    },
}

impl CoreError {
    /// Whether this error came from user task code rather than from the
    /// workflow definition itself
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgumentBinding {
                function,
                signature,
                call,
                reason,
            } => write!(
                f,
                "You have invoked '{}' with signature '{}' with : {}. {}.",
                function, signature, call, reason
            ),
            Self::Argument { name, reason } => {
                write!(f, "Argument '{}' is invalid: {}", name, reason)
            }
            Self::NestedLoop { function } => write!(
                f,
                "Nested loops are not allowed in the same DAG ('{}' iterates more than one argument), \
                 split your loops into nested DAGs instead",
                function
            ),
            Self::InvalidReference { attribute } => write!(
                f,
                "You are trying to reference attribute '{}'. Special attributes cannot be projected",
                attribute
            ),
            Self::MissingAnnotation {
                parameter,
                function,
            } => write!(
                f,
                "Default parameter handling uses type annotations to pick a codec, \
                 yet parameter '{}' in function '{}' does not provide any. \
                 Annotate the parameter or set an explicit codec",
                parameter, function
            ),
            Self::UnsupportedReturnShape { function, found } => write!(
                f,
                "DAG '{}' returned a value of type [{}]. DAGs may only return results of nested DAGs or tasks",
                function, found
            ),
            Self::InvalidEntrypoint { name } => {
                write!(f, "'{}' is not a DAG or workflow template", name)
            }
            Self::MissingArgument { function, name } => {
                write!(f, "'{}' has no argument named '{}'", function, name)
            }
            Self::TaskFailed { task, message } => write!(f, "Task '{}' failed: {}", task, message),
            Self::Encoding { message } => write!(f, "Invalid encoding: {}", message),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
            Self::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_error_names_function_and_signature() {
        let err = CoreError::ArgumentBinding {
            function: "say_hello".to_string(),
            signature: "(name: str)".to_string(),
            call: "args=() kwargs=(nme)".to_string(),
            reason: "got an unexpected keyword argument 'nme'".to_string(),
        };
        let s = format!("{}", err);
        assert!(s.contains("say_hello"));
        assert!(s.contains("(name: str)"));
        assert!(s.contains("kwargs=(nme)"));
    }

    #[test]
    fn test_missing_annotation_names_parameter() {
        let err = CoreError::MissingAnnotation {
            parameter: "items".to_string(),
            function: "sum_task".to_string(),
        };
        let s = format!("{}", err);
        assert!(s.contains("'items'"));
        assert!(s.contains("'sum_task'"));
    }

    #[test]
    fn test_task_failure_flag() {
        let err = CoreError::TaskFailed {
            task: "task_one".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.is_task_failure());
        assert!(!CoreError::NestedLoop { function: "f".to_string() }.is_task_failure());
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::InvalidEntrypoint { name: "x".to_string() };
        let err2 = CoreError::InvalidEntrypoint { name: "x".to_string() };
        assert_eq!(err1, err2);
        assert_ne!(err1, CoreError::InvalidEntrypoint { name: "y".to_string() });
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Encoding { .. }));
    }
}
