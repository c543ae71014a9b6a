//! Client error types.

use argonaut_core::CoreError;

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors talking to the workflow engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The requested resource does not exist
    #[error("Resource {resource} does not exist on namespace {namespace}")]
    NotFound {
        /// Resource name
        resource: String,
        /// Namespace searched
        namespace: String,
    },

    /// The server answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The request never got a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be read
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Waiting for a workflow took too long
    #[error("Workflow {name} still running after {seconds}s")]
    Timeout {
        /// Workflow name
        name: String,
        /// Seconds waited
        seconds: u64,
    },

    /// Outputs were requested from a workflow that has not finished
    #[error("Workflow {0} is still running")]
    StillRunning(String),

    /// Client configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Compiling a workflow document failed
    #[error("Compile error: {0}")]
    Compile(#[from] CoreError),
}

impl ClientError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors loading client configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Cannot read {path}: {message}")]
    Read {
        /// File path
        path: String,
        /// Failure message
        message: String,
    },

    /// The configuration file is not valid TOML
    #[error("Invalid configuration: {0}")]
    Parse(String),

    /// A setting has an unusable value
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue {
        /// Setting name
        key: String,
        /// Why it was rejected
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ClientError::Transport("reset".into()).is_retryable());
        assert!(ClientError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(ClientError::Api { status: 429, message: String::new() }.is_retryable());
        assert!(!ClientError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(
            !ClientError::NotFound {
                resource: "x".into(),
                namespace: "argo".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = ClientError::NotFound {
            resource: "hello".into(),
            namespace: "argo".into(),
        };
        assert_eq!(err.to_string(), "Resource hello does not exist on namespace argo");
    }
}
