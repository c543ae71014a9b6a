//! Workflow service API surface.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ClientResult;

/// Label attached to every workflow submitted through this client
pub const SUBMIT_LABEL: &str = "submit-from-api=true";

/// Options of a submit request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOptions {
    /// `name=value` workflow parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Comma separated `key=value` labels
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub labels: String,
    /// Comma separated `key=value` annotations
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotations: String,
}

/// Start a workflow from a stored resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Target namespace
    pub namespace: String,
    /// Kind of the stored resource
    pub resource_kind: String,
    /// Name of the stored resource
    pub resource_name: String,
    /// Submit options
    pub submit_options: SubmitOptions,
}

/// Lifecycle operation on a running workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Stop, running exit handlers
    Stop,
    /// Retry failed steps
    Retry,
    /// Resume a suspended workflow
    Resume,
    /// Suspend a running workflow
    Suspend,
}

impl Operation {
    /// Path segment of the operation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Retry => "retry",
            Self::Resume => "resume",
            Self::Suspend => "suspend",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow service calls, keyed by namespace and name
///
/// Responses are raw workflow objects.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// Submit a workflow from a stored resource
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn submit_workflow(&self, namespace: &str, request: &SubmitRequest) -> ClientResult<Json>;

    /// Create a workflow from a full manifest
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn create_workflow(&self, namespace: &str, manifest: &Json) -> ClientResult<Json>;

    /// Fetch a workflow
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn get_workflow(&self, namespace: &str, name: &str) -> ClientResult<Json>;

    /// Apply a lifecycle operation
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn operate(&self, namespace: &str, name: &str, operation: Operation) -> ClientResult<Json>;

    /// Stop a workflow
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn stop(&self, namespace: &str, name: &str) -> ClientResult<Json> {
        self.operate(namespace, name, Operation::Stop).await
    }

    /// Retry a workflow
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn retry(&self, namespace: &str, name: &str) -> ClientResult<Json> {
        self.operate(namespace, name, Operation::Retry).await
    }

    /// Resume a workflow
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn resume(&self, namespace: &str, name: &str) -> ClientResult<Json> {
        self.operate(namespace, name, Operation::Resume).await
    }

    /// Suspend a workflow
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn suspend(&self, namespace: &str, name: &str) -> ClientResult<Json> {
        self.operate(namespace, name, Operation::Suspend).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_wire_form() {
        let request = SubmitRequest {
            namespace: "argo".into(),
            resource_kind: "WorkflowTemplate".into(),
            resource_name: "hello".into(),
            submit_options: SubmitOptions {
                parameters: vec!["name=james".into()],
                labels: SUBMIT_LABEL.into(),
                annotations: String::new(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["resourceKind"], "WorkflowTemplate");
        assert_eq!(json["submitOptions"]["labels"], "submit-from-api=true");
        assert!(json["submitOptions"].get("annotations").is_none());
    }

    #[test]
    fn test_operation_path() {
        assert_eq!(Operation::Suspend.to_string(), "suspend");
    }
}
