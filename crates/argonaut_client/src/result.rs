//! Snapshot of a submitted workflow.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::{ClientError, ClientResult};
use crate::status::WorkflowStatus;

/// Named outputs of a finished workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowOutputs {
    /// Output parameters by name
    pub parameters: IndexMap<String, String>,
    /// Output artifacts by name
    pub artifacts: IndexMap<String, Json>,
}

impl WorkflowOutputs {
    /// Parameter value by name
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Artifact by name
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Json> {
        self.artifacts.get(name)
    }
}

/// A workflow as last seen on the server
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowResult {
    name: String,
    namespace: String,
    status: WorkflowStatus,
    workflow: Json,
}

impl WorkflowResult {
    /// Snapshot of `workflow` in `status`
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, status: WorkflowStatus, workflow: Json) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            status,
            workflow,
        }
    }

    /// Workflow name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workflow namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Phase at snapshot time
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Whether the workflow was still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Raw workflow object
    #[must_use]
    pub fn workflow(&self) -> &Json {
        &self.workflow
    }

    /// Status message, usually set on failure
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.workflow["status"]["message"].as_str()
    }

    /// Start time
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        timestamp(&self.workflow["status"]["startedAt"])
    }

    /// Finish time
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        timestamp(&self.workflow["status"]["finishedAt"])
    }

    /// Wall time between start and finish
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at()? - self.started_at()?)
    }

    /// Outputs of the workflow's root node
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::StillRunning`] while the workflow is running
    pub fn outputs(&self) -> ClientResult<WorkflowOutputs> {
        if self.is_running() {
            return Err(ClientError::StillRunning(self.name.clone()));
        }
        let status = &self.workflow["status"];
        let outputs = match status["nodes"].get(&self.name) {
            Some(root) => &root["outputs"],
            None => &status["outputs"],
        };

        let mut result = WorkflowOutputs::default();
        for parameter in outputs["parameters"].as_array().into_iter().flatten() {
            if let Some(name) = parameter["name"].as_str() {
                let value = match &parameter["value"] {
                    Json::String(s) => s.clone(),
                    Json::Null => String::new(),
                    other => other.to_string(),
                };
                result.parameters.insert(name.to_string(), value);
            }
        }
        for artifact in outputs["artifacts"].as_array().into_iter().flatten() {
            if let Some(name) = artifact["name"].as_str() {
                result.artifacts.insert(name.to_string(), artifact.clone());
            }
        }
        Ok(result)
    }
}

fn timestamp(value: &Json) -> Option<DateTime<Utc>> {
    value.as_str()?.parse().ok()
}
