//! Per-function template properties.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::resource::ResourceRequirements;
use crate::template::{EnvVar, Metadata, RetryStrategy, Template};

/// Image used when a task does not name one
pub const DEFAULT_IMAGE: &str = "alpine:3";

/// Properties carried onto a task's script template
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProperties {
    /// Container image
    pub image: String,
    /// Interpreter override
    pub command: Option<Vec<String>>,
    /// Resource requirements
    pub resources: Option<ResourceRequirements>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Image pull policy
    pub image_pull_policy: Option<String>,
    /// Environment variables
    pub env: Vec<EnvVar>,
    /// Environment sources
    pub env_from: Vec<Json>,
    /// Shared template settings
    pub common: CommonProperties,
}

impl Default for TaskProperties {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            command: None,
            resources: None,
            working_dir: None,
            image_pull_policy: None,
            env: Vec::new(),
            env_from: Vec::new(),
            common: CommonProperties::default(),
        }
    }
}

/// Settings shared by task and DAG templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonProperties {
    /// Pod labels
    pub labels: BTreeMap<String, String>,
    /// Pod annotations
    pub annotations: BTreeMap<String, String>,
    /// Retry policy
    pub retry_strategy: Option<RetryStrategy>,
    /// Maximum concurrently running children
    pub parallelism: Option<u32>,
    /// Deadline in seconds
    pub active_deadline_seconds: Option<u64>,
    /// Stop scheduling new DAG steps once one fails
    pub fail_fast: Option<bool>,
    /// Node selector labels
    pub node_selector: BTreeMap<String, String>,
    /// Pod tolerations
    pub tolerations: Vec<Json>,
    /// Pod affinity
    pub affinity: Option<Json>,
    /// Service account
    pub service_account_name: Option<String>,
}

impl CommonProperties {
    /// Copy these settings onto a compiled template
    pub fn apply(&self, template: &mut Template) {
        template.metadata = Metadata {
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
        };
        template.retry_strategy = self.retry_strategy.clone();
        template.parallelism = self.parallelism;
        template.active_deadline_seconds = self.active_deadline_seconds;
        template.node_selector = self.node_selector.clone();
        template.tolerations = self.tolerations.clone();
        template.affinity = self.affinity.clone();
        template.service_account_name = self.service_account_name.clone();
    }
}
