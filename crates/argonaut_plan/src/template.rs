//! Compiled workflow model.
//!
//! These types mirror the workflow engine's document schema. Field names
//! serialize in camelCase and empty or absent fields are omitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::resource::ResourceRequirements;

/// Compiled workflow body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Template the workflow starts from
    pub entrypoint: String,
    /// Template run when the workflow finishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<String>,
    /// Workflow-level arguments
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    /// Every template, children before their parents
    pub templates: Vec<Template>,
}

impl WorkflowSpec {
    /// Look up a template by name
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// The entrypoint template
    #[must_use]
    pub fn entry_template(&self) -> Option<&Template> {
        self.template(&self.entrypoint)
    }
}

/// A named unit of work: a script or a DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Content-derived template name
    pub name: String,
    /// Declared inputs
    #[serde(default, skip_serializing_if = "Inputs::is_empty")]
    pub inputs: Inputs,
    /// Declared outputs
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,
    /// Pod metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Script or DAG body
    #[serde(flatten)]
    pub body: TemplateBody,
    /// Retry policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,
    /// Maximum concurrently running children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    /// Deadline in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
    /// Node selector labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Json>,
    /// Pod affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Json>,
    /// Service account the pod runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

impl Template {
    /// Template with the given body and nothing else set
    #[must_use]
    pub fn new(name: impl Into<String>, body: TemplateBody) -> Self {
        Self {
            name: name.into(),
            inputs: Inputs::default(),
            outputs: Outputs::default(),
            metadata: Metadata::default(),
            body,
            retry_strategy: None,
            parallelism: None,
            active_deadline_seconds: None,
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
            affinity: None,
            service_account_name: None,
        }
    }

    /// The DAG body, if this is a DAG template
    #[must_use]
    pub fn dag(&self) -> Option<&DagTemplate> {
        match &self.body {
            TemplateBody::Dag(dag) => Some(dag),
            TemplateBody::Script(_) => None,
        }
    }

    /// The script body, if this is a task template
    #[must_use]
    pub fn script(&self) -> Option<&ScriptTemplate> {
        match &self.body {
            TemplateBody::Script(script) => Some(script),
            TemplateBody::Dag(_) => None,
        }
    }
}

/// Template body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateBody {
    /// Container running a script
    Script(ScriptTemplate),
    /// Graph of steps
    Dag(DagTemplate),
}

/// Container running a script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTemplate {
    /// Container image
    pub image: String,
    /// Interpreter the source is fed to
    pub command: Vec<String>,
    /// Script source
    pub source: String,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Environment sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<Json>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
}

/// Graph of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTemplate {
    /// Steps in trace order
    pub tasks: Vec<DagTask>,
    /// Stop scheduling new steps once one fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
}

impl DagTemplate {
    /// Look up a step by name
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&DagTask> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// One step of a DAG
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTask {
    /// Step name, unique within the DAG
    pub name: String,
    /// Template in the same document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Template in a separately published workflow template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRef>,
    /// Steps that must finish first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Arguments passed to the template
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    /// List to fan out over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_param: Option<String>,
    /// Guard expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Lifecycle hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<LifecycleHooks>,
    /// Failure tolerance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on: Option<ContinueOn>,
    /// Readable label, not part of the document
    #[serde(skip)]
    pub label: String,
}

impl DagTask {
    /// Name of the template or template reference this step runs
    #[must_use]
    pub fn target(&self) -> String {
        match (&self.template, &self.template_ref) {
            (Some(template), _) => template.clone(),
            (None, Some(r)) => format!("{}/{}", r.name, r.template),
            (None, None) => String::new(),
        }
    }
}

/// Reference into another workflow template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Workflow template name
    pub name: String,
    /// Template inside it
    pub template: String,
}

/// Lifecycle hooks of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleHooks {
    /// Hook run when the step exits
    pub exit: LifecycleHook,
}

/// A single lifecycle hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHook {
    /// Template in the same document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Template in another workflow template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRef>,
    /// Arguments passed to the hook
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
}

/// Failure tolerance of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueOn {
    /// Continue when the step fails
    pub failed: bool,
}

/// Argument list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    /// Parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Arguments {
    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Look up a parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Declared template inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inputs {
    /// Parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Inputs {
    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Declared template outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    /// Parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Outputs {
    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// A named parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Concrete or placeholder value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Default used when no value is passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Where the value is read from at runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

impl Parameter {
    /// Parameter carrying a value
    #[must_use]
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Input declaration with an optional default
    #[must_use]
    pub fn input(name: impl Into<String>, default: Option<String>) -> Self {
        Self {
            name: name.into(),
            default,
            ..Self::default()
        }
    }

    /// Output read from a file in the container
    #[must_use]
    pub fn from_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_source(name, ValueFrom {
            path: Some(path.into()),
            ..ValueFrom::default()
        })
    }

    /// Output forwarded from another parameter
    #[must_use]
    pub fn from_parameter(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::from_source(name, ValueFrom {
            parameter: Some(parameter.into()),
            ..ValueFrom::default()
        })
    }

    /// Output computed by an expression
    #[must_use]
    pub fn from_expression(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::from_source(name, ValueFrom {
            expression: Some(expression.into()),
            ..ValueFrom::default()
        })
    }

    fn from_source(name: impl Into<String>, value_from: ValueFrom) -> Self {
        Self {
            name: name.into(),
            value_from: Some(value_from),
            ..Self::default()
        }
    }
}

/// Runtime source of a parameter value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFrom {
    /// File path inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Another parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Engine expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Pod labels and annotations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Metadata {
    /// Whether nothing is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.annotations.is_empty()
    }
}

/// Retry policy for a template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    /// Maximum number of retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Which failures are retried, e.g. `OnFailure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<String>,
    /// Delay between attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<Backoff>,
}

impl RetryStrategy {
    /// Retry up to `limit` times
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.retry_policy = Some(policy.into());
        self
    }

    /// Set the backoff
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// Backoff between retries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    /// Initial delay, e.g. `"10s"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Multiplier applied after each attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<u32>,
    /// Upper bound on the total delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
}

/// Container environment variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Value source such as a secret key reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<Json>,
}
