//! Workflow documents.
//!
//! Wraps a compiled [`WorkflowSpec`] into the resource kinds the workflow
//! engine accepts: `Workflow`, `WorkflowTemplate` and `CronWorkflow`.

use std::collections::BTreeMap;

use argonaut_core::{CoreError, CoreResult, sanitize_param};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::compiler::{CompileOptions, Compiler};
use crate::node::Callable;
use crate::reference::literal_string;
use crate::template::{Arguments, Parameter, WorkflowSpec};
use crate::wrapper::WorkflowTemplateRef;

/// API version of every generated document
pub const API_VERSION: &str = "argoproj.io/v1alpha1";

/// Default cron concurrency policy
pub const DEFAULT_CONCURRENCY_POLICY: &str = "Replace";

/// Resource metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Fixed name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Prefix for a server-generated name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,
    /// Namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A typed workflow engine resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest<S> {
    /// API version
    pub api_version: String,
    /// Resource kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Resource body
    pub spec: S,
}

impl<S: Serialize> Manifest<S> {
    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if serialization fails
    pub fn to_json(&self) -> CoreResult<Json> {
        Ok(serde_json::to_value(self)?)
    }

    /// Render as YAML
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if serialization fails
    pub fn to_yaml(&self) -> CoreResult<String> {
        serde_yaml::to_string(self).map_err(|e| CoreError::Encoding {
            message: e.to_string(),
        })
    }
}

/// Body of a `CronWorkflow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflowSpec {
    /// Cron schedule
    pub schedule: String,
    /// What to do when a run is still active
    pub concurrency_policy: String,
    /// Time zone of the schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Pause scheduling
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub suspend: bool,
    /// Workflow started on each tick
    pub workflow_spec: WorkflowSpec,
}

/// Settings shared by every document kind
#[derive(Debug, Clone)]
pub struct DocumentCommon {
    entrypoint: Callable,
    on_exit: Option<Callable>,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    arguments: IndexMap<String, Json>,
    options: CompileOptions,
}

impl DocumentCommon {
    fn new(entrypoint: Callable) -> Self {
        Self {
            entrypoint,
            on_exit: None,
            namespace: None,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            arguments: IndexMap::new(),
            options: CompileOptions::default(),
        }
    }

    fn compile(&self) -> CoreResult<WorkflowSpec> {
        let mut spec = Compiler::new(self.options.clone()).compile(&self.entrypoint, self.on_exit.as_ref())?;
        spec.arguments = Arguments {
            parameters: self
                .arguments
                .iter()
                .map(|(name, value)| Parameter::with_value(sanitize_param(name), literal_string(value)))
                .collect(),
        };
        Ok(spec)
    }

    fn metadata(&self, name: Option<String>, generate_name: Option<String>) -> ObjectMeta {
        ObjectMeta {
            name,
            generate_name,
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
        }
    }
}

/// Shared builder methods for workflow documents
pub trait DocumentBuilder: Sized {
    /// Settings being built
    fn common_mut(&mut self) -> &mut DocumentCommon;

    /// DAG run when the workflow finishes
    #[must_use]
    fn on_exit(mut self, handler: impl Into<Callable>) -> Self {
        self.common_mut().on_exit = Some(handler.into());
        self
    }

    /// Target namespace
    #[must_use]
    fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.common_mut().namespace = Some(namespace.into());
        self
    }

    /// Add a label
    #[must_use]
    fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_mut().labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    #[must_use]
    fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_mut().annotations.insert(key.into(), value.into());
        self
    }

    /// Add a workflow argument
    #[must_use]
    fn argument(mut self, name: impl Into<String>, value: Json) -> Self {
        self.common_mut().arguments.insert(name.into(), value);
        self
    }

    /// Compiler settings
    #[must_use]
    fn compile_options(mut self, options: CompileOptions) -> Self {
        self.common_mut().options = options;
        self
    }
}

/// A one-off workflow run
#[derive(Debug, Clone)]
pub struct Workflow {
    common: DocumentCommon,
    name: Option<String>,
    generate_name: Option<String>,
}

impl Workflow {
    /// Workflow starting at `entrypoint`
    #[must_use]
    pub fn new(entrypoint: impl Into<Callable>) -> Self {
        Self {
            common: DocumentCommon::new(entrypoint.into()),
            name: None,
            generate_name: None,
        }
    }

    /// Fixed name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Prefix for a server-generated name
    #[must_use]
    pub fn generate_name(mut self, prefix: impl Into<String>) -> Self {
        self.generate_name = Some(prefix.into());
        self
    }

    /// Compile into a manifest
    ///
    /// # Errors
    ///
    /// Returns a validation error without a name or generate-name, and any
    /// compile error
    pub fn to_manifest(&self) -> CoreResult<Manifest<WorkflowSpec>> {
        if self.name.is_none() && self.generate_name.is_none() {
            return Err(CoreError::Validation {
                field: "metadata".to_string(),
                reason: "a workflow needs a name or a generate name".to_string(),
            });
        }
        Ok(Manifest {
            api_version: API_VERSION.to_string(),
            kind: "Workflow".to_string(),
            metadata: self.common.metadata(self.name.clone(), self.generate_name.clone()),
            spec: self.common.compile()?,
        })
    }

    /// Compile into JSON
    ///
    /// # Errors
    ///
    /// See [`Workflow::to_manifest`]
    pub fn to_json(&self) -> CoreResult<Json> {
        self.to_manifest()?.to_json()
    }

    /// Compile into YAML
    ///
    /// # Errors
    ///
    /// See [`Workflow::to_manifest`]
    pub fn to_yaml(&self) -> CoreResult<String> {
        self.to_manifest()?.to_yaml()
    }
}

impl DocumentBuilder for Workflow {
    fn common_mut(&mut self) -> &mut DocumentCommon {
        &mut self.common
    }
}

/// A reusable workflow template
#[derive(Debug, Clone)]
pub struct WorkflowTemplateDocument {
    common: DocumentCommon,
    name: String,
}

impl WorkflowTemplateDocument {
    /// Template `name` starting at `entrypoint`
    #[must_use]
    pub fn new(name: impl Into<String>, entrypoint: impl Into<Callable>) -> Self {
        Self {
            common: DocumentCommon::new(entrypoint.into()),
            name: name.into(),
        }
    }

    /// Compile into a manifest
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_manifest(&self) -> CoreResult<Manifest<WorkflowSpec>> {
        Ok(Manifest {
            api_version: API_VERSION.to_string(),
            kind: "WorkflowTemplate".to_string(),
            metadata: self.common.metadata(Some(self.name.clone()), None),
            spec: self.common.compile()?,
        })
    }

    /// Compile into JSON
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_json(&self) -> CoreResult<Json> {
        self.to_manifest()?.to_json()
    }

    /// Compile into YAML
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_yaml(&self) -> CoreResult<String> {
        self.to_manifest()?.to_yaml()
    }
}

impl DocumentBuilder for WorkflowTemplateDocument {
    fn common_mut(&mut self) -> &mut DocumentCommon {
        &mut self.common
    }
}

/// A workflow started on a schedule
#[derive(Debug, Clone)]
pub struct CronWorkflow {
    common: DocumentCommon,
    name: String,
    schedule: String,
    concurrency_policy: String,
    timezone: Option<String>,
    suspend: bool,
}

impl CronWorkflow {
    /// Cron workflow `name` running `entrypoint` on `schedule`
    #[must_use]
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, entrypoint: impl Into<Callable>) -> Self {
        Self {
            common: DocumentCommon::new(entrypoint.into()),
            name: name.into(),
            schedule: schedule.into(),
            concurrency_policy: DEFAULT_CONCURRENCY_POLICY.to_string(),
            timezone: None,
            suspend: false,
        }
    }

    /// `Allow`, `Forbid` or `Replace`
    #[must_use]
    pub fn concurrency_policy(mut self, policy: impl Into<String>) -> Self {
        self.concurrency_policy = policy.into();
        self
    }

    /// Time zone of the schedule
    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Start suspended
    #[must_use]
    pub fn suspend(mut self, suspend: bool) -> Self {
        self.suspend = suspend;
        self
    }

    /// Compile into a manifest
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_manifest(&self) -> CoreResult<Manifest<CronWorkflowSpec>> {
        Ok(Manifest {
            api_version: API_VERSION.to_string(),
            kind: "CronWorkflow".to_string(),
            metadata: self.common.metadata(Some(self.name.clone()), None),
            spec: CronWorkflowSpec {
                schedule: self.schedule.clone(),
                concurrency_policy: self.concurrency_policy.clone(),
                timezone: self.timezone.clone(),
                suspend: self.suspend,
                workflow_spec: self.common.compile()?,
            },
        })
    }

    /// Compile into JSON
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_json(&self) -> CoreResult<Json> {
        self.to_manifest()?.to_json()
    }

    /// Compile into YAML
    ///
    /// # Errors
    ///
    /// Returns any compile error
    pub fn to_yaml(&self) -> CoreResult<String> {
        self.to_manifest()?.to_yaml()
    }
}

impl DocumentBuilder for CronWorkflow {
    fn common_mut(&mut self) -> &mut DocumentCommon {
        &mut self.common
    }
}

impl WorkflowTemplateRef {
    /// The workflow template this wrapper refers to
    #[must_use]
    pub fn to_workflow_template(&self) -> WorkflowTemplateDocument {
        let mut document = WorkflowTemplateDocument::new(self.workflow_template_name(), self.clone());
        if let Some(namespace) = self.namespace() {
            document = document.namespace(namespace);
        }
        for (name, value) in self.arguments() {
            document = document.argument(name.clone(), value.clone());
        }
        document
    }
}

/// Extract the workflow body from a YAML or JSON document of any kind
///
/// # Errors
///
/// Returns [`CoreError::Encoding`] for malformed documents and unknown kinds
pub fn load_spec(text: &str) -> CoreResult<(String, WorkflowSpec)> {
    let encoding = |e: serde_yaml::Error| CoreError::Encoding {
        message: e.to_string(),
    };
    let raw: serde_yaml::Value = serde_yaml::from_str(text).map_err(encoding)?;
    let kind = raw
        .get("kind")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or("Workflow")
        .to_string();
    let spec = match kind.as_str() {
        "Workflow" | "WorkflowTemplate" => {
            serde_yaml::from_value::<Manifest<WorkflowSpec>>(raw).map_err(encoding)?.spec
        }
        "CronWorkflow" => {
            serde_yaml::from_value::<Manifest<CronWorkflowSpec>>(raw)
                .map_err(encoding)?
                .spec
                .workflow_spec
        }
        other => {
            return Err(CoreError::Encoding {
                message: format!("unsupported document kind '{}'", other),
            });
        }
    };
    Ok((kind, spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{dag, task, workflow_template};
    use crate::node::Call;
    use crate::signature::TypeHint;
    use crate::value::Value;
    use crate::wrapper::{Dag, FunctionBuilder, NodeFunction};
    use serde_json::json;

    fn hello() -> Dag {
        let say = task("say_hello")
            .param("name", TypeHint::Str)
            .body(|a| Ok(json!(a.str("name")?)));
        dag("hello").param("name", TypeHint::Str).body(move |scope, args| {
            say.call(scope, Call::new().arg(args.value("name")?))
        })
    }

    #[test]
    fn test_workflow_requires_name() {
        let err = Workflow::new(hello()).to_manifest().unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn test_workflow_manifest() {
        let json = Workflow::new(hello())
            .generate_name("hello-")
            .namespace("argo")
            .label("team", "data")
            .argument("name", json!("james"))
            .argument("dry-run", json!(true))
            .to_json()
            .unwrap();
        assert_eq!(json["apiVersion"], API_VERSION);
        assert_eq!(json["kind"], "Workflow");
        assert_eq!(json["metadata"]["generateName"], "hello-");
        assert_eq!(json["metadata"]["namespace"], "argo");
        assert!(json["metadata"].get("name").is_none());
        let params = &json["spec"]["arguments"]["parameters"];
        assert_eq!(params[0], json!({"name": "name", "value": "james"}));
        assert_eq!(params[1], json!({"name": "dry_run", "value": "true"}));
        assert!(json["spec"]["entrypoint"].as_str().unwrap().starts_with("hello-"));
    }

    #[test]
    fn test_yaml_round_trip_through_loader() {
        let yaml = Workflow::new(hello()).name("hello").to_yaml().unwrap();
        assert!(yaml.contains("apiVersion: argoproj.io/v1alpha1"));
        let (kind, spec) = load_spec(&yaml).unwrap();
        assert_eq!(kind, "Workflow");
        assert_eq!(spec.templates.len(), 2);
        assert!(spec.entry_template().is_some());
    }

    #[test]
    fn test_cron_workflow() {
        let manifest = CronWorkflow::new("nightly", "0 0 * * *", hello())
            .timezone("UTC")
            .to_manifest()
            .unwrap();
        assert_eq!(manifest.kind, "CronWorkflow");
        assert_eq!(manifest.spec.concurrency_policy, DEFAULT_CONCURRENCY_POLICY);
        let json = manifest.to_json().unwrap();
        assert_eq!(json["spec"]["schedule"], "0 0 * * *");
        assert!(json["spec"].get("suspend").is_none());
        assert!(json["spec"]["workflowSpec"]["templates"].is_array());
        let (kind, spec) = load_spec(&manifest.to_yaml().unwrap()).unwrap();
        assert_eq!(kind, "CronWorkflow");
        assert_eq!(spec.templates.len(), 2);
    }

    #[test]
    fn test_workflow_template_document() {
        let shared = workflow_template("shared_hello", "shared-hello")
            .namespace("argo")
            .argument("name", json!("world"))
            .body(|_, _| Ok(Value::null()));
        let manifest = shared.to_workflow_template().to_manifest().unwrap();
        assert_eq!(manifest.kind, "WorkflowTemplate");
        assert_eq!(manifest.metadata.name.as_deref(), Some("shared-hello"));
        assert_eq!(manifest.metadata.namespace.as_deref(), Some("argo"));
        assert_eq!(manifest.spec.arguments.parameters[0].value.as_deref(), Some("world"));
        assert_eq!(manifest.spec.entrypoint, shared.definition().template_name());
    }

    #[test]
    fn test_load_spec_rejects_unknown_kind() {
        assert!(load_spec("kind: Pod\nspec: {}\n").is_err());
        assert!(load_spec(": not yaml :").is_err());
    }
}
