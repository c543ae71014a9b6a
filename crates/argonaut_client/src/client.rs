//! High-level client: submit or create a workflow, optionally wait for it,
//! and control it afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use argonaut_plan::Workflow;
use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::info;

use crate::api::{Operation, SUBMIT_LABEL, SubmitOptions, SubmitRequest, WorkflowApi};
use crate::checker::WorkflowStatusChecker;
use crate::error::{ClientError, ClientResult};
use crate::http::ArgoHttpClient;
use crate::options::ArgoOptions;
use crate::result::WorkflowResult;
use crate::status::WorkflowStatus;

/// A workflow template submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    template: String,
    namespace: Option<String>,
    parameters: IndexMap<String, Json>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl Submission {
    /// Submit the workflow template `template`
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    /// Namespace other than the configured default
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Workflow parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: Json) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Extra label
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Annotation
    #[must_use]
    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    fn request(&self, namespace: &str) -> SubmitRequest {
        let labels = std::iter::once(SUBMIT_LABEL.to_string())
            .chain(self.labels.iter().map(|(k, v)| format!("{}={}", k, v)))
            .collect::<Vec<_>>()
            .join(",");
        SubmitRequest {
            namespace: namespace.to_string(),
            resource_kind: "WorkflowTemplate".to_string(),
            resource_name: self.template.clone(),
            submit_options: SubmitOptions {
                parameters: self
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, parameter_value(v)))
                    .collect(),
                labels,
                annotations: self
                    .annotations
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
            },
        }
    }
}

/// Strings pass through, everything else as JSON (`true`, `3`, `[1,2]`)
fn parameter_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Workflow engine client
pub struct ArgoClient<A: ?Sized = ArgoHttpClient> {
    api: Arc<A>,
    server: String,
    namespace: String,
    polling_interval: Duration,
    wait_timeout: Option<Duration>,
}

impl ArgoClient<ArgoHttpClient> {
    /// Connect over HTTP
    ///
    /// # Errors
    ///
    /// Returns error if the options are invalid
    pub fn connect(options: &ArgoOptions) -> ClientResult<Self> {
        options.validate()?;
        Ok(Self::with_api(Arc::new(ArgoHttpClient::new(options)?), options))
    }
}

impl<A: WorkflowApi + ?Sized> ArgoClient<A> {
    /// Client over any API implementation
    #[must_use]
    pub fn with_api(api: Arc<A>, options: &ArgoOptions) -> Self {
        Self {
            api,
            server: options.server.trim_end_matches('/').to_string(),
            namespace: options.namespace.clone(),
            polling_interval: options.polling_interval,
            wait_timeout: options.wait_timeout,
        }
    }

    /// Default namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Web page of a workflow
    #[must_use]
    pub fn web_link(&self, namespace: &str, name: &str) -> String {
        format!("{}/workflows/{}/{}", self.server, namespace, name)
    }

    /// Submit a workflow from a workflow template
    ///
    /// Every submission carries the label `submit-from-api=true`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if the template does not exist,
    /// or any request or wait error
    pub async fn submit(&self, submission: &Submission, wait: bool) -> ClientResult<WorkflowResult> {
        let namespace = submission.namespace.as_deref().unwrap_or(&self.namespace);
        let request = submission.request(namespace);
        let created = self
            .api
            .submit_workflow(namespace, &request)
            .await
            .map_err(|err| match err {
                ClientError::NotFound { .. } => ClientError::NotFound {
                    resource: format!("WorkflowTemplate {}", submission.template),
                    namespace: namespace.to_string(),
                },
                other => other,
            })?;
        self.follow(namespace, &created, wait).await
    }

    /// Create a workflow from a manifest
    ///
    /// The namespace is taken from `namespace`, then the manifest, then the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns any request or wait error
    pub async fn create(&self, manifest: &Json, namespace: Option<&str>, wait: bool) -> ClientResult<WorkflowResult> {
        let namespace = namespace
            .or_else(|| manifest["metadata"]["namespace"].as_str())
            .unwrap_or(&self.namespace)
            .to_string();
        let created = self.api.create_workflow(&namespace, manifest).await?;
        self.follow(&namespace, &created, wait).await
    }

    /// Compile and create a workflow
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Compile`] if compilation fails, otherwise see
    /// [`ArgoClient::create`]
    pub async fn create_workflow(&self, workflow: &Workflow, wait: bool) -> ClientResult<WorkflowResult> {
        let manifest = workflow.to_json()?;
        self.create(&manifest, None, wait).await
    }

    /// Current state of a workflow
    ///
    /// # Errors
    ///
    /// Returns any request error
    pub async fn status(&self, name: &str, namespace: Option<&str>) -> ClientResult<WorkflowResult> {
        let mut checker = self.checker(namespace.unwrap_or(&self.namespace), name);
        checker.sync().await?;
        Ok(snapshot(&checker, checker.status()))
    }

    /// Wait for a workflow to finish
    ///
    /// # Errors
    ///
    /// Returns any request or timeout error
    pub async fn wait(
        &self,
        name: &str,
        namespace: Option<&str>,
        on_poll: impl FnMut(WorkflowStatus) + Send,
    ) -> ClientResult<WorkflowResult> {
        let mut checker = self.checker(namespace.unwrap_or(&self.namespace), name);
        checker.sync().await?;
        let status = checker.wait_with(on_poll).await?;
        Ok(snapshot(&checker, status))
    }

    /// Apply a lifecycle operation and return the updated workflow
    ///
    /// # Errors
    ///
    /// Returns any request error
    pub async fn operate(&self, name: &str, namespace: Option<&str>, operation: Operation) -> ClientResult<WorkflowResult> {
        let namespace = namespace.unwrap_or(&self.namespace);
        let workflow = self.api.operate(namespace, name, operation).await?;
        info!(namespace, name, operation = %operation, "workflow updated");
        let status = WorkflowStatus::from_phase(workflow["status"]["phase"].as_str());
        Ok(WorkflowResult::new(name, namespace, status, workflow))
    }

    async fn follow(&self, namespace: &str, created: &Json, wait: bool) -> ClientResult<WorkflowResult> {
        let name = created["metadata"]["name"]
            .as_str()
            .ok_or_else(|| ClientError::InvalidResponse("created workflow has no name".to_string()))?;
        let actual_namespace = created["metadata"]["namespace"].as_str().unwrap_or(namespace);
        info!(link = %self.web_link(actual_namespace, name), "workflow's link");

        let mut checker = self.checker(namespace, name);
        checker.sync().await?;
        if !wait {
            return Ok(snapshot(&checker, checker.status()));
        }
        let status = checker.wait_for_completion().await?;
        Ok(snapshot(&checker, status))
    }

    fn checker(&self, namespace: &str, name: &str) -> WorkflowStatusChecker<A> {
        WorkflowStatusChecker::new(self.api.clone(), namespace, name)
            .with_interval(self.polling_interval)
            .with_timeout(self.wait_timeout)
    }
}

fn snapshot<A: WorkflowApi + ?Sized>(checker: &WorkflowStatusChecker<A>, status: WorkflowStatus) -> WorkflowResult {
    WorkflowResult::new(checker.name(), checker.namespace(), status, checker.workflow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, workflow};
    use argonaut_plan::prelude::*;

    fn options() -> ArgoOptions {
        ArgoOptions::default()
            .with_server("https://argo.example.com")
            .with_polling_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_submission_request() {
        let request = Submission::new("hello")
            .param("name", json!("james"))
            .param("dry_run", json!(true))
            .param("sizes", json!([1, 2]))
            .label("team", "data")
            .annotation("owner", "me")
            .request("argo");
        assert_eq!(request.resource_kind, "WorkflowTemplate");
        assert_eq!(request.submit_options.parameters, vec!["name=james", "dry_run=true", "sizes=[1,2]"]);
        assert_eq!(request.submit_options.labels, "submit-from-api=true,team=data");
        assert_eq!(request.submit_options.annotations, "owner=me");
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let api = Arc::new(FakeApi::with_polls(vec![
            workflow("hello-abcde", Some("Running")),
            workflow("hello-abcde", Some("Succeeded")),
        ]));
        let client = ArgoClient::with_api(api.clone(), &options());
        let result = client.submit(&Submission::new("hello"), true).await.unwrap();
        assert_eq!(result.name(), "hello-abcde");
        assert_eq!(result.status(), WorkflowStatus::Succeeded);
        assert_eq!(api.submitted()[0].resource_name, "hello");
        assert_eq!(client.web_link("argo", "hello-abcde"), "https://argo.example.com/workflows/argo/hello-abcde");
    }

    #[tokio::test]
    async fn test_submit_without_wait() {
        let api = Arc::new(FakeApi::with_polls(vec![workflow("hello-abcde", None)]));
        let client = ArgoClient::with_api(api.clone(), &options());
        let result = client.submit(&Submission::new("hello"), false).await.unwrap();
        assert_eq!(result.status(), WorkflowStatus::Pending);
        assert_eq!(api.gets(), 1);
    }

    #[tokio::test]
    async fn test_submit_missing_template() {
        let api = Arc::new(FakeApi::missing());
        let client = ArgoClient::with_api(api, &options());
        let err = client.submit(&Submission::new("ghost"), true).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::NotFound {
                resource: "WorkflowTemplate ghost".to_string(),
                namespace: "argo".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_create_compiled_workflow() {
        let say = task("say").param("name", TypeHint::Str).body(|a| Ok(json!(a.str("name")?)));
        let hello = dag("hello")
            .param("name", TypeHint::Str)
            .body(move |scope, args| say.call(scope, Call::new().arg(args.value("name")?)));
        let workflow = Workflow::new(hello)
            .generate_name("hello-")
            .namespace("data")
            .argument("name", json!("james"));

        let api = Arc::new(FakeApi::with_polls(vec![workflow_json("hello-xyz12", "Failed")]));
        let client = ArgoClient::with_api(api.clone(), &options());
        let result = client.create_workflow(&workflow, true).await.unwrap();
        assert_eq!(result.status(), WorkflowStatus::Failed);
        let (namespace, manifest) = &api.created()[0];
        assert_eq!(namespace, "data");
        assert_eq!(manifest["kind"], "Workflow");
    }

    #[tokio::test]
    async fn test_operations() {
        let api = Arc::new(FakeApi::with_polls(vec![]));
        let client = ArgoClient::with_api(api.clone(), &options());
        client.operate("w", None, Operation::Suspend).await.unwrap();
        client.operate("w", Some("ci"), Operation::Stop).await.unwrap();
        let ops = api.operations();
        assert_eq!(ops[0], ("argo".to_string(), "w".to_string(), Operation::Suspend));
        assert_eq!(ops[1].0, "ci");
    }

    fn workflow_json(name: &str, phase: &str) -> Json {
        workflow(name, Some(phase))
    }
}
