//! ARGONAUT Client
//!
//! Talks to the workflow engine's REST API: submits workflows from
//! templates, creates workflows from compiled manifests, polls them to
//! completion and applies lifecycle operations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod checker;
pub mod client;
pub mod error;
pub mod http;
pub mod options;
pub mod result;
pub mod status;

pub use api::{Operation, SUBMIT_LABEL, SubmitOptions, SubmitRequest, WorkflowApi};
pub use checker::WorkflowStatusChecker;
pub use client::{ArgoClient, Submission};
pub use error::{ClientError, ClientResult, ConfigError};
pub use http::ArgoHttpClient;
pub use options::{ArgoOptions, DEFAULT_NAMESPACE, DEFAULT_SERVER};
pub use result::{WorkflowOutputs, WorkflowResult};
pub use status::WorkflowStatus;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value as Json, json};

    use crate::api::{Operation, SubmitRequest, WorkflowApi};
    use crate::error::{ClientError, ClientResult};

    /// Workflow object in `phase`
    pub fn workflow(name: &str, phase: Option<&str>) -> Json {
        let mut status = json!({});
        if let Some(phase) = phase {
            status["phase"] = json!(phase);
        }
        json!({"metadata": {"name": name, "namespace": "argo"}, "spec": {}, "status": status})
    }

    /// In-memory server; `get_workflow` replays queued responses and keeps
    /// returning the last one
    #[derive(Default)]
    pub struct FakeApi {
        polls: Mutex<VecDeque<Json>>,
        last: Mutex<Option<Json>>,
        gets: Mutex<usize>,
        submitted: Mutex<Vec<SubmitRequest>>,
        created: Mutex<Vec<(String, Json)>>,
        operations: Mutex<Vec<(String, String, Operation)>>,
        missing: bool,
    }

    impl FakeApi {
        pub fn with_polls(polls: Vec<Json>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                ..Self::default()
            }
        }

        pub fn missing() -> Self {
            Self {
                missing: true,
                ..Self::default()
            }
        }

        pub fn gets(&self) -> usize {
            *self.gets.lock().unwrap()
        }

        pub fn submitted(&self) -> Vec<SubmitRequest> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn created(&self) -> Vec<(String, Json)> {
            self.created.lock().unwrap().clone()
        }

        pub fn operations(&self) -> Vec<(String, String, Operation)> {
            self.operations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkflowApi for FakeApi {
        async fn submit_workflow(&self, namespace: &str, request: &SubmitRequest) -> ClientResult<Json> {
            if self.missing {
                return Err(ClientError::NotFound {
                    resource: request.resource_name.clone(),
                    namespace: namespace.to_string(),
                });
            }
            self.submitted.lock().unwrap().push(request.clone());
            Ok(workflow(&format!("{}-abcde", request.resource_name), None))
        }

        async fn create_workflow(&self, namespace: &str, manifest: &Json) -> ClientResult<Json> {
            self.created.lock().unwrap().push((namespace.to_string(), manifest.clone()));
            let prefix = manifest["metadata"]["generateName"].as_str().unwrap_or("wf-");
            Ok(workflow(&format!("{}xyz12", prefix), None))
        }

        async fn get_workflow(&self, _namespace: &str, name: &str) -> ClientResult<Json> {
            *self.gets.lock().unwrap() += 1;
            let next = self.polls.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            last.clone().ok_or_else(|| ClientError::NotFound {
                resource: name.to_string(),
                namespace: "argo".to_string(),
            })
        }

        async fn operate(&self, namespace: &str, name: &str, operation: Operation) -> ClientResult<Json> {
            self.operations
                .lock()
                .unwrap()
                .push((namespace.to_string(), name.to_string(), operation));
            Ok(workflow(name, Some("Running")))
        }
    }
}
