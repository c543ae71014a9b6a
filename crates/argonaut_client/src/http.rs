//! HTTP implementation of the workflow service API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Value as Json, json};
use tracing::{debug, warn};

use crate::api::{Operation, SubmitRequest, WorkflowApi};
use crate::error::{ClientError, ClientResult, ConfigError};
use crate::options::ArgoOptions;

/// Workflow service client over the server's REST API
#[derive(Debug, Clone)]
pub struct ArgoHttpClient {
    http: Client,
    base: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ArgoHttpClient {
    /// Build a client from connection settings
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the TLS
    /// stack cannot be initialised
    pub fn new(options: &ArgoOptions) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &options.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "token".to_string(),
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!options.client_side_validation)
            .build()?;
        Ok(Self {
            http,
            base: options.server.trim_end_matches('/').to_string(),
            max_retries: options.max_retries,
            initial_backoff: options.initial_backoff,
            max_backoff: options.max_backoff,
        })
    }

    /// `/api/v1/workflows/{namespace}[/{name}[/{op}]]`
    fn url(&self, namespace: &str, name: Option<&str>, op: Option<&str>) -> String {
        let mut url = format!("{}/api/v1/workflows/{}", self.base, namespace);
        for segment in name.into_iter().chain(op) {
            url.push('/');
            url.push_str(segment);
        }
        url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }

    async fn send(&self, request: RequestBuilder, namespace: &str, resource: &str) -> ClientResult<Json> {
        let response = request.send().await?;
        let status = response.status();
        debug!(namespace, name = resource, status = status.as_u16(), "workflow api response");
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                resource: resource.to_string(),
                namespace: namespace.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<Json>().await?)
    }
}

#[async_trait]
impl WorkflowApi for ArgoHttpClient {
    async fn submit_workflow(&self, namespace: &str, request: &SubmitRequest) -> ClientResult<Json> {
        let url = self.url(namespace, Some("submit"), None);
        self.send(self.http.post(url).json(request), namespace, &request.resource_name)
            .await
    }

    async fn create_workflow(&self, namespace: &str, manifest: &Json) -> ClientResult<Json> {
        let url = self.url(namespace, None, None);
        let body = json!({ "namespace": namespace, "workflow": manifest });
        let name = manifest["metadata"]["name"]
            .as_str()
            .or_else(|| manifest["metadata"]["generateName"].as_str())
            .unwrap_or("workflow");
        self.send(self.http.post(url).json(&body), namespace, name).await
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> ClientResult<Json> {
        let url = self.url(namespace, Some(name), None);
        let mut attempt = 0;
        loop {
            match self.send(self.http.get(&url), namespace, name).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying workflow fetch"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn operate(&self, namespace: &str, name: &str, operation: Operation) -> ClientResult<Json> {
        let url = self.url(namespace, Some(name), Some(operation.as_str()));
        let body = json!({ "namespace": namespace, "name": name });
        self.send(self.http.put(url).json(&body), namespace, name).await
    }
}
