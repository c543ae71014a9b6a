//! Workflow status polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as Json;
use tracing::debug;

use crate::api::WorkflowApi;
use crate::error::{ClientError, ClientResult};
use crate::options::DEFAULT_POLLING_INTERVAL;
use crate::status::WorkflowStatus;

/// Tracks the phase of one workflow
pub struct WorkflowStatusChecker<A: ?Sized> {
    api: Arc<A>,
    namespace: String,
    name: String,
    current_phase: Option<String>,
    workflow: Json,
    interval: Duration,
    timeout: Option<Duration>,
}

impl<A: WorkflowApi + ?Sized> WorkflowStatusChecker<A> {
    /// Checker for `namespace/name`; nothing is fetched until [`sync`](Self::sync)
    #[must_use]
    pub fn new(api: Arc<A>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            name: name.into(),
            current_phase: None,
            workflow: Json::Null,
            interval: DEFAULT_POLLING_INTERVAL,
            timeout: None,
        }
    }

    /// Delay between polls
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Give up waiting after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refresh the phase from the server
    ///
    /// The phase is usually missing right after submission. A running
    /// workflow with `spec.suspend` set is reported as `Suspended`.
    ///
    /// # Errors
    ///
    /// Returns error if the fetch fails
    pub async fn sync(&mut self) -> ClientResult<()> {
        let workflow = self.api.get_workflow(&self.namespace, &self.name).await?;
        let phase = workflow["status"]["phase"].as_str().map(str::to_string);
        let suspended = workflow["spec"]["suspend"].as_bool().unwrap_or(false);
        self.current_phase = if suspended && is_running_phase(phase.as_deref()) {
            Some(WorkflowStatus::Suspended.to_string())
        } else {
            phase
        };
        self.workflow = workflow;
        debug!(name = %self.name, phase = ?self.current_phase, "synced workflow");
        Ok(())
    }

    /// Poll until the workflow leaves the running phase
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when the configured timeout passes,
    /// or any fetch error
    pub async fn wait_for_completion(&mut self) -> ClientResult<WorkflowStatus> {
        self.wait_with(|_| {}).await
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion), calling
    /// `on_poll` before every poll
    ///
    /// # Errors
    ///
    /// See [`wait_for_completion`](Self::wait_for_completion)
    pub async fn wait_with(&mut self, mut on_poll: impl FnMut(WorkflowStatus) + Send) -> ClientResult<WorkflowStatus> {
        let started = Instant::now();
        while is_running_phase(self.current_phase.as_deref()) {
            on_poll(self.status());
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    return Err(ClientError::Timeout {
                        name: self.name.clone(),
                        seconds: started.elapsed().as_secs(),
                    });
                }
            }
            tokio::time::sleep(self.interval).await;
            self.sync().await?;
        }
        Ok(self.status())
    }

    /// Last seen raw phase
    #[must_use]
    pub fn current_phase(&self) -> Option<&str> {
        self.current_phase.as_deref()
    }

    /// Last seen phase as a status
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus::from_phase(self.current_phase.as_deref())
    }

    /// Last fetched workflow object
    #[must_use]
    pub fn workflow(&self) -> &Json {
        &self.workflow
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
}

fn is_running_phase(phase: Option<&str>) -> bool {
    phase.is_none_or(|p| p.eq_ignore_ascii_case("running"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, workflow};
    use serde_json::json;

    #[tokio::test]
    async fn test_waits_until_finished() {
        let api = Arc::new(FakeApi::with_polls(vec![
            workflow("w", None),
            workflow("w", Some("Running")),
            workflow("w", Some("Succeeded")),
        ]));
        let mut checker = WorkflowStatusChecker::new(api.clone(), "argo", "w").with_interval(Duration::from_millis(1));
        checker.sync().await.unwrap();
        assert_eq!(checker.current_phase(), None);

        let mut polls = 0;
        let status = checker.wait_with(|_| polls += 1).await.unwrap();
        assert_eq!(status, WorkflowStatus::Succeeded);
        assert_eq!(polls, 2);
        assert_eq!(api.gets(), 3);
    }

    #[tokio::test]
    async fn test_suspended_stops_waiting() {
        let mut suspended = workflow("w", Some("Running"));
        suspended["spec"] = json!({"suspend": true});
        let api = Arc::new(FakeApi::with_polls(vec![suspended]));
        let mut checker = WorkflowStatusChecker::new(api, "argo", "w");
        checker.sync().await.unwrap();
        assert_eq!(checker.status(), WorkflowStatus::Suspended);
        assert_eq!(checker.wait_for_completion().await.unwrap(), WorkflowStatus::Suspended);
    }

    #[tokio::test]
    async fn test_timeout() {
        let api = Arc::new(FakeApi::with_polls(vec![workflow("w", Some("Running"))]));
        let mut checker = WorkflowStatusChecker::new(api, "argo", "w")
            .with_interval(Duration::from_millis(5))
            .with_timeout(Some(Duration::from_millis(20)));
        checker.sync().await.unwrap();
        let err = checker.wait_for_completion().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
    }
}
