//! Workflow phases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Phase of a workflow as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// Accepted but not started; also used while the phase is missing
    Pending,
    /// Running
    Running,
    /// Finished successfully
    Succeeded,
    /// A step failed
    Failed,
    /// The controller hit an error
    Error,
    /// Stopped or terminated
    Canceled,
    /// Paused until resumed
    Suspended,
}

impl WorkflowStatus {
    /// Status for an optional raw phase; a missing phase is `Pending`
    #[must_use]
    pub fn from_phase(phase: Option<&str>) -> Self {
        phase.and_then(|p| p.parse().ok()).unwrap_or(Self::Pending)
    }

    /// Whether the workflow can still change phase on its own
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the workflow finished successfully
    #[must_use]
    pub fn is_successful(self) -> bool {
        self == Self::Succeeded
    }

    /// Phase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::Canceled => "Canceled",
            Self::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "canceled" | "cancelled" | "terminated" => Ok(Self::Canceled),
            "suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown workflow phase '{}'", other)),
        }
    }
}
