//! Container resource requirements for task templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resource requests and limits, keyed by resource name (`cpu`, `memory`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Guaranteed allocation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    /// Hard ceiling
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirements {
    /// Empty requirements
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set CPU request, e.g. `"500m"`
    #[must_use]
    pub fn with_cpu_request(mut self, quantity: impl Into<String>) -> Self {
        self.requests.insert("cpu".to_string(), quantity.into());
        self
    }

    /// Set CPU limit
    #[must_use]
    pub fn with_cpu_limit(mut self, quantity: impl Into<String>) -> Self {
        self.limits.insert("cpu".to_string(), quantity.into());
        self
    }

    /// Set memory request, e.g. `"256Mi"`
    #[must_use]
    pub fn with_memory_request(mut self, quantity: impl Into<String>) -> Self {
        self.requests.insert("memory".to_string(), quantity.into());
        self
    }

    /// Set memory limit
    #[must_use]
    pub fn with_memory_limit(mut self, quantity: impl Into<String>) -> Self {
        self.limits.insert("memory".to_string(), quantity.into());
        self
    }

    /// Set an arbitrary request, e.g. `nvidia.com/gpu`
    #[must_use]
    pub fn with_request(mut self, resource: impl Into<String>, quantity: impl Into<String>) -> Self {
        self.requests.insert(resource.into(), quantity.into());
        self
    }

    /// Set an arbitrary limit
    #[must_use]
    pub fn with_limit(mut self, resource: impl Into<String>, quantity: impl Into<String>) -> Self {
        self.limits.insert(resource.into(), quantity.into());
        self
    }

    /// Whether nothing is requested or limited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_requirements_new() {
        assert!(ResourceRequirements::new().is_empty());
    }

    #[test]
    fn test_resource_requirements_builders() {
        let res = ResourceRequirements::new()
            .with_cpu_request("500m")
            .with_memory_limit("1Gi")
            .with_limit("nvidia.com/gpu", "1");
        assert_eq!(res.requests["cpu"], "500m");
        assert_eq!(res.limits["memory"], "1Gi");
        assert_eq!(res.limits.len(), 2);
    }

    #[test]
    fn test_resource_requirements_serialization() {
        let res = ResourceRequirements::new().with_memory_request("256Mi");
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json, serde_json::json!({"requests": {"memory": "256Mi"}}));
    }
}
