//! Structural checks for compiled workflow specs.
//!
//! The compiler produces valid documents by construction; the validator is
//! for documents loaded from disk or edited by hand before submission.

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::template::{DagTemplate, WorkflowSpec};

/// Lowercase RFC 1123 label
static DNS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex")
});

/// Longest valid RFC 1123 label
const MAX_NAME_LEN: usize = 63;

/// A problem found in a workflow spec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No entrypoint set
    #[error("workflow has no entrypoint")]
    MissingEntrypoint,
    /// A referenced template is not in the document
    #[error("template '{name}' referenced by {referrer} is not defined")]
    MissingTemplate {
        /// Missing template
        name: String,
        /// Where it was referenced
        referrer: String,
    },
    /// A step depends on a step that does not exist
    #[error("step '{step}' in '{template}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// DAG template
        template: String,
        /// Step with the dependency
        step: String,
        /// Unknown step
        dependency: String,
    },
    /// A name is not a valid RFC 1123 label
    #[error("'{name}' is not a valid name")]
    InvalidName {
        /// Offending name
        name: String,
    },
    /// Steps depend on each other in a loop
    #[error("cycle in '{template}' involving {steps:?}")]
    Cycle {
        /// DAG template
        template: String,
        /// Steps on the cycle
        steps: Vec<String>,
    },
    /// Two templates share a name
    #[error("template '{name}' is defined more than once")]
    DuplicateTemplate {
        /// Duplicated name
        name: String,
    },
    /// Two steps in one DAG share a name
    #[error("step '{step}' appears more than once in '{template}'")]
    DuplicateStep {
        /// DAG template
        template: String,
        /// Duplicated step
        step: String,
    },
    /// More templates than allowed
    #[error("{count} templates exceed the limit of {max}")]
    TooManyTemplates {
        /// Templates in the document
        count: usize,
        /// Configured limit
        max: usize,
    },
}

/// Validator for workflow specs
#[derive(Debug, Clone)]
pub struct SpecValidator {
    /// Maximum allowed templates (0 = no limit)
    pub max_templates: usize,
    /// Require RFC 1123 template and step names
    pub require_dns_names: bool,
}

impl SpecValidator {
    /// Validator with no template limit that checks names
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_templates: 0,
            require_dns_names: true,
        }
    }

    /// Set maximum template count
    #[must_use]
    pub fn with_max_templates(mut self, max: usize) -> Self {
        self.max_templates = max;
        self
    }

    /// Set whether names must be RFC 1123 labels
    #[must_use]
    pub fn with_require_dns_names(mut self, require: bool) -> Self {
        self.require_dns_names = require;
        self
    }

    /// Validate a spec
    ///
    /// Steps that use a template reference are not resolved; the referenced
    /// workflow template lives in another document.
    ///
    /// # Errors
    ///
    /// Returns every problem found
    pub fn validate(&self, spec: &WorkflowSpec) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let mut names = IndexSet::new();
        for template in &spec.templates {
            if !names.insert(template.name.as_str()) {
                errors.push(ValidationError::DuplicateTemplate {
                    name: template.name.clone(),
                });
            }
            self.check_name(&template.name, &mut errors);
        }

        if spec.entrypoint.is_empty() {
            errors.push(ValidationError::MissingEntrypoint);
        } else if !names.contains(spec.entrypoint.as_str()) {
            errors.push(ValidationError::MissingTemplate {
                name: spec.entrypoint.clone(),
                referrer: "entrypoint".to_string(),
            });
        }
        if let Some(on_exit) = &spec.on_exit {
            if !names.contains(on_exit.as_str()) {
                errors.push(ValidationError::MissingTemplate {
                    name: on_exit.clone(),
                    referrer: "onExit".to_string(),
                });
            }
        }

        for template in &spec.templates {
            if let Some(dag) = template.dag() {
                self.check_dag(&template.name, dag, &names, &mut errors);
            }
        }

        if self.max_templates > 0 && spec.templates.len() > self.max_templates {
            errors.push(ValidationError::TooManyTemplates {
                count: spec.templates.len(),
                max: self.max_templates,
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn check_name(&self, name: &str, errors: &mut Vec<ValidationError>) {
        if self.require_dns_names && !is_dns_label(name) {
            errors.push(ValidationError::InvalidName {
                name: name.to_string(),
            });
        }
    }

    fn check_dag(
        &self,
        template: &str,
        dag: &DagTemplate,
        templates: &IndexSet<&str>,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut steps = IndexSet::new();
        for task in &dag.tasks {
            if !steps.insert(task.name.as_str()) {
                errors.push(ValidationError::DuplicateStep {
                    template: template.to_string(),
                    step: task.name.clone(),
                });
            }
            self.check_name(&task.name, errors);

            let referrer = format!("step '{}' in '{}'", task.name, template);
            match (&task.template, &task.template_ref) {
                (Some(target), _) if !templates.contains(target.as_str()) => {
                    errors.push(ValidationError::MissingTemplate {
                        name: target.clone(),
                        referrer: referrer.clone(),
                    });
                }
                (None, None) => errors.push(ValidationError::MissingTemplate {
                    name: String::new(),
                    referrer: referrer.clone(),
                }),
                _ => {}
            }
            if let Some(hook) = task.hooks.as_ref().and_then(|h| h.exit.template.as_ref()) {
                if !templates.contains(hook.as_str()) {
                    errors.push(ValidationError::MissingTemplate {
                        name: hook.clone(),
                        referrer: format!("exit hook of {}", referrer),
                    });
                }
            }
        }

        let mut known = true;
        for task in &dag.tasks {
            for dependency in &task.dependencies {
                if !steps.contains(dependency.as_str()) {
                    known = false;
                    errors.push(ValidationError::UnknownDependency {
                        template: template.to_string(),
                        step: task.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        if known {
            if let Some(cycle) = find_cycle(dag) {
                errors.push(ValidationError::Cycle {
                    template: template.to_string(),
                    steps: cycle,
                });
            }
        }
    }
}

impl Default for SpecValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `name` is a lowercase RFC 1123 label
#[must_use]
pub fn is_dns_label(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && DNS_LABEL.is_match(name)
}

/// Steps on the first dependency cycle found, in path order
fn find_cycle(dag: &DagTemplate) -> Option<Vec<String>> {
    let deps: IndexMap<&str, Vec<&str>> = dag
        .tasks
        .iter()
        .map(|t| (t.name.as_str(), t.dependencies.iter().map(String::as_str).collect()))
        .collect();
    let mut visited = IndexSet::new();
    let mut path = IndexSet::new();
    for &start in deps.keys() {
        if dfs_cycle(start, &deps, &mut visited, &mut path) {
            return Some(path.iter().map(|s| s.to_string()).collect());
        }
    }
    None
}

fn dfs_cycle<'a>(
    step: &'a str,
    deps: &IndexMap<&'a str, Vec<&'a str>>,
    visited: &mut IndexSet<&'a str>,
    path: &mut IndexSet<&'a str>,
) -> bool {
    if path.contains(step) {
        if let Some(start) = path.get_index_of(step) {
            path.drain(..start);
        }
        return true;
    }
    if !visited.insert(step) {
        return false;
    }
    path.insert(step);
    for &dependency in deps.get(step).into_iter().flatten() {
        if dfs_cycle(dependency, deps, visited, path) {
            return true;
        }
    }
    path.shift_remove(step);
    false
}
