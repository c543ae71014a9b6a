//! Symbolic references produced while tracing.
//!
//! A reference stands for a value that only exists once the workflow runs:
//! a DAG input parameter, a task output, a loop item or a projection into
//! one of those. Every reference renders to the placeholder syntax the
//! workflow engine substitutes at runtime.

use argonaut_core::{CoreError, CoreResult, NodeId, is_reserved_attribute};
use serde_json::Value as Json;

/// One step of a projection chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Key lookup, `value["key"]`
    Key(String),
    /// Attribute access, `value.attr`
    Attribute(String),
}

impl Segment {
    /// The projected name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(k) | Self::Attribute(k) => k,
        }
    }
}

/// A symbolic value flowing through a traced DAG body
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A constant known at trace time
    Literal {
        /// Argument name the constant was bound to
        name: String,
        /// Constant value
        value: Json,
    },
    /// An input parameter of the enclosing DAG
    Parameter {
        /// Parameter name
        name: String,
        /// Declared default, if any
        default: Option<Json>,
    },
    /// A named output of a traced node
    NodeOutput {
        /// Producing node
        node: NodeId,
        /// Output name
        output: String,
        /// Display name of the producing task
        task: String,
        /// Whether the producing node runs once per loop item
        fan_out: bool,
    },
    /// Key or attribute lookup on another reference
    Projection {
        /// Projected reference
        base: Box<Reference>,
        /// Lookup step
        segment: Segment,
    },
    /// One item of a list reference, used to fan out
    Partition {
        /// Iterated reference
        base: Box<Reference>,
    },
    /// All results of a fanned-out node collected back into a list
    Reduction {
        /// Fanned-out output
        base: Box<Reference>,
    },
    /// A formatted string built from other references
    Expression {
        /// Format template as written
        template: String,
        /// Template with every placeholder rendered
        rendered: String,
        /// References substituted into the template
        args: Vec<Reference>,
    },
    /// First non-empty output among conditionally executed nodes
    Merged {
        /// Candidate outputs, in priority order
        sources: Vec<Reference>,
    },
}

impl Reference {
    /// Constant bound to the argument `name`
    #[must_use]
    pub fn literal(name: impl Into<String>, value: Json) -> Self {
        Self::Literal {
            name: name.into(),
            value,
        }
    }

    /// DAG input parameter
    #[must_use]
    pub fn parameter(name: impl Into<String>, default: Option<Json>) -> Self {
        Self::Parameter {
            name: name.into(),
            default,
        }
    }

    /// Output `output` of node `node`
    #[must_use]
    pub fn node_output(node: NodeId, output: impl Into<String>, task: impl Into<String>, fan_out: bool) -> Self {
        Self::NodeOutput {
            node,
            output: output.into(),
            task: task.into(),
            fan_out,
        }
    }

    /// Project through `segment`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReference`] for reserved attribute names
    pub fn project(self, segment: Segment) -> CoreResult<Self> {
        if let Segment::Attribute(name) = &segment {
            if is_reserved_attribute(name) {
                return Err(CoreError::InvalidReference {
                    attribute: name.clone(),
                });
            }
        }
        Ok(Self::Projection {
            base: Box::new(self),
            segment,
        })
    }

    /// Iterate over this reference
    #[must_use]
    pub fn partition(self) -> Self {
        Self::Partition {
            base: Box::new(self),
        }
    }

    /// Collect a fanned-out output back into a list
    #[must_use]
    pub fn reduction(self) -> Self {
        Self::Reduction {
            base: Box::new(self),
        }
    }

    /// Whether this reference yields one loop item at a time
    #[must_use]
    pub fn is_partition(&self) -> bool {
        match self {
            Self::Partition { .. } => true,
            Self::Projection { base, .. } => base.is_partition(),
            _ => false,
        }
    }

    /// Whether this reference is backed by a node output
    #[must_use]
    pub fn is_node_output(&self) -> bool {
        match self {
            Self::NodeOutput { .. } | Self::Merged { .. } => true,
            Self::Projection { base, .. } | Self::Partition { base } | Self::Reduction { base } => {
                base.is_node_output()
            }
            _ => false,
        }
    }

    /// Whether this reference is an output of a node that runs per loop item
    #[must_use]
    pub fn is_fan_out_output(&self) -> bool {
        match self {
            Self::NodeOutput { fan_out, .. } => *fan_out,
            Self::Projection { base, .. } => base.is_fan_out_output(),
            _ => false,
        }
    }

    /// Dotted key path accumulated along a chain of projections
    #[must_use]
    pub fn key_path(&self) -> Option<String> {
        match self {
            Self::Projection { base, segment } => Some(match base.key_path() {
                Some(prefix) => format!("{}.{}", prefix, segment.as_str()),
                None => segment.as_str().to_string(),
            }),
            _ => None,
        }
    }

    /// The reference a loop iterates over
    ///
    /// For a partition (or a projection of one) this is the underlying list
    /// reference; anything else is its own source.
    #[must_use]
    pub fn partition_source(&self) -> &Reference {
        match self {
            Self::Partition { base } => base.partition_source(),
            Self::Projection { base, .. } if base.is_partition() => base.partition_source(),
            _ => self,
        }
    }

    /// Ids of the nodes this reference depends on
    #[must_use]
    pub fn source_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::NodeOutput { node, .. } => vec![node.clone()],
            Self::Projection { base, .. } | Self::Partition { base } | Self::Reduction { base } => {
                base.source_nodes()
            }
            Self::Merged { sources } => sources.iter().flat_map(Self::source_nodes).collect(),
            Self::Literal { .. } | Self::Parameter { .. } | Self::Expression { .. } => Vec::new(),
        }
    }

    /// Human-readable name of the value behind this reference
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Literal { name, .. } | Self::Parameter { name, .. } => name,
            Self::NodeOutput { output, .. } => output,
            Self::Projection { base, .. } | Self::Partition { base } | Self::Reduction { base } => {
                base.name()
            }
            Self::Expression { .. } => "expression",
            Self::Merged { .. } => "merged",
        }
    }

    /// Raw conditional expression for merged references
    #[must_use]
    pub fn merged_expression(&self) -> Option<String> {
        match self {
            Self::Merged { sources } => Some(merged_expression(sources)),
            _ => None,
        }
    }

    /// Placeholder string substituted by the workflow engine
    #[must_use]
    pub fn path(&self) -> String {
        let key = self.key_path();
        self.render(key.as_deref())
    }

    fn render(&self, key: Option<&str>) -> String {
        match self {
            Self::Partition { .. } => with_item_path(key),
            Self::Projection { base, .. } => base.render(key),
            Self::Reduction { base } => base.path(),
            Self::NodeOutput { node, output, .. } => task_output_path(node.as_str(), output, key),
            Self::Literal { value, .. } => literal_string(value),
            Self::Parameter { name, .. } => parameter_path(name, key),
            Self::Expression { rendered, .. } => rendered.clone(),
            Self::Merged { sources } => format!("{{{{={}}}}}", merged_expression(sources)),
        }
    }
}

/// Render a constant the way it appears in a generated document
///
/// Strings are emitted raw, booleans lowercase, anything structured as
/// compact JSON.
#[must_use]
pub fn literal_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn jsonpath(target: &str, key: &str) -> String {
    format!("{{{{= toJson(jsonpath({}, '$.{}')) }}}}", target, key)
}

fn with_item_path(key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{{{{item.{}}}}}", key),
        None => "{{item}}".to_string(),
    }
}

fn task_output_path(node: &str, output: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => jsonpath(
            &format!("tasks['{}'].outputs.parameters['{}']", node, output),
            key,
        ),
        None => format!("{{{{tasks.{}.outputs.parameters.{}}}}}", node, output),
    }
}

fn parameter_path(name: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => jsonpath(&format!("inputs.parameters['{}']", name), key),
        None => format!("{{{{inputs.parameters.{}}}}}", name),
    }
}

fn merged_expression(sources: &[Reference]) -> String {
    let mut expression = String::new();
    for source in sources {
        if let Reference::NodeOutput { node, output, .. } = source {
            expression.push_str(&format!(
                "tasks['{node}'].outputs != nil  ? tasks['{node}'].outputs.parameters.{output} :  "
            ));
        }
    }
    expression.push_str("nil");
    expression
}
