//! ARGONAUT Planner
//!
//! Trace-based compiler that turns ordinary Rust closures wrapped as tasks
//! and DAGs into workflow engine documents. A DAG body runs once in tracing
//! mode: every task or DAG call inside it records a node and returns a
//! symbolic reference instead of a value. The compiler lowers the recorded
//! nodes into templates and steps. Run the same definitions in execution
//! mode and they simply compute their result.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod collector;
pub mod compiler;
pub mod condition;
pub mod dsl;
pub mod expression;
pub mod graph;
pub mod node;
pub mod properties;
pub mod reference;
pub mod resource;
pub mod runner;
pub mod script;
pub mod signature;
pub mod template;
pub mod trace;
pub mod validate;
pub mod value;
pub mod workflow;
pub mod wrapper;

pub use codec::{InputDecoding, OutputEncoding, ParameterCodec};
pub use collector::TemplateCollector;
pub use compiler::{CompileOptions, Compiler, DEFAULT_ENTRY, DEFAULT_OUTPUT_PREFIX};
pub use condition::{Condition, Operator};
pub use dsl::{dag, task, workflow_template};
pub use expression::{Expression, merge_conditional_results};
pub use graph::{DependencyGraph, Edge, GraphNode};
pub use node::{Call, Callable, ExitHook, Node};
pub use properties::{CommonProperties, DEFAULT_IMAGE, TaskProperties};
pub use reference::{Reference, Segment, literal_string};
pub use resource::ResourceRequirements;
pub use runner::{Invocation, TaskRunner};
pub use signature::{ModelSchema, Param, ParamKind, Signature, TypeHint};
pub use template::{
    Arguments, Backoff, DagTask, DagTemplate, Parameter, RetryStrategy, ScriptTemplate, Template,
    TemplateBody, WorkflowSpec,
};
pub use trace::TraceScope;
pub use validate::{SpecValidator, ValidationError};
pub use value::{Args, Value};
pub use workflow::{
    CronWorkflow, CronWorkflowSpec, DocumentBuilder, Manifest, ObjectMeta, Workflow,
    WorkflowTemplateDocument, load_spec,
};
pub use wrapper::{
    Dag, DagBuilder, FunctionBuilder, FunctionDef, NodeFunction, Task, TaskBuilder, WorkflowTemplateBuilder,
    WorkflowTemplateRef,
};

/// Everything needed to define and compile workflows
pub mod prelude {
    pub use crate::compiler::{CompileOptions, Compiler};
    pub use crate::condition::Condition;
    pub use crate::dsl::{dag, task, workflow_template};
    pub use crate::expression::{Expression, merge_conditional_results};
    pub use crate::node::{Call, Callable, ExitHook};
    pub use crate::reference::Reference;
    pub use crate::resource::ResourceRequirements;
    pub use crate::signature::{ModelSchema, TypeHint};
    pub use crate::codec::ParameterCodec;
    pub use crate::trace::TraceScope;
    pub use crate::value::{Args, Value};
    pub use crate::workflow::{CronWorkflow, DocumentBuilder, Workflow, WorkflowTemplateDocument};
    pub use crate::wrapper::{FunctionBuilder, NodeFunction};
    pub use serde_json::json;
}
