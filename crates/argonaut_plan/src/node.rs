//! Traced nodes and call descriptions.

use std::fmt;

use argonaut_core::{CoreResult, NodeId};
use indexmap::IndexMap;

use crate::condition::Condition;
use crate::reference::Reference;
use crate::trace::TraceScope;
use crate::value::Value;
use crate::wrapper::{Dag, FunctionDef, NodeFunction, Task, WorkflowTemplateRef};

/// Any function that can be called from a DAG body
#[derive(Clone)]
pub enum Callable {
    /// A task running in its own container
    Task(Task),
    /// A nested DAG
    Dag(Dag),
    /// A DAG published as a reusable workflow template
    WorkflowTemplate(WorkflowTemplateRef),
}

impl Callable {
    /// Definition of the wrapped function
    #[must_use]
    pub fn definition(&self) -> &FunctionDef {
        match self {
            Self::Task(t) => t.definition(),
            Self::Dag(d) => d.definition(),
            Self::WorkflowTemplate(w) => w.definition(),
        }
    }

    /// Short kind name used in logs
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Dag(_) => "dag",
            Self::WorkflowTemplate(_) => "workflow-template",
        }
    }

    /// Invoke the wrapped function
    ///
    /// # Errors
    ///
    /// Propagates binding, tracing and execution errors
    pub fn call(&self, scope: &mut TraceScope, call: Call) -> CoreResult<Value> {
        match self {
            Self::Task(t) => t.call(scope, call),
            Self::Dag(d) => d.call(scope, call),
            Self::WorkflowTemplate(w) => w.call(scope, call),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self.definition().name)
    }
}

impl From<Task> for Callable {
    fn from(value: Task) -> Self {
        Self::Task(value)
    }
}

impl From<Dag> for Callable {
    fn from(value: Dag) -> Self {
        Self::Dag(value)
    }
}

impl From<WorkflowTemplateRef> for Callable {
    fn from(value: WorkflowTemplateRef) -> Self {
        Self::WorkflowTemplate(value)
    }
}

/// A call to run after a node finishes, whatever its outcome
#[derive(Debug, Clone)]
pub struct ExitHook {
    callable: Callable,
    call: Call,
}

impl ExitHook {
    /// Run `callable` with `call` on exit
    #[must_use]
    pub fn new(callable: impl Into<Callable>, call: Call) -> Self {
        Self {
            callable: callable.into(),
            call,
        }
    }

    /// The hook function
    #[must_use]
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Arguments for the hook
    #[must_use]
    pub fn call(&self) -> &Call {
        &self.call
    }
}

/// Arguments and compiler options for one invocation
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub(crate) args: Vec<Value>,
    pub(crate) kwargs: IndexMap<String, Value>,
    pub(crate) wait_for: Vec<Value>,
    pub(crate) continue_on_fail: bool,
    pub(crate) exit: Option<Box<ExitHook>>,
}

impl Call {
    /// Call with no arguments
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional arguments
    #[must_use]
    pub fn with_args<V: Into<Value>>(args: impl IntoIterator<Item = V>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append a positional argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Add a keyword argument
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Run only after the nodes behind `value` have finished
    #[must_use]
    pub fn wait_for(mut self, value: impl Into<Value>) -> Self {
        self.wait_for.push(value.into());
        self
    }

    /// Keep the workflow going if this node fails
    #[must_use]
    pub fn continue_on_fail(mut self) -> Self {
        self.continue_on_fail = true;
        self
    }

    /// Attach an exit hook
    #[must_use]
    pub fn exit(mut self, hook: ExitHook) -> Self {
        self.exit = Some(Box::new(hook));
        self
    }
}

/// One traced invocation inside a DAG body
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique step id
    pub id: NodeId,
    /// Display name of the invoked function
    pub name: String,
    /// Invoked function
    pub callable: Callable,
    /// Bound arguments as references
    pub arguments: IndexMap<String, Reference>,
    /// Output references handed back to the caller
    pub outputs: IndexMap<String, Reference>,
    /// Extra upstream dependencies
    pub wait_for: Vec<Reference>,
    /// Conditions active at the call site
    pub conditions: Vec<Condition>,
    /// Whether failure of this node is tolerated
    pub continue_on_fail: bool,
    /// Hook run on exit
    pub exit: Option<ExitHook>,
}

impl Node {
    /// Whether this node fans out over a loop argument
    #[must_use]
    pub fn is_fan_out(&self) -> bool {
        self.arguments.values().any(Reference::is_partition)
    }
}
