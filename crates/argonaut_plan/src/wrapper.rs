//! Workflow function wrappers.
//!
//! [`Task`], [`Dag`] and [`WorkflowTemplateRef`] wrap user functions. Calling
//! one through a [`TraceScope`] either records a node (tracing) or runs the
//! function directly (execution), so a DAG body can be compiled and tested
//! locally without change.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use argonaut_core::{CoreError, CoreResult, NodeId, content_name, sanitize_name};
use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::codec::ParameterCodec;
use crate::node::{Call, Callable, Node};
use crate::properties::{CommonProperties, TaskProperties};
use crate::reference::Reference;
use crate::resource::ResourceRequirements;
use crate::signature::{Param, ParamKind, Signature, TypeHint};
use crate::template::{EnvVar, RetryStrategy};
use crate::trace::TraceScope;
use crate::value::{Args, Value};

/// Task body: decoded arguments in, JSON result out
pub type TaskBody = Arc<dyn Fn(&Args<Json>) -> anyhow::Result<Json> + Send + Sync>;

/// Pre- or post-task hook body
pub type HookBody = Arc<dyn Fn(&Args<Json>) -> anyhow::Result<()> + Send + Sync>;

/// DAG body: wires calls together through the scope
pub type DagBody = Arc<dyn Fn(&mut TraceScope, &Args<Value>) -> CoreResult<Value> + Send + Sync>;

/// Name, identity and signature of a wrapped function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Qualified identity; template names are derived from it
    pub identity: String,
    /// Declared parameters
    pub signature: Signature,
    /// Declared outputs and their codecs
    pub outputs: IndexMap<String, ParameterCodec>,
    /// Explicit input codecs
    pub input_codecs: IndexMap<String, ParameterCodec>,
    /// Return annotation
    pub returns: Option<TypeHint>,
}

impl FunctionDef {
    fn new(name: &str, location: &Location<'_>) -> Self {
        Self {
            name: name.to_string(),
            identity: format!(
                "{}:{}:{}::{}",
                location.file(),
                location.line(),
                location.column(),
                name
            ),
            signature: Signature::new(),
            outputs: IndexMap::new(),
            input_codecs: IndexMap::new(),
            returns: None,
        }
    }

    /// Deterministic template name
    #[must_use]
    pub fn template_name(&self) -> String {
        content_name(&self.name, &self.identity)
    }

    /// Kebab-case display name
    #[must_use]
    pub fn display_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Output codecs, defaulting to a single `result`
    #[must_use]
    pub fn output_codecs(&self) -> IndexMap<String, ParameterCodec> {
        if self.outputs.is_empty() {
            let mut outputs = IndexMap::new();
            outputs.insert("result".to_string(), ParameterCodec::Default(self.returns.clone()));
            outputs
        } else {
            self.outputs.clone()
        }
    }

    /// Codec used for the input `param`
    #[must_use]
    pub fn input_codec(&self, param: &Param) -> ParameterCodec {
        self.input_codecs
            .get(&param.name)
            .cloned()
            .unwrap_or_else(|| ParameterCodec::Default(param.annotation.clone()))
    }
}

/// Something a DAG body can call
pub trait NodeFunction {
    /// Name, identity and signature
    fn definition(&self) -> &FunctionDef;

    /// Record (tracing) or run (execution) one invocation
    ///
    /// # Errors
    ///
    /// Returns binding and tracing errors, or the failure of a directly run
    /// body
    fn call(&self, scope: &mut TraceScope, call: Call) -> CoreResult<Value>;
}

/// Shared builder methods for signatures and template settings
pub trait FunctionBuilder: Sized {
    /// Definition being built
    fn def_mut(&mut self) -> &mut FunctionDef;

    /// Template settings being built
    fn common_mut(&mut self) -> &mut CommonProperties;

    /// Declare an annotated parameter
    #[must_use]
    fn param(mut self, name: &str, hint: TypeHint) -> Self {
        self.def_mut().signature.push(Param {
            name: name.to_string(),
            kind: ParamKind::PositionalOrKeyword,
            default: None,
            annotation: Some(hint),
        });
        self
    }

    /// Declare a parameter without annotation
    #[must_use]
    fn untyped_param(mut self, name: &str) -> Self {
        self.def_mut().signature.push(Param {
            name: name.to_string(),
            kind: ParamKind::PositionalOrKeyword,
            default: None,
            annotation: None,
        });
        self
    }

    /// Declare an annotated parameter with a default
    #[must_use]
    fn param_with_default(mut self, name: &str, hint: TypeHint, default: Json) -> Self {
        self.def_mut().signature.push(Param {
            name: name.to_string(),
            kind: ParamKind::PositionalOrKeyword,
            default: Some(default),
            annotation: Some(hint),
        });
        self
    }

    /// Accept arbitrary keyword arguments
    #[must_use]
    fn var_kwargs(mut self, name: &str) -> Self {
        self.def_mut().signature.push(Param {
            name: name.to_string(),
            kind: ParamKind::VarKeyword,
            default: None,
            annotation: None,
        });
        self
    }

    /// Declare a named output
    #[must_use]
    fn output(mut self, name: &str, codec: ParameterCodec) -> Self {
        self.def_mut().outputs.insert(name.to_string(), codec);
        self
    }

    /// Annotate the return value
    #[must_use]
    fn returns(mut self, hint: TypeHint) -> Self {
        self.def_mut().returns = Some(hint);
        self
    }

    /// Override the codec of an input
    #[must_use]
    fn input_codec(mut self, name: &str, codec: ParameterCodec) -> Self {
        self.def_mut().input_codecs.insert(name.to_string(), codec);
        self
    }

    /// Pin the qualified identity to `module::name` instead of the
    /// definition site
    #[must_use]
    fn module(mut self, module: &str) -> Self {
        let def = self.def_mut();
        def.identity = format!("{}::{}", module, def.name);
        self
    }

    /// Add a pod label
    #[must_use]
    fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_mut().labels.insert(key.into(), value.into());
        self
    }

    /// Add a pod annotation
    #[must_use]
    fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_mut().annotations.insert(key.into(), value.into());
        self
    }

    /// Set the retry policy
    #[must_use]
    fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.common_mut().retry_strategy = Some(strategy);
        self
    }

    /// Limit concurrently running children
    #[must_use]
    fn parallelism(mut self, parallelism: u32) -> Self {
        self.common_mut().parallelism = Some(parallelism);
        self
    }

    /// Set a deadline in seconds
    #[must_use]
    fn active_deadline_seconds(mut self, seconds: u64) -> Self {
        self.common_mut().active_deadline_seconds = Some(seconds);
        self
    }

    /// Add a node selector label
    #[must_use]
    fn node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_mut().node_selector.insert(key.into(), value.into());
        self
    }

    /// Add a pod toleration
    #[must_use]
    fn toleration(mut self, toleration: Json) -> Self {
        self.common_mut().tolerations.push(toleration);
        self
    }

    /// Set pod affinity
    #[must_use]
    fn affinity(mut self, affinity: Json) -> Self {
        self.common_mut().affinity = Some(affinity);
        self
    }

    /// Run pods as `account`
    #[must_use]
    fn service_account_name(mut self, account: impl Into<String>) -> Self {
        self.common_mut().service_account_name = Some(account.into());
        self
    }
}

/// A named hook run around a task body
#[derive(Clone)]
pub struct Hook {
    name: String,
    body: HookBody,
}

impl Hook {
    /// Hook name, rendered into the task payload
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the hook
    ///
    /// # Errors
    ///
    /// Returns the hook's own failure
    pub fn run(&self, args: &Args<Json>) -> anyhow::Result<()> {
        (self.body)(args)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

/// Builder for [`Task`]
pub struct TaskBuilder {
    def: FunctionDef,
    properties: TaskProperties,
    pre_hook: Option<Hook>,
    post_hook: Option<Hook>,
}

impl TaskBuilder {
    pub(crate) fn new(name: &str, location: &Location<'_>) -> Self {
        Self {
            def: FunctionDef::new(name, location),
            properties: TaskProperties::default(),
            pre_hook: None,
            post_hook: None,
        }
    }

    /// Container image
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.properties.image = image.into();
        self
    }

    /// Interpreter the payload is fed to
    #[must_use]
    pub fn command(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.properties.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Resource requirements
    #[must_use]
    pub fn resources(mut self, resources: ResourceRequirements) -> Self {
        self.properties.resources = Some(resources);
        self
    }

    /// Working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.properties.working_dir = Some(dir.into());
        self
    }

    /// Image pull policy
    #[must_use]
    pub fn image_pull_policy(mut self, policy: impl Into<String>) -> Self {
        self.properties.image_pull_policy = Some(policy.into());
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.env.push(EnvVar {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        });
        self
    }

    /// Add an environment source
    #[must_use]
    pub fn env_from(mut self, source: Json) -> Self {
        self.properties.env_from.push(source);
        self
    }

    /// Run `hook` before the body
    #[must_use]
    pub fn pre_hook<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&Args<Json>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pre_hook = Some(Hook {
            name: name.to_string(),
            body: Arc::new(hook),
        });
        self
    }

    /// Run `hook` after the body whenever the pre-hook succeeded
    #[must_use]
    pub fn post_hook<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&Args<Json>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_hook = Some(Hook {
            name: name.to_string(),
            body: Arc::new(hook),
        });
        self
    }

    /// Finish with the task body
    #[must_use]
    pub fn body<F>(self, body: F) -> Task
    where
        F: Fn(&Args<Json>) -> anyhow::Result<Json> + Send + Sync + 'static,
    {
        Task {
            inner: Arc::new(TaskInner {
                def: self.def,
                properties: self.properties,
                body: Arc::new(body),
                pre_hook: self.pre_hook,
                post_hook: self.post_hook,
            }),
        }
    }
}

impl FunctionBuilder for TaskBuilder {
    fn def_mut(&mut self) -> &mut FunctionDef {
        &mut self.def
    }

    fn common_mut(&mut self) -> &mut CommonProperties {
        &mut self.properties.common
    }
}

struct TaskInner {
    def: FunctionDef,
    properties: TaskProperties,
    body: TaskBody,
    pre_hook: Option<Hook>,
    post_hook: Option<Hook>,
}

/// A function run in its own container
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Container settings
    #[must_use]
    pub fn properties(&self) -> &TaskProperties {
        &self.inner.properties
    }

    /// Hook run before the body
    #[must_use]
    pub fn pre_hook(&self) -> Option<&Hook> {
        self.inner.pre_hook.as_ref()
    }

    /// Hook run after the body
    #[must_use]
    pub fn post_hook(&self) -> Option<&Hook> {
        self.inner.post_hook.as_ref()
    }

    /// Run the body with its hooks on concrete arguments
    ///
    /// The post-hook runs whenever the pre-hook succeeded. A body failure
    /// takes precedence over a post-hook failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TaskFailed`] if a hook or the body fails
    pub fn run(&self, values: IndexMap<String, Json>) -> CoreResult<Json> {
        let name = &self.inner.def.name;
        let failed = |err: anyhow::Error| CoreError::TaskFailed {
            task: name.clone(),
            message: format!("{:#}", err),
        };
        let args = Args::new(name.clone(), values);

        if let Some(hook) = &self.inner.pre_hook {
            hook.run(&args).map_err(failed)?;
        }
        let result = (self.inner.body)(&args).map_err(failed);
        let post = match &self.inner.post_hook {
            Some(hook) => hook.run(&args).map_err(failed),
            None => Ok(()),
        };
        let value = result?;
        post?;
        Ok(value)
    }
}

impl NodeFunction for Task {
    fn definition(&self) -> &FunctionDef {
        &self.inner.def
    }

    fn call(&self, scope: &mut TraceScope, call: Call) -> CoreResult<Value> {
        dispatch(scope, Callable::Task(self.clone()), call)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.def.name)
            .field("image", &self.inner.properties.image)
            .finish()
    }
}

/// Builder for [`Dag`]
pub struct DagBuilder {
    def: FunctionDef,
    common: CommonProperties,
}

impl DagBuilder {
    pub(crate) fn new(name: &str, location: &Location<'_>) -> Self {
        Self {
            def: FunctionDef::new(name, location),
            common: CommonProperties::default(),
        }
    }

    /// Stop scheduling new steps once one fails
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.common.fail_fast = Some(fail_fast);
        self
    }

    /// Finish with the DAG body
    #[must_use]
    pub fn body<F>(self, body: F) -> Dag
    where
        F: Fn(&mut TraceScope, &Args<Value>) -> CoreResult<Value> + Send + Sync + 'static,
    {
        Dag {
            inner: Arc::new(DagInner {
                def: self.def,
                common: self.common,
                body: Arc::new(body),
            }),
        }
    }
}

impl FunctionBuilder for DagBuilder {
    fn def_mut(&mut self) -> &mut FunctionDef {
        &mut self.def
    }

    fn common_mut(&mut self) -> &mut CommonProperties {
        &mut self.common
    }
}

struct DagInner {
    def: FunctionDef,
    common: CommonProperties,
    body: DagBody,
}

/// A function composing tasks and other DAGs
#[derive(Clone)]
pub struct Dag {
    inner: Arc<DagInner>,
}

impl Dag {
    /// Template settings
    #[must_use]
    pub fn properties(&self) -> &CommonProperties {
        &self.inner.common
    }

    /// Run the body in `scope`
    ///
    /// # Errors
    ///
    /// Returns whatever the body returns
    pub fn invoke(&self, scope: &mut TraceScope, args: &Args<Value>) -> CoreResult<Value> {
        (self.inner.body)(scope, args)
    }
}

impl NodeFunction for Dag {
    fn definition(&self) -> &FunctionDef {
        &self.inner.def
    }

    fn call(&self, scope: &mut TraceScope, call: Call) -> CoreResult<Value> {
        dispatch(scope, Callable::Dag(self.clone()), call)
    }
}

impl fmt::Debug for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag").field("name", &self.inner.def.name).finish()
    }
}

/// Builder for [`WorkflowTemplateRef`]
pub struct WorkflowTemplateBuilder {
    dag: DagBuilder,
    workflow_template: String,
    namespace: Option<String>,
    arguments: IndexMap<String, Json>,
}

impl WorkflowTemplateBuilder {
    pub(crate) fn new(name: &str, workflow_template: &str, location: &Location<'_>) -> Self {
        Self {
            dag: DagBuilder::new(name, location),
            workflow_template: workflow_template.to_string(),
            namespace: None,
            arguments: IndexMap::new(),
        }
    }

    /// Namespace the workflow template is published in
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Default workflow argument
    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: Json) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Stop scheduling new steps once one fails
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.dag = self.dag.fail_fast(fail_fast);
        self
    }

    /// Finish with the DAG body
    #[must_use]
    pub fn body<F>(self, body: F) -> WorkflowTemplateRef
    where
        F: Fn(&mut TraceScope, &Args<Value>) -> CoreResult<Value> + Send + Sync + 'static,
    {
        WorkflowTemplateRef {
            dag: self.dag.body(body),
            workflow_template: self.workflow_template,
            namespace: self.namespace,
            arguments: self.arguments,
        }
    }
}

impl FunctionBuilder for WorkflowTemplateBuilder {
    fn def_mut(&mut self) -> &mut FunctionDef {
        self.dag.def_mut()
    }

    fn common_mut(&mut self) -> &mut CommonProperties {
        self.dag.common_mut()
    }
}

/// A DAG published as its own workflow template and referenced by name
#[derive(Debug, Clone)]
pub struct WorkflowTemplateRef {
    dag: Dag,
    workflow_template: String,
    namespace: Option<String>,
    arguments: IndexMap<String, Json>,
}

impl WorkflowTemplateRef {
    /// The wrapped DAG
    #[must_use]
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Name of the published workflow template
    #[must_use]
    pub fn workflow_template_name(&self) -> &str {
        &self.workflow_template
    }

    /// Namespace of the published workflow template
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Default workflow arguments
    #[must_use]
    pub fn arguments(&self) -> &IndexMap<String, Json> {
        &self.arguments
    }
}

impl NodeFunction for WorkflowTemplateRef {
    fn definition(&self) -> &FunctionDef {
        self.dag.definition()
    }

    fn call(&self, scope: &mut TraceScope, call: Call) -> CoreResult<Value> {
        dispatch(scope, Callable::WorkflowTemplate(self.clone()), call)
    }
}

fn dispatch(scope: &mut TraceScope, callable: Callable, call: Call) -> CoreResult<Value> {
    if scope.is_tracing() {
        trace_call(scope, callable, call)
    } else {
        execute_call(scope, callable, call)
    }
}

fn trace_call(scope: &mut TraceScope, callable: Callable, call: Call) -> CoreResult<Value> {
    let def = callable.definition().clone();
    let bound = def.signature.bind(&def.name, &call.args, &call.kwargs)?;

    let mut arguments = IndexMap::new();
    for (name, value) in bound {
        let reference = to_reference(&name, fan_in(&name, value)?)?;
        arguments.insert(name, reference);
    }

    let loops = arguments.values().filter(|r| r.is_partition()).count();
    if loops > 1 {
        return Err(CoreError::NestedLoop { function: def.name });
    }

    let id = NodeId::generate(&def.name);
    let display = def.display_name();
    let outputs: IndexMap<String, Reference> = def
        .output_codecs()
        .keys()
        .map(|name| {
            let output = Reference::node_output(id.clone(), name.clone(), display.clone(), loops == 1);
            (name.clone(), output)
        })
        .collect();

    let value = if outputs.len() == 1 {
        outputs.values().next().cloned().map_or_else(Value::null, Value::Ref)
    } else {
        Value::Outputs(
            outputs
                .iter()
                .map(|(name, r)| (name.clone(), Value::Ref(r.clone())))
                .collect(),
        )
    };

    debug!(node = %id, kind = callable.kind_name(), fan_out = loops == 1, "traced call");
    let conditions = scope.conditions().to_vec();
    scope.record(Node {
        id,
        name: display,
        callable,
        arguments,
        outputs,
        wait_for: call.wait_for.iter().flat_map(wait_references).collect(),
        conditions,
        continue_on_fail: call.continue_on_fail,
        exit: call.exit.map(|hook| *hook),
    });
    Ok(value)
}

fn execute_call(scope: &mut TraceScope, callable: Callable, call: Call) -> CoreResult<Value> {
    let def = callable.definition();
    if !scope.conditions_hold() {
        debug!(function = %def.name, "condition does not hold, skipping call");
        return Ok(Value::null());
    }

    let mut bound = def.signature.bind(&def.name, &call.args, &call.kwargs)?;
    def.signature.apply_defaults(&mut bound);

    let outcome = match &callable {
        Callable::Task(task) => {
            let values = bound
                .into_iter()
                .map(|(name, value)| Ok((name, value.into_json()?)))
                .collect::<CoreResult<IndexMap<_, _>>>()?;
            task.run(values).map(Value::Data)
        }
        Callable::Dag(dag) => dag.invoke(scope, &Args::new(def.name.clone(), bound)),
        Callable::WorkflowTemplate(w) => w.dag().invoke(scope, &Args::new(def.name.clone(), bound)),
    };

    let exit = match &call.exit {
        Some(hook) => hook.callable().call(scope, hook.call().clone()).map(|_| ()),
        None => Ok(()),
    };

    match outcome {
        Ok(value) => exit.map(|()| value),
        Err(err) if call.continue_on_fail => {
            warn!(function = %def.name, error = %err, "call failed, continuing");
            exit.map(|()| Value::null())
        }
        Err(err) => Err(err),
    }
}

/// A list holding exactly one fanned-out output collects all of its results
fn fan_in(name: &str, value: Value) -> CoreResult<Value> {
    let items = match value {
        Value::List(items) => items,
        other => return Ok(other),
    };
    if let [Value::Ref(r)] = items.as_slice() {
        if r.is_fan_out_output() {
            return Ok(Value::Ref(r.clone().reduction()));
        }
    }
    if items.iter().any(Value::contains_reference) {
        return Err(CoreError::Argument {
            name: name.to_string(),
            reason: "the list mixes both parameters and node outputs, \
                     build it inside a task instead"
                .to_string(),
        });
    }
    Ok(Value::List(items))
}

fn to_reference(name: &str, value: Value) -> CoreResult<Reference> {
    match value {
        Value::Ref(r) => Ok(r),
        Value::Data(data) => Ok(Reference::literal(name, data)),
        list @ Value::List(_) => Ok(Reference::literal(name, list.into_json()?)),
        Value::Outputs(map) => Err(CoreError::Argument {
            name: name.to_string(),
            reason: format!(
                "a call with several outputs was passed as a whole, select one of [{}]",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }),
    }
}

fn wait_references(value: &Value) -> Vec<Reference> {
    match value {
        Value::Ref(r) if r.is_node_output() => vec![r.clone()],
        Value::List(items) => items.iter().flat_map(wait_references).collect(),
        Value::Outputs(map) => map.values().flat_map(wait_references).collect(),
        _ => Vec::new(),
    }
}
