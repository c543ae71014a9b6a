//! Compiler from traced DAG bodies to workflow templates.
//!
//! Compiling an entrypoint traces its body, turns every recorded node into
//! a DAG step and recursively compiles the functions those steps call.
//! Templates are memoized by their content-derived name, so a function
//! called from many places is compiled once.

use std::collections::{BTreeMap, HashMap};

use argonaut_core::{CoreError, CoreResult, NodeId, sanitize_param};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::collector::TemplateCollector;
use crate::condition::Condition;
use crate::node::{Callable, ExitHook, Node};
use crate::reference::{Reference, literal_string};
use crate::script::{PayloadInput, output_paths, payload_inputs, render_payload};
use crate::template::{
    Arguments, ContinueOn, DagTask, DagTemplate, EnvVar, Inputs, LifecycleHook, LifecycleHooks, Outputs,
    Parameter, ScriptTemplate, Template, TemplateBody, TemplateRef, WorkflowSpec,
};
use crate::trace::TraceScope;
use crate::value::{Args, Value};
use crate::wrapper::{Dag, FunctionDef, NodeFunction, Task};

/// Executable the task payload invokes
pub const DEFAULT_ENTRY: &str = "argonaut-task";

/// Directory task outputs are written to
pub const DEFAULT_OUTPUT_PREFIX: &str = "/tmp";

/// Compiler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Reference workflow templates by name instead of inlining them
    pub use_workflow_template_refs: bool,
    /// Task executable invoked by the payload
    pub entry: String,
    /// Interpreter the payload is fed to
    pub command: Vec<String>,
    /// Directory task outputs are written to
    pub output_prefix: String,
}

impl CompileOptions {
    /// Default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_workflow_template_refs: true,
            entry: DEFAULT_ENTRY.to_string(),
            command: vec!["sh".to_string()],
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }

    /// Reference or inline workflow templates
    #[must_use]
    pub fn with_workflow_template_refs(mut self, enabled: bool) -> Self {
        self.use_workflow_template_refs = enabled;
        self
    }

    /// Set the task executable
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Set the payload interpreter
    #[must_use]
    pub fn with_command(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiler for workflow entrypoints
#[derive(Debug)]
pub struct Compiler {
    options: CompileOptions,
    collector: TemplateCollector,
    root: TraceScope,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Compiler {
    /// Create a compiler with `options`
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            collector: TemplateCollector::new(),
            root: TraceScope::tracing(),
        }
    }

    /// Compiler settings
    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `entrypoint` and the optional workflow exit handler
    ///
    /// The template collection is always reset afterwards, also on error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEntrypoint`] for task entrypoints and any
    /// error raised while tracing
    pub fn compile(&mut self, entrypoint: &Callable, on_exit: Option<&Callable>) -> CoreResult<WorkflowSpec> {
        let result = self.compile_pass(entrypoint, on_exit);
        self.collector.clear();
        result
    }

    fn compile_pass(&mut self, entrypoint: &Callable, on_exit: Option<&Callable>) -> CoreResult<WorkflowSpec> {
        let entry = self.compile_dag(entry_dag(entrypoint)?, &[])?;
        let on_exit = match on_exit {
            Some(handler) => Some(self.compile_dag(entry_dag(handler)?, &[])?),
            None => None,
        };
        let templates = self.collector.drain();
        info!(entrypoint = %entry, templates = templates.len(), "compiled workflow");
        Ok(WorkflowSpec {
            entrypoint: entry,
            on_exit,
            arguments: Arguments::default(),
            templates,
        })
    }

    fn compile_dag(&mut self, dag: &Dag, extra_keywords: &[String]) -> CoreResult<String> {
        let def = dag.definition();
        let name = def.template_name();
        if self.is_compiled(def, &name, extra_keywords)? {
            return Ok(name);
        }

        let mut params: IndexMap<String, Value> = def
            .signature
            .declared()
            .map(|p| {
                let reference = Reference::parameter(sanitize_param(&p.name), p.default.clone());
                (p.name.clone(), Value::Ref(reference))
            })
            .collect();
        for keyword in extra_keywords {
            let reference = Reference::parameter(sanitize_param(keyword), None);
            params.insert(keyword.clone(), Value::Ref(reference));
        }

        let mut scope = self.root.isolated();
        let returned = dag.invoke(&mut scope, &Args::new(def.name.clone(), params))?;
        let nodes = scope.into_nodes();
        let outputs = dag_outputs(def, returned)?;

        let labels = step_labels(&nodes);
        let mut tasks = Vec::with_capacity(nodes.len());
        for node in &nodes {
            tasks.push(self.compile_step(node, &labels)?);
        }

        let common = dag.properties();
        let mut template = Template::new(
            name.clone(),
            TemplateBody::Dag(DagTemplate {
                tasks,
                fail_fast: common.fail_fast,
            }),
        );
        template.inputs = template_inputs(def, extra_keywords);
        template.outputs = outputs;
        common.apply(&mut template);

        debug!(template = %name, steps = nodes.len(), "compiled dag template");
        self.collector.add(template);
        Ok(name)
    }

    fn compile_task(&mut self, task: &Task, extra_keywords: &[String]) -> CoreResult<String> {
        let def = task.definition();
        let name = def.template_name();
        if self.is_compiled(def, &name, extra_keywords)? {
            return Ok(name);
        }

        let properties = task.properties();
        let source = render_payload(task, &self.options.entry, &self.options.output_prefix, extra_keywords)?;
        let mut env: Vec<EnvVar> = payload_inputs(task, extra_keywords)?
            .iter()
            .map(PayloadInput::env)
            .collect();
        env.extend(properties.env.iter().cloned());
        let mut template = Template::new(
            name.clone(),
            TemplateBody::Script(ScriptTemplate {
                image: properties.image.clone(),
                command: properties
                    .command
                    .clone()
                    .unwrap_or_else(|| self.options.command.clone()),
                source,
                resources: properties.resources.clone().filter(|r| !r.is_empty()),
                env,
                env_from: properties.env_from.clone(),
                working_dir: properties.working_dir.clone(),
                image_pull_policy: properties.image_pull_policy.clone(),
            }),
        );
        template.inputs = template_inputs(def, extra_keywords);
        template.outputs = Outputs {
            parameters: output_paths(task, &self.options.output_prefix)
                .into_iter()
                .map(|(output, path)| Parameter::from_path(output, path))
                .collect(),
        };
        properties.common.apply(&mut template);

        debug!(template = %name, image = %properties.image, "compiled task template");
        self.collector.add(template);
        Ok(name)
    }

    /// Whether `name` was already compiled; a repeated call must pass the
    /// same catch-all keywords as the first one
    fn is_compiled(&self, def: &FunctionDef, name: &str, extra_keywords: &[String]) -> CoreResult<bool> {
        let Some(template) = self.collector.get(name) else {
            return Ok(false);
        };
        let expected = template_inputs(def, extra_keywords);
        let same = template.inputs.parameters.len() == expected.parameters.len()
            && expected
                .parameters
                .iter()
                .all(|p| template.inputs.parameters.iter().any(|t| t.name == p.name));
        if same {
            return Ok(true);
        }
        let first: Vec<&str> = template
            .inputs
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .filter(|n| def.signature.declared().all(|d| sanitize_param(&d.name) != *n))
            .collect();
        Err(CoreError::ArgumentBinding {
            function: def.name.clone(),
            signature: def.signature.to_string(),
            call: extra_keywords.join(", "),
            reason: format!(
                "catch-all keywords must match across calls, first call passed [{}]",
                first.join(", ")
            ),
        })
    }

    fn compile_step(&mut self, node: &Node, labels: &HashMap<NodeId, String>) -> CoreResult<DagTask> {
        let (template, template_ref) = self.lower(node)?;
        let hooks = match &node.exit {
            Some(hook) => Some(self.compile_exit_hook(hook)?),
            None => None,
        };

        Ok(DagTask {
            name: node.id.to_string(),
            template,
            template_ref,
            dependencies: step_dependencies(node),
            arguments: step_arguments(&node.arguments),
            with_param: node
                .arguments
                .values()
                .find(|r| r.is_partition())
                .map(|r| r.partition_source().path()),
            when: guard(&node.conditions),
            hooks,
            continue_on: node.continue_on_fail.then_some(ContinueOn { failed: true }),
            label: labels.get(&node.id).cloned().unwrap_or_else(|| node.name.clone()),
        })
    }

    fn compile_exit_hook(&mut self, hook: &ExitHook) -> CoreResult<LifecycleHooks> {
        let mut scope = self.root.isolated();
        hook.callable().call(&mut scope, hook.call().clone())?;
        let node = scope.into_nodes().into_iter().next().ok_or_else(|| CoreError::Validation {
            field: "exit hook".to_string(),
            reason: format!("'{}' did not record a call", hook.callable().definition().name),
        })?;
        let (template, template_ref) = self.lower(&node)?;
        Ok(LifecycleHooks {
            exit: LifecycleHook {
                template,
                template_ref,
                arguments: step_arguments(&node.arguments),
            },
        })
    }

    fn lower(&mut self, node: &Node) -> CoreResult<(Option<String>, Option<TemplateRef>)> {
        let extra_keywords = extra_keywords(node);
        match &node.callable {
            Callable::Task(task) => Ok((Some(self.compile_task(task, &extra_keywords)?), None)),
            Callable::Dag(dag) => Ok((Some(self.compile_dag(dag, &extra_keywords)?), None)),
            Callable::WorkflowTemplate(w) if self.options.use_workflow_template_refs => Ok((
                None,
                Some(TemplateRef {
                    name: w.workflow_template_name().to_string(),
                    template: w.definition().template_name(),
                }),
            )),
            Callable::WorkflowTemplate(w) => Ok((Some(self.compile_dag(w.dag(), &extra_keywords)?), None)),
        }
    }
}

fn entry_dag(callable: &Callable) -> CoreResult<&Dag> {
    match callable {
        Callable::Dag(dag) => Ok(dag),
        Callable::WorkflowTemplate(w) => Ok(w.dag()),
        Callable::Task(task) => Err(CoreError::InvalidEntrypoint {
            name: task.definition().name.clone(),
        }),
    }
}

/// Declared parameters followed by the keywords a catch-all collected
fn template_inputs(def: &FunctionDef, extra_keywords: &[String]) -> Inputs {
    let declared = def
        .signature
        .declared()
        .map(|p| Parameter::input(sanitize_param(&p.name), p.default.as_ref().map(literal_string)));
    let extra = extra_keywords.iter().map(|k| Parameter::input(sanitize_param(k), None));
    Inputs {
        parameters: declared.chain(extra).collect(),
    }
}

/// Argument names bound by the callee's catch-all parameter
fn extra_keywords(node: &Node) -> Vec<String> {
    let signature = &node.callable.definition().signature;
    node.arguments
        .keys()
        .filter(|name| signature.get(name).is_none())
        .cloned()
        .collect()
}

fn dag_outputs(def: &FunctionDef, returned: Value) -> CoreResult<Outputs> {
    let unsupported = |found: &str| CoreError::UnsupportedReturnShape {
        function: def.name.clone(),
        found: found.to_string(),
    };
    let returned: Vec<(String, Reference)> = match returned {
        Value::Data(Json::Null) => Vec::new(),
        Value::Ref(r) if r.is_node_output() && !r.is_partition() => vec![("result".to_string(), r)],
        Value::Outputs(map) => map
            .into_iter()
            .map(|(name, value)| match value {
                Value::Ref(r) if r.is_node_output() && !r.is_partition() => Ok((name, r)),
                other => Err(unsupported(other.type_name())),
            })
            .collect::<CoreResult<_>>()?,
        other => return Err(unsupported(other.type_name())),
    };
    Ok(Outputs {
        parameters: returned
            .into_iter()
            .map(|(name, r)| match r.merged_expression() {
                Some(expression) => Parameter::from_expression(name, expression),
                None => Parameter::from_parameter(name, r.path()),
            })
            .collect(),
    })
}

fn step_arguments(arguments: &IndexMap<String, Reference>) -> Arguments {
    Arguments {
        parameters: arguments
            .iter()
            .map(|(name, r)| Parameter::with_value(sanitize_param(name), r.path()))
            .collect(),
    }
}

fn step_dependencies(node: &Node) -> Vec<String> {
    let deps: IndexSet<String> = node
        .arguments
        .values()
        .chain(node.wait_for.iter())
        .flat_map(Reference::source_nodes)
        .map(|id| id.to_string())
        .collect();
    deps.into_iter().collect()
}

fn guard(conditions: &[Condition]) -> Option<String> {
    if conditions.is_empty() {
        return None;
    }
    Some(
        conditions
            .iter()
            .map(Condition::condition_string)
            .collect::<Vec<_>>()
            .join("&&"),
    )
}

/// Readable step labels: the function name, numbered when a DAG calls the
/// same function more than once
fn step_labels(nodes: &[Node]) -> HashMap<NodeId, String> {
    let mut groups: BTreeMap<&str, Vec<&NodeId>> = BTreeMap::new();
    for node in nodes {
        groups.entry(node.name.as_str()).or_default().push(&node.id);
    }
    let mut labels = HashMap::new();
    for (name, ids) in groups {
        if let [id] = ids.as_slice() {
            labels.insert((*id).clone(), name.to_string());
            continue;
        }
        for (i, id) in ids.into_iter().enumerate() {
            labels.insert(id.clone(), format!("{}-{}", name, i + 1));
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ParameterCodec;
    use crate::dsl::{dag, task, workflow_template};
    use crate::expression::{Expression, merge_conditional_results};
    use crate::node::{Call, ExitHook};
    use crate::signature::TypeHint;
    use crate::wrapper::{FunctionBuilder, WorkflowTemplateRef};
    use serde_json::json;

    fn say_hello() -> Task {
        task("say_hello")
            .module("tests::greetings")
            .param("name", TypeHint::Str)
            .body(|a| Ok(json!(format!("hello {}", a.str("name")?))))
    }

    fn say_goodbye() -> Task {
        task("say_goodbye")
            .module("tests::greetings")
            .param("name", TypeHint::Str)
            .body(|a| Ok(json!(format!("goodbye {}", a.str("name")?))))
    }

    fn hello_dag() -> Dag {
        let hello = say_hello();
        dag("hello_dag")
            .param("name", TypeHint::Str)
            .body(move |scope, args| hello.call(scope, Call::new().arg(args.value("name")?)))
    }

    fn compile(entry: impl Into<Callable>) -> CoreResult<WorkflowSpec> {
        Compiler::default().compile(&entry.into(), None)
    }

    fn entry_tasks(spec: &WorkflowSpec) -> &[DagTask] {
        &spec.entry_template().unwrap().dag().unwrap().tasks
    }

    #[test]
    fn test_hello_world() {
        let spec = compile(hello_dag()).unwrap();
        assert_eq!(spec.templates.len(), 2);
        let entry = spec.entry_template().unwrap();
        assert!(entry.name.starts_with("hello-dag-"));
        assert_eq!(entry.inputs.parameters[0].name, "name");
        assert_eq!(
            entry.outputs.parameters[0].value_from.as_ref().unwrap().parameter.as_deref(),
            Some(format!("{{{{tasks.{}.outputs.parameters.result}}}}", entry_tasks(&spec)[0].name).as_str())
        );

        let step = &entry_tasks(&spec)[0];
        assert!(step.name.starts_with("say-hello-"));
        assert_eq!(step.label, "say-hello");
        assert_eq!(step.arguments.parameters[0].value.as_deref(), Some("{{inputs.parameters.name}}"));
        assert!(step.dependencies.is_empty());

        let task_template = spec.template(step.template.as_deref().unwrap()).unwrap();
        let script = task_template.script().unwrap();
        assert_eq!(script.command, vec!["sh"]);
        assert!(script.source.contains(r#"--input 'name=str:'"$ARGONAUT_INPUT_NAME""#));
        assert!(!script.source.contains("{{"));
        assert_eq!(script.env[0].name, "ARGONAUT_INPUT_NAME");
        assert_eq!(script.env[0].value.as_deref(), Some("{{inputs.parameters.name}}"));
        assert_eq!(
            task_template.outputs.parameters[0].value_from.as_ref().unwrap().path.as_deref(),
            Some("/tmp/result.json")
        );
    }

    #[test]
    fn test_children_before_parents() {
        let inner = hello_dag();
        let outer = dag("outer").body(move |scope, _| inner.call(scope, Call::with_args(["x"])));
        let spec = compile(outer).unwrap();
        let names: Vec<&str> = spec.templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names[0].starts_with("say-hello-"));
        assert!(names[1].starts_with("hello-dag-"));
        assert!(names[2].starts_with("outer-"));
        assert_eq!(spec.entrypoint, names[2]);
    }

    #[test]
    fn test_fan_out_fan_in() {
        let generate = task("generate_list")
            .param("partitions", TypeHint::Int)
            .param("partition_size", TypeHint::Int)
            .body(|a| {
                let size = a.i64("partition_size")?;
                Ok(json!((0..a.i64("partitions")?).map(|_| (1..size).collect::<Vec<_>>()).collect::<Vec<_>>()))
            });
        let sum = task("sum_task")
            .param("items", TypeHint::List)
            .body(|a| Ok(json!(a.parse::<Vec<i64>>("items")?.iter().sum::<i64>())));
        let map_reduce = dag("map_reduce")
            .param("partitions", TypeHint::Int)
            .param("partition_size", TypeHint::Int)
            .body(move |scope, args| {
                let list = generate.call(
                    scope,
                    Call::with_args([args.value("partitions")?, args.value("partition_size")?]),
                )?;
                let mut sums = Vec::new();
                for items in list.iter_items()? {
                    sums.push(sum.call(scope, Call::new().arg(items))?);
                }
                sum.call(scope, Call::new().arg(Value::List(sums)))
            });

        let spec = compile(map_reduce.clone()).unwrap();
        let tasks = entry_tasks(&spec);
        assert_eq!(tasks.len(), 3);
        let (split, looped, reduce) = (&tasks[0], &tasks[1], &tasks[2]);
        assert_eq!(looped.arguments.parameters[0].value.as_deref(), Some("{{item}}"));
        assert!(looped.with_param.as_ref().unwrap().contains(&format!("{}.outputs.parameters.result", split.name)));
        assert_eq!(looped.dependencies, vec![split.name.clone()]);
        assert!(
            reduce.arguments.parameters[0]
                .value
                .as_ref()
                .unwrap()
                .contains(&format!("{}.outputs.parameters.result", looped.name))
        );
        assert_eq!(reduce.dependencies, vec![looped.name.clone()]);
        assert_eq!(looped.label, "sum-task-1");
        assert_eq!(reduce.label, "sum-task-2");

        let mut scope = TraceScope::execution();
        let out = map_reduce.call(&mut scope, Call::with_args([7i64, 22i64])).unwrap();
        assert_eq!(out, Value::from(1617i64));
    }

    #[test]
    fn test_loop_over_parameter() {
        let hello = say_hello();
        let greet_all = dag("greet_all").param("names", TypeHint::List).body(move |scope, args| {
            for name in args.value("names")?.iter_items()? {
                hello.call(scope, Call::new().arg(name))?;
            }
            Ok(Value::null())
        });
        let spec = compile(greet_all).unwrap();
        let step = &entry_tasks(&spec)[0];
        assert_eq!(step.with_param.as_deref(), Some("{{inputs.parameters.names}}"));
        assert!(spec.entry_template().unwrap().outputs.is_empty());
    }

    #[test]
    fn test_conditions_and_merge() {
        let (hello, goodbye) = (say_hello(), say_goodbye());
        let command_hello = dag("command_hello")
            .param("command", TypeHint::Str)
            .body(move |scope, args| {
                let command = args.value("command")?;
                let a = scope.when(Condition::equals(command.clone(), "hello"), |s| {
                    hello.call(s, Call::with_args(["james"]))
                })?;
                let b = scope.when(Condition::equals(command.clone(), "goodbye"), |s| {
                    goodbye.call(s, Call::with_args(["james"]))
                })?;
                merge_conditional_results(scope, [a, b])
            });

        let spec = compile(command_hello.clone()).unwrap();
        let tasks = entry_tasks(&spec);
        assert_eq!(tasks[0].when.as_deref(), Some(" {{inputs.parameters.command}} == hello "));
        assert_eq!(tasks[1].when.as_deref(), Some(" {{inputs.parameters.command}} == goodbye "));
        let output = &spec.entry_template().unwrap().outputs.parameters[0];
        let expression = output.value_from.as_ref().unwrap().expression.as_deref().unwrap();
        assert!(expression.contains(&tasks[0].name));
        assert!(expression.ends_with("nil"));

        let mut scope = TraceScope::execution();
        let out = command_hello.call(&mut scope, Call::with_args(["hello"])).unwrap();
        assert_eq!(out, Value::from("hello james"));
        let out = command_hello.call(&mut scope, Call::with_args(["goodbye"])).unwrap();
        assert_eq!(out, Value::from("goodbye james"));
    }

    #[test]
    fn test_nested_conditions_join() {
        let hello = say_hello();
        let nested = dag("nested").param("a", TypeHint::Str).body(move |scope, args| {
            let a = args.value("a")?;
            scope.when(Condition::not_equals(a.clone(), "x"), |s| {
                s.when(Condition::neg(a.clone()), |s| hello.call(s, Call::with_args(["n"])))
            })
        });
        let spec = compile(nested).unwrap();
        assert_eq!(
            entry_tasks(&spec)[0].when.as_deref(),
            Some(" {{inputs.parameters.a}} != x && ! {{inputs.parameters.a}} ")
        );
    }

    #[test]
    fn test_wait_for_and_continue_on() {
        let hello = say_hello();
        let ordered = dag("ordered").body(move |scope, _| {
            let first = hello.call(scope, Call::with_args(["a"]))?;
            hello.call(scope, Call::with_args(["b"]).wait_for(first).continue_on_fail())
        });
        let spec = compile(ordered).unwrap();
        let tasks = entry_tasks(&spec);
        assert_eq!(tasks[1].dependencies, vec![tasks[0].name.clone()]);
        assert_eq!(tasks[1].continue_on, Some(ContinueOn { failed: true }));
        assert_eq!(tasks[0].label, "say-hello-1");
        assert_eq!(tasks[0].template, tasks[1].template);
        assert_eq!(spec.templates.len(), 2);
    }

    #[test]
    fn test_projection_and_expression_arguments() {
        let hello = say_hello();
        let info = task("user_info").body(|_| Ok(json!({"name": "x"})));
        let greet = dag("greet").body(move |scope, _| {
            let user = info.call(scope, Call::new())?;
            let text = Expression::new("dear {}").arg(user.key("name")?).render(scope)?;
            hello.call(scope, Call::new().arg(text))
        });
        let spec = compile(greet).unwrap();
        let tasks = entry_tasks(&spec);
        let value = tasks[1].arguments.parameters[0].value.as_deref().unwrap();
        assert!(value.starts_with("dear {{= toJson(jsonpath(tasks['"));
        assert!(tasks[1].dependencies.is_empty());
    }

    #[test]
    fn test_multiple_outputs_dag() {
        let multi = task("multi")
            .output("message", ParameterCodec::MultipleOutput)
            .output("count", ParameterCodec::MultipleOutput)
            .body(|_| Ok(json!({"message": "hello Brian", "count": 1})));
        let hello = say_hello();
        let wiring = dag("wiring").body(move |scope, _| {
            let out = multi.call(scope, Call::new())?;
            hello.call(scope, Call::new().arg(out.key("message")?))?;
            Ok(out)
        });
        let spec = compile(wiring.clone()).unwrap();
        let entry = spec.entry_template().unwrap();
        let names: Vec<&str> = entry.outputs.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["message", "count"]);
        let tasks = entry_tasks(&spec);
        assert_eq!(
            tasks[1].arguments.parameters[0].value,
            Some(format!("{{{{tasks.{}.outputs.parameters.message}}}}", tasks[0].name))
        );
        let task_template = spec.template(tasks[0].template.as_deref().unwrap()).unwrap();
        assert!(task_template.script().unwrap().source.contains("message=field:message:/tmp/message.json"));

        let mut scope = TraceScope::execution();
        let out = wiring.call(&mut scope, Call::new()).unwrap();
        assert_eq!(out.key("message").unwrap(), Value::from("hello Brian"));
    }

    #[test]
    fn test_name_collision_free() {
        let first = task("say_hello").module("first").body(|_| Ok(Json::Null));
        let second = task("say_hello").module("second").body(|_| Ok(Json::Null));
        let both = dag("both").body(move |scope, _| {
            first.call(scope, Call::new())?;
            second.call(scope, Call::new())
        });
        let spec = compile(both).unwrap();
        assert_eq!(spec.templates.len(), 3);
        let tasks = entry_tasks(&spec);
        assert_ne!(tasks[0].template, tasks[1].template);
    }

    #[test]
    fn test_deterministic_template_names() {
        let entry = Callable::from(hello_dag());
        let mut compiler = Compiler::default();
        let a = compiler.compile(&entry, None).unwrap();
        let b = compiler.compile(&entry, None).unwrap();
        let names = |s: &WorkflowSpec| s.templates.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&a), names(&b));
        assert_eq!(entry_tasks(&a)[0].template, entry_tasks(&b)[0].template);
        assert_ne!(entry_tasks(&a)[0].name, entry_tasks(&b)[0].name);
    }

    #[test]
    fn test_task_entrypoint_rejected() {
        let err = compile(say_hello()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEntrypoint { .. }));
    }

    #[test]
    fn test_unsupported_return_shape() {
        let bad = dag("bad").body(|_, _| Ok(Value::from("literal")));
        let err = compile(bad).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnsupportedReturnShape {
                function: "bad".to_string(),
                found: "str".to_string()
            }
        );
    }

    #[test]
    fn test_collector_cleared_on_error() {
        let hello = say_hello();
        let failing = dag("failing").body(move |scope, _| {
            hello.call(scope, Call::with_args(["a"]))?;
            Err(CoreError::Validation {
                field: "body".to_string(),
                reason: "boom".to_string(),
            })
        });
        let mut compiler = Compiler::default();
        assert!(compiler.compile(&Callable::from(failing), None).is_err());
        assert!(compiler.collector.is_empty());
        let spec = compiler.compile(&Callable::from(hello_dag()), None).unwrap();
        assert_eq!(spec.templates.len(), 2);
    }

    #[test]
    fn test_missing_annotation_fails_compile() {
        let untyped = task("untyped").untyped_param("items").body(|_| Ok(Json::Null));
        let wrapper = dag("wrapper").body(move |scope, _| untyped.call(scope, Call::with_args([1i64])));
        assert!(matches!(compile(wrapper).unwrap_err(), CoreError::MissingAnnotation { .. }));
    }

    #[test]
    fn test_exit_hook_lowered() {
        let hello = say_hello();
        let cleanup = say_goodbye();
        let hooked = dag("hooked").param("name", TypeHint::Str).body(move |scope, args| {
            let hook = ExitHook::new(cleanup.clone(), Call::new().arg(args.value("name")?));
            hello.call(scope, Call::with_args(["a"]).exit(hook))
        });
        let spec = compile(hooked).unwrap();
        let step = &entry_tasks(&spec)[0];
        let exit = &step.hooks.as_ref().unwrap().exit;
        assert!(exit.template.as_deref().unwrap().starts_with("say-goodbye-"));
        assert_eq!(exit.arguments.parameters[0].value.as_deref(), Some("{{inputs.parameters.name}}"));
        assert_eq!(spec.templates.len(), 3);
    }

    fn shared_template() -> WorkflowTemplateRef {
        let hello = say_hello();
        workflow_template("shared_greeting", "shared-greetings")
            .param("name", TypeHint::Str)
            .body(move |scope, args| hello.call(scope, Call::new().arg(args.value("name")?)))
    }

    #[test]
    fn test_workflow_template_reference() {
        let shared = shared_template();
        let expected = shared.definition().template_name();
        let caller = dag("caller").body(move |scope, _| shared.call(scope, Call::with_args(["x"])));
        let spec = compile(caller.clone()).unwrap();
        let step = &entry_tasks(&spec)[0];
        assert_eq!(step.template, None);
        assert_eq!(
            step.template_ref,
            Some(TemplateRef {
                name: "shared-greetings".to_string(),
                template: expected.clone(),
            })
        );
        assert_eq!(spec.templates.len(), 1);

        let inline = Compiler::new(CompileOptions::new().with_workflow_template_refs(false))
            .compile(&Callable::from(caller), None)
            .unwrap();
        assert_eq!(entry_tasks(&inline)[0].template.as_deref(), Some(expected.as_str()));
        assert_eq!(inline.templates.len(), 3);
    }

    #[test]
    fn test_on_exit_handler() {
        let spec = Compiler::default()
            .compile(&Callable::from(hello_dag()), Some(&Callable::from(shared_template())))
            .unwrap();
        let on_exit = spec.on_exit.as_deref().unwrap();
        assert!(on_exit.starts_with("shared-greeting-"));
        assert!(spec.template(on_exit).is_some());
    }

    #[test]
    fn test_step_labels() {
        let hello = say_hello();
        let goodbye = say_goodbye();
        let mixed = dag("mixed").body(move |scope, _| {
            hello.call(scope, Call::with_args(["a"]))?;
            goodbye.call(scope, Call::with_args(["b"]))?;
            hello.call(scope, Call::with_args(["c"]))
        });
        let spec = compile(mixed).unwrap();
        let labels: Vec<&str> = entry_tasks(&spec).iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["say-hello-1", "say-goodbye", "say-hello-2"]);
    }

    #[test]
    fn test_catch_all_keywords_become_inputs() {
        let paint = task("paint").var_kwargs("extra").body(|a| Ok(a.get("color")?.clone()));
        let outer = dag("outer").body(move |scope, _| paint.call(scope, Call::new().kwarg("color", "red")));
        let spec = compile(outer).unwrap();

        let step = &entry_tasks(&spec)[0];
        assert_eq!(step.arguments.parameters[0].name, "color");
        assert_eq!(step.arguments.parameters[0].value.as_deref(), Some("red"));

        let template = spec.template(step.template.as_deref().unwrap()).unwrap();
        let names: Vec<&str> = template.inputs.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["color"]);
        let script = template.script().unwrap();
        assert!(script.source.contains(r#"--input 'color=auto:'"$ARGONAUT_INPUT_COLOR""#));
        assert_eq!(script.env[0].value.as_deref(), Some("{{inputs.parameters.color}}"));
    }

    #[test]
    fn test_catch_all_keywords_must_match_across_calls() {
        let paint = task("paint").var_kwargs("extra").body(|_| Ok(Json::Null));
        let outer = dag("outer").body(move |scope, _| {
            paint.call(scope, Call::new().kwarg("color", "red"))?;
            paint.call(scope, Call::new().kwarg("size", 3_i64))
        });
        let err = compile(outer).unwrap_err();
        assert!(matches!(err, CoreError::ArgumentBinding { .. }));
    }

    #[test]
    fn test_parameter_names_sanitized() {
        let shout = task("shout").param("loud-name", TypeHint::Str).body(|_| Ok(Json::Null));
        let outer = dag("outer").param("user-name", TypeHint::Str).body(move |scope, args| {
            shout.call(scope, Call::new().kwarg("loud-name", args.value("user-name")?))
        });
        let spec = compile(outer).unwrap();
        let entry = spec.entry_template().unwrap();
        assert_eq!(entry.inputs.parameters[0].name, "user_name");

        let step = &entry_tasks(&spec)[0];
        assert_eq!(step.arguments.parameters[0].name, "loud_name");
        assert_eq!(step.arguments.parameters[0].value.as_deref(), Some("{{inputs.parameters.user_name}}"));
        let template = spec.template(step.template.as_deref().unwrap()).unwrap();
        assert_eq!(template.inputs.parameters[0].name, "loud_name");
        assert!(template.script().unwrap().source.contains("'loud_name=str:'"));
    }
}
