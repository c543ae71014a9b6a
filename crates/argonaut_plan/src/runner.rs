//! Task runner.
//!
//! The executable behind a task payload. It parses the invocation rendered
//! by [`crate::script::render_payload`], looks the task up by template
//! name, decodes inputs, runs the task with its hooks and writes every
//! declared output to the file the workflow engine collects.

use std::fs;
use std::path::{Path, PathBuf};

use argonaut_core::{CoreError, CoreResult, sanitize_param};
use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::codec::{InputDecoding, OutputEncoding, ParameterCodec};
use crate::signature::{ModelSchema, TypeHint};
use crate::wrapper::{NodeFunction, Task};

/// One `--input` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArg {
    /// Parameter name
    pub name: String,
    /// How to decode the raw value
    pub decoding: InputDecoding,
    /// Raw value as substituted by the workflow engine
    pub raw: String,
}

/// One `--output` flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArg {
    /// Output name
    pub name: String,
    /// How to encode the result
    pub encoding: OutputEncoding,
    /// File to write
    pub path: PathBuf,
}

/// A parsed `run` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Template name of the task
    pub template: String,
    /// Pre-hook expected by the payload
    pub pre_hook: Option<String>,
    /// Post-hook expected by the payload
    pub post_hook: Option<String>,
    /// Inputs in payload order
    pub inputs: Vec<InputArg>,
    /// Outputs in payload order
    pub outputs: Vec<OutputArg>,
}

impl Invocation {
    /// Parse `run <template> [flags...]`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] for malformed arguments
    pub fn parse<S: AsRef<str>>(args: &[S]) -> CoreResult<Self> {
        let mut args = args.iter().map(AsRef::as_ref);
        match args.next() {
            Some("run") => {}
            other => return Err(malformed(format!("expected 'run', got {:?}", other))),
        }
        let template = args
            .next()
            .ok_or_else(|| malformed("missing template name".to_string()))?;

        let mut invocation = Self {
            template: template.to_string(),
            ..Self::default()
        };
        while let Some(flag) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| malformed(format!("flag '{}' needs a value", flag)))?;
            match flag {
                "--input" => {
                    let (name, codec, raw) = split_directive(value)?;
                    invocation.inputs.push(InputArg {
                        name,
                        decoding: codec.parse()?,
                        raw,
                    });
                }
                "--output" => {
                    let (name, codec, path) = split_directive(value)?;
                    invocation.outputs.push(OutputArg {
                        name,
                        encoding: codec.parse()?,
                        path: PathBuf::from(path),
                    });
                }
                "--pre-hook" => invocation.pre_hook = Some(value.to_string()),
                "--post-hook" => invocation.post_hook = Some(value.to_string()),
                other => return Err(malformed(format!("unknown flag '{}'", other))),
            }
        }
        Ok(invocation)
    }
}

/// Split `name=codec:rest`; `model` and `field` codecs span two segments
fn split_directive(value: &str) -> CoreResult<(String, String, String)> {
    let (name, spec) = value
        .split_once('=')
        .ok_or_else(|| malformed(format!("'{}' is not name=codec:value", value)))?;
    let segments = if spec.starts_with("model:") || spec.starts_with("field:") {
        3
    } else {
        2
    };
    let parts: Vec<&str> = spec.splitn(segments, ':').collect();
    if parts.len() != segments {
        return Err(malformed(format!("'{}' is not name=codec:value", value)));
    }
    let codec = parts[..segments - 1].join(":");
    Ok((name.to_string(), codec, parts[segments - 1].to_string()))
}

fn malformed(message: String) -> CoreError {
    CoreError::Encoding { message }
}

/// Registry of runnable tasks keyed by template name
#[derive(Debug, Default)]
pub struct TaskRunner {
    tasks: IndexMap<String, Task>,
}

impl TaskRunner {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task`
    #[must_use]
    pub fn with(mut self, task: Task) -> Self {
        self.register(task);
        self
    }

    /// Register `task`, replacing any task with the same template name
    pub fn register(&mut self, task: Task) {
        let name = task.definition().template_name();
        debug!(task = %task.definition().name, template = %name, "registered task");
        self.tasks.insert(name, task);
    }

    /// Task registered under `template`
    #[must_use]
    pub fn get(&self, template: &str) -> Option<&Task> {
        self.tasks.get(template)
    }

    /// Registered template names
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Parse and run command-line arguments
    ///
    /// # Errors
    ///
    /// See [`TaskRunner::run`]
    pub fn run_args<S: AsRef<str>>(&self, args: &[S]) -> CoreResult<Json> {
        self.run(&Invocation::parse(args)?)
    }

    /// Run an invocation and write its outputs
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown tasks or hooks, an encoding
    /// error for undecodable inputs, [`CoreError::TaskFailed`] if the task
    /// fails and [`CoreError::Io`] if an output cannot be written
    pub fn run(&self, invocation: &Invocation) -> CoreResult<Json> {
        let task = self.get(&invocation.template).ok_or_else(|| CoreError::Validation {
            field: "template".to_string(),
            reason: format!("no task registered as '{}'", invocation.template),
        })?;
        check_hook("pre-hook", invocation.pre_hook.as_deref(), task.pre_hook().map(|h| h.name()))?;
        check_hook("post-hook", invocation.post_hook.as_deref(), task.post_hook().map(|h| h.name()))?;

        let def = task.definition();
        let mut values = IndexMap::new();
        for input in &invocation.inputs {
            // Template inputs carry sanitised names; catch-all keywords have no parameter
            let param = def.signature.declared().find(|p| sanitize_param(&p.name) == input.name);
            let schema = param.and_then(|p| model_schema(p.annotation.as_ref()));
            let name = param.map_or_else(|| input.name.clone(), |p| p.name.clone());
            values.insert(name, input.decoding.decode(&input.raw, schema)?);
        }
        for param in def.signature.declared() {
            if let (false, Some(default)) = (values.contains_key(&param.name), &param.default) {
                values.insert(param.name.clone(), default.clone());
            }
        }

        info!(task = %def.name, inputs = values.len(), "running task");
        let result = task.run(values)?;

        let codecs = def.output_codecs();
        for output in &invocation.outputs {
            let schema = match codecs.get(&output.name) {
                Some(ParameterCodec::Default(hint)) => model_schema(hint.as_ref()),
                _ => None,
            };
            let contents = output.encoding.encode(&result, schema)?;
            write_output(&output.path, &contents)?;
            debug!(output = %output.name, path = %output.path.display(), "wrote output");
        }
        Ok(result)
    }
}

fn check_hook(kind: &str, requested: Option<&str>, registered: Option<&str>) -> CoreResult<()> {
    if requested == registered {
        return Ok(());
    }
    Err(CoreError::Validation {
        field: kind.to_string(),
        reason: format!("payload expects {:?} but the task has {:?}", requested, registered),
    })
}

fn model_schema(hint: Option<&TypeHint>) -> Option<&ModelSchema> {
    match hint {
        Some(TypeHint::Model(schema)) => Some(schema),
        _ => None,
    }
}

fn write_output(path: &Path, contents: &str) -> CoreResult<()> {
    let io = |e: std::io::Error| CoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, contents).map_err(io)
}
