//! Task payload rendering.
//!
//! A task template's source is a short shell script that invokes the task
//! executable shipped in the image. The executable looks the task up by
//! template name and runs it with decoded inputs, so the generated document
//! never embeds user source code.

use argonaut_core::{CoreResult, sanitize_param};

use crate::codec::InputDecoding;
use crate::template::EnvVar;
use crate::wrapper::{NodeFunction, Task};

/// Prefix of the environment variables carrying input values
pub const INPUT_ENV_PREFIX: &str = "ARGONAUT_INPUT_";

/// An input the payload forwards to the task executable
///
/// The engine substitutes the value into a container environment variable,
/// never into the script text, so values are not re-parsed by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadInput {
    /// Template input name
    pub name: String,
    /// Decoding the executable applies
    pub decoding: InputDecoding,
}

impl PayloadInput {
    /// Environment variable holding the value
    #[must_use]
    pub fn env_var(&self) -> String {
        let suffix: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", INPUT_ENV_PREFIX, suffix)
    }

    /// Container variable bound to the template input
    #[must_use]
    pub fn env(&self) -> EnvVar {
        EnvVar {
            name: self.env_var(),
            value: Some(format!("{{{{inputs.parameters.{}}}}}", self.name)),
            value_from: None,
        }
    }
}

/// Inputs of `task`: declared parameters first, then `extra_keywords`
/// collected by its catch-all parameter
///
/// # Errors
///
/// Returns [`argonaut_core::CoreError::MissingAnnotation`] if an input uses
/// default handling without a type hint
pub fn payload_inputs(task: &Task, extra_keywords: &[String]) -> CoreResult<Vec<PayloadInput>> {
    let def = task.definition();
    let mut inputs = Vec::new();
    for param in def.signature.declared() {
        inputs.push(PayloadInput {
            name: sanitize_param(&param.name),
            decoding: def.input_codec(param).input_directive(&param.name, &def.name)?,
        });
    }
    inputs.extend(extra_keywords.iter().map(|keyword| PayloadInput {
        name: sanitize_param(keyword),
        decoding: InputDecoding::Auto,
    }));
    Ok(inputs)
}

/// Render the payload that runs `task` through `entry`
///
/// # Errors
///
/// See [`payload_inputs`]
pub fn render_payload(task: &Task, entry: &str, output_prefix: &str, extra_keywords: &[String]) -> CoreResult<String> {
    let def = task.definition();
    let template = def.template_name();

    let mut lines = vec![
        "set -eu".to_string(),
        format!("# {} ({})", def.display_name(), def.identity),
    ];

    let mut invocation = vec![format!("{} run {}", entry, template)];
    if let Some(hook) = task.pre_hook() {
        invocation.push(format!("--pre-hook {}", quote(hook.name())));
    }
    if let Some(hook) = task.post_hook() {
        invocation.push(format!("--post-hook {}", quote(hook.name())));
    }
    for input in payload_inputs(task, extra_keywords)? {
        let directive = quote(&format!("{}={}:", input.name, input.decoding));
        invocation.push(format!("--input {}\"${}\"", directive, input.env_var()));
    }
    for (name, codec) in def.output_codecs() {
        let path = codec.artifact_path(output_prefix, &name);
        invocation.push(format!(
            "--output {}",
            quote(&format!("{}={}:{}", name, codec.output_directive(&name), path))
        ));
    }
    lines.push(invocation.join(" \\\n  "));
    Ok(lines.join("\n") + "\n")
}

/// Output file paths of `task`, keyed by output name
#[must_use]
pub fn output_paths(task: &Task, output_prefix: &str) -> Vec<(String, String)> {
    task.definition()
        .output_codecs()
        .iter()
        .map(|(name, codec)| (name.clone(), codec.artifact_path(output_prefix, name)))
        .collect()
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ParameterCodec;
    use crate::dsl::task;
    use crate::signature::TypeHint;
    use crate::wrapper::FunctionBuilder;
    use argonaut_core::CoreError;
    use serde_json::{Value as Json, json};

    #[test]
    fn test_payload_shape() {
        let hello = task("say_hello")
            .param("name", TypeHint::Str)
            .body(|a| Ok(json!(a.str("name")?)));
        let payload = render_payload(&hello, "argonaut-task", "/tmp", &[]).unwrap();
        let template = hello.definition().template_name();
        assert!(payload.starts_with("set -eu\n"));
        assert!(payload.contains(&format!("argonaut-task run {}", template)));
        assert!(payload.contains(r#"--input 'name=str:'"$ARGONAUT_INPUT_NAME""#));
        assert!(!payload.contains("{{"));
        assert!(payload.contains("--output 'result=json:/tmp/result.json'"));
        assert!(!payload.contains("--pre-hook"));
    }

    #[test]
    fn test_payload_hooks_and_field_outputs() {
        let t = task("multi")
            .output("message", ParameterCodec::MultipleOutput)
            .pre_hook("setup", |_| Ok(()))
            .post_hook("teardown", |_| Ok(()))
            .body(|_| Ok(Json::Null));
        let payload = render_payload(&t, "run-task", "/out", &[]).unwrap();
        assert!(payload.contains("--pre-hook 'setup'"));
        assert!(payload.contains("--post-hook 'teardown'"));
        assert!(payload.contains("--output 'message=field:message:/out/message.json'"));
    }

    #[test]
    fn test_payload_requires_annotation() {
        let t = task("sum_task").untyped_param("items").body(|_| Ok(Json::Null));
        let err = render_payload(&t, "argonaut-task", "/tmp", &[]).unwrap_err();
        assert!(matches!(err, CoreError::MissingAnnotation { .. }));

        let t = task("sum_task")
            .untyped_param("items")
            .input_codec("items", ParameterCodec::Json)
            .body(|_| Ok(Json::Null));
        assert!(render_payload(&t, "argonaut-task", "/tmp", &[]).is_ok());
    }

    #[test]
    fn test_inputs_bound_through_env() {
        let t = task("greet")
            .param("user-name", TypeHint::Str)
            .var_kwargs("extra")
            .body(|_| Ok(Json::Null));
        let inputs = payload_inputs(&t, &["color".to_string()]).unwrap();
        let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["user_name", "color"]);
        assert_eq!(inputs[1].decoding, InputDecoding::Auto);
        let env = inputs[0].env();
        assert_eq!(env.name, "ARGONAUT_INPUT_USER_NAME");
        assert_eq!(env.value.as_deref(), Some("{{inputs.parameters.user_name}}"));

        let payload = render_payload(&t, "argonaut-task", "/tmp", &["color".to_string()]).unwrap();
        assert!(payload.contains(r#"--input 'color=auto:'"$ARGONAUT_INPUT_COLOR""#));
    }

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_output_paths() {
        let t = task("t").body(|_| Ok(Json::Null));
        assert_eq!(output_paths(&t, "/tmp"), vec![("result".to_string(), "/tmp/result.json".to_string())]);
    }
}
