//! String expressions and conditional result merging.

use argonaut_core::{CoreError, CoreResult};
use indexmap::IndexMap;

use crate::reference::Reference;
use crate::trace::TraceScope;
use crate::value::Value;

/// A format string over workflow values
///
/// Placeholders are `{}` (next positional), `{0}` (positional index) and
/// `{name}` (keyword). `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    template: String,
    args: Vec<Value>,
    kwargs: IndexMap<String, Value>,
}

impl Expression {
    /// Start a new expression
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: Vec::new(),
            kwargs: IndexMap::new(),
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

    /// Render the expression
    ///
    /// While tracing the result is an expression reference whose rendered
    /// form embeds the placeholders of the referenced values; otherwise it
    /// is the formatted string.
    ///
    /// # Errors
    ///
    /// Returns error on malformed templates, unknown placeholders, or
    /// references outside of tracing
    pub fn render(self, scope: &TraceScope) -> CoreResult<Value> {
        let mut rendered = String::new();
        let mut references = Vec::new();
        let mut next_positional = 0usize;
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    rendered.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    rendered.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => field.push(ch),
                            None => return Err(self.malformed("unterminated placeholder")),
                        }
                    }
                    let value = self.lookup(&field, &mut next_positional)?;
                    if let Value::Ref(r) = value {
                        references.push(r.clone());
                    }
                    if !scope.is_tracing() && value.contains_reference() {
                        return Err(CoreError::Argument {
                            name: field,
                            reason: "a reference has no concrete value outside of tracing".to_string(),
                        });
                    }
                    rendered.push_str(&value.display_string());
                }
                '}' => return Err(self.malformed("single '}' encountered")),
                other => rendered.push(other),
            }
        }

        if scope.is_tracing() {
            Ok(Value::Ref(Reference::Expression {
                template: self.template,
                rendered,
                args: references,
            }))
        } else {
            Ok(Value::from(rendered))
        }
    }

    fn lookup(&self, field: &str, next_positional: &mut usize) -> CoreResult<&Value> {
        let missing = || CoreError::Argument {
            name: field.to_string(),
            reason: format!("no value for placeholder in '{}'", self.template),
        };
        if field.is_empty() {
            let value = self.args.get(*next_positional).ok_or_else(missing)?;
            *next_positional += 1;
            return Ok(value);
        }
        if let Ok(index) = field.parse::<usize>() {
            return self.args.get(index).ok_or_else(missing);
        }
        self.kwargs.get(field).ok_or_else(missing)
    }

    fn malformed(&self, reason: &str) -> CoreError {
        CoreError::Argument {
            name: "expression".to_string(),
            reason: format!("{} in '{}'", reason, self.template),
        }
    }
}

/// Merge the results of calls guarded by mutually exclusive conditions
///
/// While tracing this yields a reference to whichever candidate produced
/// output; otherwise it returns the first non-null value.
///
/// # Errors
///
/// Returns error while tracing if a candidate is not a node output
pub fn merge_conditional_results(
    scope: &TraceScope,
    values: impl IntoIterator<Item = Value>,
) -> CoreResult<Value> {
    if !scope.is_tracing() {
        return Ok(values.into_iter().find(|v| !v.is_null()).unwrap_or_else(Value::null));
    }
    let sources = values
        .into_iter()
        .map(|value| match value {
            Value::Ref(r @ Reference::NodeOutput { .. }) => Ok(r),
            other => Err(CoreError::Argument {
                name: "merge".to_string(),
                reason: format!(
                    "only task or DAG results can be merged, got a value of type [{}]",
                    other.type_name()
                ),
            }),
        })
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Value::Ref(Reference::Merged { sources }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argonaut_core::NodeId;

    fn output(node: &str) -> Value {
        Value::Ref(Reference::node_output(NodeId::from_raw(node), "result", "t", false))
    }

    #[test]
    fn test_execution_format() {
        let scope = TraceScope::execution();
        let out = Expression::new("{} and {name} {{literal}}")
            .arg("a")
            .kwarg("name", 3i64)
            .render(&scope)
            .unwrap();
        assert_eq!(out, Value::from("a and 3 {literal}"));
    }

    #[test]
    fn test_tracing_format_embeds_paths() {
        let scope = TraceScope::tracing();
        let out = Expression::new("hello {0}, {1}")
            .arg(Reference::parameter("name", None))
            .arg(output("t-aaaaa"))
            .render(&scope)
            .unwrap();
        let r = out.as_reference().unwrap();
        assert_eq!(
            r.path(),
            "hello {{inputs.parameters.name}}, {{tasks.t-aaaaa.outputs.parameters.result}}"
        );
        assert!(r.source_nodes().is_empty());
    }

    #[test]
    fn test_format_errors() {
        let scope = TraceScope::execution();
        assert!(Expression::new("{missing}").render(&scope).is_err());
        assert!(Expression::new("{").render(&scope).is_err());
        assert!(Expression::new("}").render(&scope).is_err());
        assert!(
            Expression::new("{}")
                .arg(Reference::parameter("x", None))
                .render(&scope)
                .is_err()
        );
    }

    #[test]
    fn test_merge_execution_picks_first_non_null() {
        let scope = TraceScope::execution();
        let out = merge_conditional_results(&scope, [Value::null(), Value::from("b"), Value::from("c")]).unwrap();
        assert_eq!(out, Value::from("b"));
        assert!(merge_conditional_results(&scope, [Value::null()]).unwrap().is_null());
    }

    #[test]
    fn test_merge_tracing() {
        let scope = TraceScope::tracing();
        let out = merge_conditional_results(&scope, [output("a-11111"), output("b-22222")]).unwrap();
        let r = out.as_reference().unwrap();
        assert!(r.is_node_output());
        assert_eq!(r.source_nodes().len(), 2);
        assert!(merge_conditional_results(&scope, [Value::from("x")]).is_err());
    }
}
