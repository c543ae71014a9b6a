//! Function signatures and argument binding.
//!
//! Binding follows keyword-argument call semantics: positional arguments
//! fill positional-or-keyword parameters in order, keywords match by name,
//! and unmatched keywords land in a variadic keyword parameter if one is
//! declared. Only supplied arguments are bound; defaults are applied
//! separately when a function runs directly.

use std::fmt;

use argonaut_core::{CoreError, CoreResult};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::reference::literal_string;
use crate::value::Value;

/// Shape of a structured parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    /// Model name
    pub name: String,
    /// Fields that must be present
    pub required: Vec<String>,
}

impl ModelSchema {
    /// Create a schema with required fields
    #[must_use]
    pub fn new(name: impl Into<String>, required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Check that `value` is an object carrying every required field
    ///
    /// # Errors
    ///
    /// Returns an encoding error describing the first mismatch
    pub fn check(&self, value: &Json) -> CoreResult<()> {
        let object = value.as_object().ok_or_else(|| CoreError::Encoding {
            message: format!("model '{}' expects an object", self.name),
        })?;
        for field in &self.required {
            if !object.contains_key(field) {
                return Err(CoreError::Encoding {
                    message: format!("model '{}' is missing field '{}'", self.name, field),
                });
            }
        }
        Ok(())
    }
}

/// Type annotation on a parameter or return value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    /// Plain string
    Str,
    /// Integer
    Int,
    /// Float
    Float,
    /// Boolean
    Bool,
    /// List
    List,
    /// Mapping
    Dict,
    /// Structured model type
    Model(ModelSchema),
    /// Anything JSON-shaped
    Any,
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("str"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::List => f.write_str("list"),
            Self::Dict => f.write_str("dict"),
            Self::Model(schema) => f.write_str(&schema.name),
            Self::Any => f.write_str("Any"),
        }
    }
}

/// How a parameter accepts arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Bound by position or by name
    PositionalOrKeyword,
    /// Collects unmatched keyword arguments
    VarKeyword,
}

/// A declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Binding kind
    pub kind: ParamKind,
    /// Default value, `None` when required
    pub default: Option<Json>,
    /// Type annotation
    pub annotation: Option<TypeHint>,
}

impl Param {
    /// Whether a value must be supplied
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.kind == ParamKind::PositionalOrKeyword && self.default.is_none()
    }
}

/// A function signature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Empty signature
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    pub fn push(&mut self, param: Param) {
        self.params.push(param);
    }

    /// All parameters in declaration order
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameters that become template inputs
    pub fn declared(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.kind != ParamKind::VarKeyword)
    }

    /// Look up a declared parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.declared().find(|p| p.name == name)
    }

    fn var_keyword(&self) -> Option<&Param> {
        self.params.iter().find(|p| p.kind == ParamKind::VarKeyword)
    }

    /// Bind call-site arguments to parameter names
    ///
    /// Variadic keywords are flattened into the result after the declared
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ArgumentBinding`] when the call does not match
    pub fn bind(
        &self,
        function: &str,
        args: &[Value],
        kwargs: &IndexMap<String, Value>,
    ) -> CoreResult<IndexMap<String, Value>> {
        let fail = |reason: String| CoreError::ArgumentBinding {
            function: function.to_string(),
            signature: self.to_string(),
            call: render_call(args, kwargs),
            reason,
        };

        let positional: Vec<&Param> = self.declared().collect();
        if args.len() > positional.len() {
            return Err(fail(format!(
                "too many positional arguments, takes {} but {} were given",
                positional.len(),
                args.len()
            )));
        }

        let mut bound: IndexMap<String, Value> = IndexMap::new();
        for (param, arg) in positional.iter().zip(args) {
            bound.insert(param.name.clone(), arg.clone());
        }

        let mut extra = IndexMap::new();
        for (name, value) in kwargs {
            if self.get(name).is_some() {
                if bound.contains_key(name) {
                    return Err(fail(format!("multiple values for argument '{}'", name)));
                }
                bound.insert(name.clone(), value.clone());
            } else if self.var_keyword().is_some() {
                extra.insert(name.clone(), value.clone());
            } else {
                return Err(fail(format!("got an unexpected keyword argument '{}'", name)));
            }
        }

        if let Some(missing) = self.declared().find(|p| p.is_required() && !bound.contains_key(&p.name)) {
            return Err(fail(format!("missing a required argument: '{}'", missing.name)));
        }

        let mut ordered: IndexMap<String, Value> = self
            .declared()
            .filter_map(|p| bound.shift_remove(&p.name).map(|v| (p.name.clone(), v)))
            .collect();
        ordered.extend(extra);
        Ok(ordered)
    }

    /// Fill in declared defaults for parameters that were not supplied
    pub fn apply_defaults(&self, bound: &mut IndexMap<String, Value>) {
        for param in self.declared() {
            if let Some(default) = &param.default {
                if !bound.contains_key(&param.name) {
                    bound.insert(param.name.clone(), Value::Data(default.clone()));
                }
            }
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let mut s = match p.kind {
                    ParamKind::VarKeyword => format!("**{}", p.name),
                    ParamKind::PositionalOrKeyword => p.name.clone(),
                };
                if let Some(hint) = &p.annotation {
                    s.push_str(&format!(": {}", hint));
                }
                if let Some(default) = &p.default {
                    s.push_str(&format!(" = {}", default));
                }
                s
            })
            .collect();
        write!(f, "({})", rendered.join(", "))
    }
}

fn render_call(args: &[Value], kwargs: &IndexMap<String, Value>) -> String {
    let args: Vec<String> = args.iter().map(render_arg).collect();
    let kwargs: Vec<String> = kwargs.keys().cloned().collect();
    format!("args=({}) kwargs=({})", args.join(","), kwargs.join(","))
}

fn render_arg(arg: &Value) -> String {
    match arg {
        Value::Ref(r) => r.name().to_string(),
        Value::Data(j) => literal_string(j),
        other => other.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str, default: Option<Json>) -> Param {
        Param {
            name: name.to_string(),
            kind: ParamKind::PositionalOrKeyword,
            default,
            annotation: Some(TypeHint::Str),
        }
    }

    fn greeting() -> Signature {
        let mut sig = Signature::new();
        sig.push(param("name", None));
        sig.push(param("greeting", Some(json!("hello"))));
        sig
    }

    fn kwargs(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_bind_positional_and_keyword() {
        let bound = greeting()
            .bind("say", &[Value::from("james")], &kwargs(&[("greeting", Value::from("hi"))]))
            .unwrap();
        assert_eq!(bound.keys().collect::<Vec<_>>(), vec!["name", "greeting"]);
    }

    #[test]
    fn test_bind_keeps_declaration_order() {
        let bound = greeting()
            .bind(
                "say",
                &[],
                &kwargs(&[("greeting", Value::from("hi")), ("name", Value::from("james"))]),
            )
            .unwrap();
        assert_eq!(bound.keys().collect::<Vec<_>>(), vec!["name", "greeting"]);
    }

    #[test]
    fn test_bind_only_supplied() {
        let bound = greeting().bind("say", &[Value::from("james")], &IndexMap::new()).unwrap();
        assert_eq!(bound.len(), 1);
        let mut bound = bound;
        greeting().apply_defaults(&mut bound);
        assert_eq!(bound["greeting"], Value::from("hello"));
    }

    #[test]
    fn test_bind_errors() {
        let sig = greeting();
        let err = sig.bind("say", &[], &kwargs(&[("nme", Value::from("x"))])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'say'"));
        assert!(msg.contains("(name: str, greeting: str = \"hello\")"));
        assert!(msg.contains("unexpected keyword argument 'nme'"));

        let err = sig.bind("say", &[], &IndexMap::new()).unwrap_err();
        assert!(err.to_string().contains("missing a required argument: 'name'"));

        let err = sig
            .bind("say", &[Value::from("a")], &kwargs(&[("name", Value::from("b"))]))
            .unwrap_err();
        assert!(err.to_string().contains("multiple values for argument 'name'"));

        let err = sig
            .bind("say", &[Value::from("a"), Value::from("b"), Value::from("c")], &IndexMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("too many positional arguments"));
    }

    #[test]
    fn test_var_keyword_flattened() {
        let mut sig = Signature::new();
        sig.push(param("name", None));
        sig.push(Param {
            name: "kwargs".to_string(),
            kind: ParamKind::VarKeyword,
            default: None,
            annotation: None,
        });
        let bound = sig
            .bind(
                "f",
                &[],
                &kwargs(&[("extra", Value::from(1i64)), ("name", Value::from("x"))]),
            )
            .unwrap();
        assert_eq!(bound.keys().collect::<Vec<_>>(), vec!["name", "extra"]);
        assert_eq!(sig.declared().count(), 1);
        assert_eq!(sig.to_string(), "(name: str, **kwargs)");
    }

    #[test]
    fn test_model_schema_check() {
        let schema = ModelSchema::new("User", ["name"]);
        assert!(schema.check(&json!({"name": "x"})).is_ok());
        assert!(schema.check(&json!({"other": 1})).is_err());
        assert!(schema.check(&json!(3)).is_err());
    }
}
