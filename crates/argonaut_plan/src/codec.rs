//! Parameter codecs.
//!
//! A codec decides how a task input is decoded from its raw string form and
//! how a task output is encoded into the file the workflow engine collects.
//! The compiler renders codecs as short directives (`str`, `json`,
//! `model:User`, `field:message`) into the task payload; the task runner
//! parses them back.

use std::fmt;
use std::str::FromStr;

use argonaut_core::{CoreError, CoreResult};
use serde_json::Value as Json;

use crate::signature::{ModelSchema, TypeHint};

/// Codec attached to a task parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterCodec {
    /// Type-directed handling driven by the annotation
    Default(Option<TypeHint>),
    /// Plain JSON regardless of annotation
    Json,
    /// One named field of a structured return value
    MultipleOutput,
}

impl ParameterCodec {
    /// Directive for decoding the input `parameter` of `function`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingAnnotation`] for default handling without
    /// a type hint
    pub fn input_directive(&self, parameter: &str, function: &str) -> CoreResult<InputDecoding> {
        match self {
            Self::Default(None) => Err(CoreError::MissingAnnotation {
                parameter: parameter.to_string(),
                function: function.to_string(),
            }),
            Self::Default(Some(hint)) => Ok(InputDecoding::for_hint(hint)),
            Self::Json | Self::MultipleOutput => Ok(InputDecoding::Json),
        }
    }

    /// Directive for encoding the output `output`
    #[must_use]
    pub fn output_directive(&self, output: &str) -> OutputEncoding {
        match self {
            Self::Default(Some(TypeHint::Model(schema))) => OutputEncoding::Model(schema.name.clone()),
            Self::Default(_) | Self::Json => OutputEncoding::Json,
            Self::MultipleOutput => OutputEncoding::Field(output.to_string()),
        }
    }

    /// File the output `output` is written to
    #[must_use]
    pub fn artifact_path(&self, prefix: &str, output: &str) -> String {
        format!("{}/{}.json", prefix.trim_end_matches('/'), output)
    }
}

/// How a raw input string is turned into a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDecoding {
    /// Keep the string as is
    Str,
    /// Parse an integer
    Int,
    /// Parse a float
    Float,
    /// Parse a JSON list
    List,
    /// Parse a JSON object and check it against the named model
    Model(String),
    /// Parse any JSON
    Json,
    /// JSON when the value parses, the plain string otherwise
    Auto,
}

impl InputDecoding {
    /// Decoding selected by a type hint
    #[must_use]
    pub fn for_hint(hint: &TypeHint) -> Self {
        match hint {
            TypeHint::Str => Self::Str,
            TypeHint::Int => Self::Int,
            TypeHint::Float => Self::Float,
            TypeHint::List => Self::List,
            TypeHint::Model(schema) => Self::Model(schema.name.clone()),
            TypeHint::Bool | TypeHint::Dict | TypeHint::Any => Self::Json,
        }
    }

    /// Decode a raw value
    ///
    /// `schema` is consulted for model decoding only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if the raw value does not parse
    pub fn decode(&self, raw: &str, schema: Option<&ModelSchema>) -> CoreResult<Json> {
        let bad = |expected: &str| CoreError::Encoding {
            message: format!("cannot decode '{}' as {}", raw, expected),
        };
        match self {
            Self::Str => Ok(Json::String(raw.to_string())),
            Self::Int => raw.trim().parse::<i64>().map(Json::from).map_err(|_| bad("int")),
            Self::Float => raw.trim().parse::<f64>().map(Json::from).map_err(|_| bad("float")),
            Self::List => match serde_json::from_str::<Json>(raw) {
                Ok(list @ Json::Array(_)) => Ok(list),
                _ => Err(bad("list")),
            },
            Self::Model(name) => {
                let value: Json = serde_json::from_str(raw).map_err(|_| bad(name))?;
                if let Some(schema) = schema {
                    schema.check(&value)?;
                }
                Ok(value)
            }
            Self::Json => serde_json::from_str(raw).map_err(|_| bad("json")),
            Self::Auto => Ok(serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))),
        }
    }
}

impl fmt::Display for InputDecoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("str"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::List => f.write_str("list"),
            Self::Model(name) => write!(f, "model:{}", name),
            Self::Json => f.write_str("json"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

impl FromStr for InputDecoding {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "list" => Ok(Self::List),
            "json" => Ok(Self::Json),
            "auto" => Ok(Self::Auto),
            other => match other.strip_prefix("model:") {
                Some(name) if !name.is_empty() => Ok(Self::Model(name.to_string())),
                _ => Err(CoreError::Encoding {
                    message: format!("unknown input codec '{}'", other),
                }),
            },
        }
    }
}

/// How a task result is written to an output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEncoding {
    /// Whole result as JSON
    Json,
    /// Whole result, checked against the named model
    Model(String),
    /// One field of a structured result
    Field(String),
}

impl OutputEncoding {
    /// Encode `result` into the file contents
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encoding`] if the result does not have the
    /// expected shape
    pub fn encode(&self, result: &Json, schema: Option<&ModelSchema>) -> CoreResult<String> {
        match self {
            Self::Json => Ok(serde_json::to_string(result)?),
            Self::Model(_) => {
                if let Some(schema) = schema {
                    schema.check(result)?;
                }
                Ok(serde_json::to_string(result)?)
            }
            Self::Field(name) => {
                let field = result.get(name).ok_or_else(|| CoreError::Encoding {
                    message: format!("result has no field '{}'", name),
                })?;
                Ok(serde_json::to_string(field)?)
            }
        }
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Model(name) => write!(f, "model:{}", name),
            Self::Field(name) => write!(f, "field:{}", name),
        }
    }
}

impl FromStr for OutputEncoding {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "json" {
            return Ok(Self::Json);
        }
        if let Some(name) = s.strip_prefix("model:").filter(|n| !n.is_empty()) {
            return Ok(Self::Model(name.to_string()));
        }
        if let Some(name) = s.strip_prefix("field:").filter(|n| !n.is_empty()) {
            return Ok(Self::Field(name.to_string()));
        }
        Err(CoreError::Encoding {
            message: format!("unknown output codec '{}'", s),
        })
    }
}
