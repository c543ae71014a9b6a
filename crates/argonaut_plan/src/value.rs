//! Values passed between workflow functions.
//!
//! While tracing, DAG bodies juggle [`Reference`]s; while executing
//! directly they hold concrete JSON data. [`Value`] covers both so the same
//! body works in either mode.

use argonaut_core::{CoreError, CoreResult, is_reserved_attribute};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::reference::{Reference, Segment, literal_string};

/// A value flowing through a DAG body
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Concrete data
    Data(Json),
    /// Symbolic reference to a runtime value
    Ref(Reference),
    /// A list that may mix data and references
    List(Vec<Value>),
    /// Named outputs of a multi-output task call
    Outputs(IndexMap<String, Value>),
}

impl Value {
    /// The null value
    #[must_use]
    pub fn null() -> Self {
        Self::Data(Json::Null)
    }

    /// Whether this is null data
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(Json::Null))
    }

    /// The reference, if this is one
    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The data, if this is concrete
    #[must_use]
    pub fn as_data(&self) -> Option<&Json> {
        match self {
            Self::Data(j) => Some(j),
            _ => None,
        }
    }

    /// Whether a reference appears anywhere inside this value
    #[must_use]
    pub fn contains_reference(&self) -> bool {
        match self {
            Self::Data(_) => false,
            Self::Ref(_) => true,
            Self::List(items) => items.iter().any(Self::contains_reference),
            Self::Outputs(map) => map.values().any(Self::contains_reference),
        }
    }

    /// Short description of the value's shape, used in error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Data(Json::Null) => "null",
            Self::Data(Json::Bool(_)) => "bool",
            Self::Data(Json::Number(_)) => "number",
            Self::Data(Json::String(_)) => "str",
            Self::Data(Json::Array(_)) => "list",
            Self::Data(Json::Object(_)) => "dict",
            Self::Ref(_) => "reference",
            Self::List(_) => "list",
            Self::Outputs(_) => "outputs",
        }
    }

    /// Key lookup, `value["key"]`
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be indexed by `key`
    pub fn key(&self, key: &str) -> CoreResult<Value> {
        self.lookup(Segment::Key(key.to_string()))
    }

    /// Attribute access, `value.attr`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReference`] for reserved names and an
    /// argument error if the value has no such attribute
    pub fn attr(&self, name: &str) -> CoreResult<Value> {
        if is_reserved_attribute(name) {
            return Err(CoreError::InvalidReference {
                attribute: name.to_string(),
            });
        }
        self.lookup(Segment::Attribute(name.to_string()))
    }

    fn lookup(&self, segment: Segment) -> CoreResult<Value> {
        let name = segment.as_str().to_string();
        match self {
            Self::Ref(r) => Ok(Self::Ref(r.clone().project(segment)?)),
            Self::Outputs(map) => map.get(&name).cloned().ok_or_else(|| CoreError::Argument {
                name: name.clone(),
                reason: format!(
                    "no such output, available outputs are [{}]",
                    map.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            }),
            Self::Data(Json::Object(map)) => Ok(Self::Data(map.get(&name).cloned().unwrap_or(Json::Null))),
            Self::Data(Json::Array(items)) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .map(Self::Data)
                .ok_or_else(|| CoreError::Argument {
                    name,
                    reason: "list index out of range".to_string(),
                }),
            Self::List(items) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .ok_or_else(|| CoreError::Argument {
                    name,
                    reason: "list index out of range".to_string(),
                }),
            other => Err(CoreError::Argument {
                name,
                reason: format!("a value of type [{}] cannot be indexed", other.type_name()),
            }),
        }
    }

    /// Items to iterate over
    ///
    /// A reference yields exactly one partition item, which makes the loop
    /// body run once while tracing; data yields its real elements.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not iterable
    pub fn iter_items(&self) -> CoreResult<Vec<Value>> {
        match self {
            Self::Ref(r) => Ok(vec![Self::Ref(r.clone().partition())]),
            Self::Data(Json::Array(items)) => Ok(items.iter().cloned().map(Self::Data).collect()),
            Self::List(items) => Ok(items.clone()),
            other => Err(CoreError::Argument {
                name: "iterable".to_string(),
                reason: format!("a value of type [{}] is not iterable", other.type_name()),
            }),
        }
    }

    /// Convert into plain JSON
    ///
    /// # Errors
    ///
    /// Returns error if a reference is still embedded in the value
    pub fn into_json(self) -> CoreResult<Json> {
        match self {
            Self::Data(j) => Ok(j),
            Self::List(items) => Ok(Json::Array(
                items.into_iter().map(Self::into_json).collect::<CoreResult<_>>()?,
            )),
            Self::Outputs(map) => Ok(Json::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_json()?)))
                    .collect::<CoreResult<_>>()?,
            )),
            Self::Ref(r) => Err(CoreError::Argument {
                name: r.name().to_string(),
                reason: "a reference has no concrete value outside of tracing".to_string(),
            }),
        }
    }

    /// Text used when the value is spliced into a string
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Data(j) => literal_string(j),
            Self::Ref(r) => r.path(),
            Self::List(items) => format!(
                "[{}]",
                items.iter().map(Self::display_string).collect::<Vec<_>>().join(",")
            ),
            Self::Outputs(map) => format!(
                "{{{}}}",
                map.iter()
                    .map(|(k, v)| format!("{}:{}", k, v.display_string()))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        Self::Data(value)
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Self::Ref(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Data(Json::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Data(Json::String(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Data(Json::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Data(Json::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Data(Json::Bool(value))
    }
}

/// Arguments bound to a function invocation, by parameter name
#[derive(Debug, Clone, PartialEq)]
pub struct Args<T> {
    function: String,
    values: IndexMap<String, T>,
}

impl<T> Args<T> {
    /// Wrap bound values for `function`
    #[must_use]
    pub fn new(function: impl Into<String>, values: IndexMap<String, T>) -> Self {
        Self {
            function: function.into(),
            values,
        }
    }

    /// Look up an argument
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingArgument`] if `name` was not bound
    pub fn get(&self, name: &str) -> CoreResult<&T> {
        self.values.get(name).ok_or_else(|| CoreError::MissingArgument {
            function: self.function.clone(),
            name: name.to_string(),
        })
    }

    /// Whether `name` was bound
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bound arguments in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.values.iter()
    }

    /// Number of bound arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name of the invoked function
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Unwrap the bound values
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, T> {
        self.values
    }
}

impl Args<Json> {
    /// String argument
    ///
    /// # Errors
    ///
    /// Returns error if missing or not a string
    pub fn str(&self, name: &str) -> CoreResult<&str> {
        self.get(name)?.as_str().ok_or_else(|| self.wrong_type(name, "str"))
    }

    /// Integer argument
    ///
    /// # Errors
    ///
    /// Returns error if missing or not an integer
    pub fn i64(&self, name: &str) -> CoreResult<i64> {
        self.get(name)?.as_i64().ok_or_else(|| self.wrong_type(name, "int"))
    }

    /// Float argument, integers are widened
    ///
    /// # Errors
    ///
    /// Returns error if missing or not a number
    pub fn f64(&self, name: &str) -> CoreResult<f64> {
        self.get(name)?.as_f64().ok_or_else(|| self.wrong_type(name, "float"))
    }

    /// Boolean argument
    ///
    /// # Errors
    ///
    /// Returns error if missing or not a boolean
    pub fn bool(&self, name: &str) -> CoreResult<bool> {
        self.get(name)?.as_bool().ok_or_else(|| self.wrong_type(name, "bool"))
    }

    /// Deserialize an argument into `D`
    ///
    /// # Errors
    ///
    /// Returns error if missing or the shape does not match
    pub fn parse<D: DeserializeOwned>(&self, name: &str) -> CoreResult<D> {
        serde_json::from_value(self.get(name)?.clone()).map_err(|e| CoreError::Argument {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn wrong_type(&self, name: &str, expected: &str) -> CoreError {
        CoreError::Argument {
            name: name.to_string(),
            reason: format!("'{}' expected a value of type [{}]", self.function, expected),
        }
    }
}

impl Args<Value> {
    /// Owned copy of an argument
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingArgument`] if `name` was not bound
    pub fn value(&self, name: &str) -> CoreResult<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argonaut_core::NodeId;
    use serde_json::json;

    fn output() -> Value {
        Value::Ref(Reference::node_output(NodeId::from_raw("t-abcde"), "result", "t", false))
    }

    #[test]
    fn test_key_on_reference_projects() {
        let v = output().key("items").unwrap();
        let r = v.as_reference().unwrap();
        assert_eq!(r.key_path().as_deref(), Some("items"));
    }

    #[test]
    fn test_attr_rejects_reserved() {
        assert!(matches!(output().attr("__dict__"), Err(CoreError::InvalidReference { .. })));
        assert!(matches!(
            Value::from(json!({"a": 1})).attr("__class__"),
            Err(CoreError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_key_on_data() {
        let v = Value::from(json!({"message": "hello"}));
        assert_eq!(v.key("message").unwrap(), Value::from("hello"));
        assert!(v.key("missing").unwrap().is_null());
        assert_eq!(Value::from(json!([1, 2])).key("1").unwrap(), Value::from(json!(2)));
    }

    #[test]
    fn test_key_on_outputs() {
        let mut map = IndexMap::new();
        map.insert("message".to_string(), Value::from("hi"));
        let v = Value::Outputs(map);
        assert_eq!(v.key("message").unwrap(), Value::from("hi"));
        let err = v.key("nope").unwrap_err();
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn test_iter_reference_yields_single_partition() {
        let items = output().iter_items().unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].as_reference().unwrap().is_partition());
    }

    #[test]
    fn test_iter_data() {
        let items = Value::from(json!([1, 2, 3])).iter_items().unwrap();
        assert_eq!(items.len(), 3);
        assert!(Value::from(3i64).iter_items().is_err());
    }

    #[test]
    fn test_into_json() {
        let v = Value::List(vec![Value::from(1i64), Value::from("a")]);
        assert_eq!(v.into_json().unwrap(), json!([1, "a"]));
        assert!(output().into_json().is_err());
    }

    #[test]
    fn test_contains_reference() {
        assert!(Value::List(vec![Value::from(1i64), output()]).contains_reference());
        assert!(!Value::from(json!([1])).contains_reference());
    }

    #[test]
    fn test_args_accessors() {
        let mut values = IndexMap::new();
        values.insert("name".to_string(), json!("james"));
        values.insert("count".to_string(), json!(3));
        let args = Args::new("say_hello", values);
        assert_eq!(args.str("name").unwrap(), "james");
        assert_eq!(args.i64("count").unwrap(), 3);
        assert_eq!(args.f64("count").unwrap(), 3.0);
        assert!(args.str("count").is_err());
        assert!(matches!(args.get("other"), Err(CoreError::MissingArgument { .. })));
        let n: u32 = args.parse("count").unwrap();
        assert_eq!(n, 3);
    }
}
