//! Conditions guarding steps inside a DAG.
//!
//! While tracing a condition only renders to the engine's `when` syntax.
//! When a DAG runs directly, entering a condition evaluates it against real
//! data, and calls made under a false condition are skipped.

use std::cmp::Ordering;
use std::fmt;

use argonaut_core::{CoreError, CoreResult};
use serde_json::Value as Json;

use crate::value::Value;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `!`
    Not,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Not => "!",
        })
    }
}

/// A guard on the steps traced inside it
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    op: Operator,
    operands: Vec<Value>,
    value: Option<bool>,
}

impl Condition {
    fn binary(op: Operator, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self {
            op,
            operands: vec![lhs.into(), rhs.into()],
            value: None,
        }
    }

    /// `lhs == rhs`
    #[must_use]
    pub fn equals(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self::binary(Operator::Eq, lhs, rhs)
    }

    /// `lhs != rhs`
    #[must_use]
    pub fn not_equals(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self::binary(Operator::Ne, lhs, rhs)
    }

    /// `lhs < rhs`
    #[must_use]
    pub fn lt(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self::binary(Operator::Lt, lhs, rhs)
    }

    /// `lhs > rhs`
    #[must_use]
    pub fn gt(lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self::binary(Operator::Gt, lhs, rhs)
    }

    /// `!operand`
    #[must_use]
    pub fn neg(operand: impl Into<Value>) -> Self {
        Self {
            op: Operator::Not,
            operands: vec![operand.into()],
            value: None,
        }
    }

    /// The operator
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// Evaluated truth value, set only outside of tracing
    #[must_use]
    pub fn value(&self) -> Option<bool> {
        self.value
    }

    /// Render in the engine's `when` syntax
    #[must_use]
    pub fn condition_string(&self) -> String {
        match self.operands.as_slice() {
            [operand] => format!(" {} {} ", self.op, operand.display_string()),
            [lhs, rhs] => format!(" {} {} {} ", lhs.display_string(), self.op, rhs.display_string()),
            _ => String::new(),
        }
    }

    /// Evaluate against concrete operands
    ///
    /// # Errors
    ///
    /// Returns error if an operand is still a reference or the operands
    /// cannot be ordered
    pub fn resolve(&mut self) -> CoreResult<bool> {
        let operands: Vec<Json> = self
            .operands
            .iter()
            .cloned()
            .map(Value::into_json)
            .collect::<CoreResult<_>>()?;
        let value = match (self.op, operands.as_slice()) {
            (Operator::Not, [x]) => !truthy(x),
            (Operator::Eq, [a, b]) => json_eq(a, b),
            (Operator::Ne, [a, b]) => !json_eq(a, b),
            (Operator::Lt, [a, b]) => compare(a, b)? == Ordering::Less,
            (Operator::Gt, [a, b]) => compare(a, b)? == Ordering::Greater,
            _ => {
                return Err(CoreError::Argument {
                    name: self.op.to_string(),
                    reason: "wrong number of operands".to_string(),
                });
            }
        };
        self.value = Some(value);
        Ok(value)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.condition_string())
    }
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(a: &Json, b: &Json) -> CoreResult<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| unordered(a, b)),
        (Json::String(x), Json::String(y)) => Ok(x.cmp(y)),
        _ => Err(unordered(a, b)),
    }
}

fn unordered(a: &Json, b: &Json) -> CoreError {
    CoreError::Argument {
        name: "condition".to_string(),
        reason: format!("cannot order {} and {}", a, b),
    }
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;
    use serde_json::json;

    #[test]
    fn test_condition_string_with_reference() {
        let cond = Condition::equals(Reference::parameter("command", None), "hello");
        assert_eq!(cond.condition_string(), " {{inputs.parameters.command}} == hello ");
    }

    #[test]
    fn test_condition_string_literals() {
        assert_eq!(Condition::gt(3i64, 2i64).condition_string(), " 3 > 2 ");
        assert_eq!(Condition::neg(true).condition_string(), " ! true ");
        assert_eq!(
            Condition::not_equals(json!({"a": 1}), "x").condition_string(),
            " {\"a\":1} != x "
        );
    }

    #[test]
    fn test_resolve() {
        assert!(Condition::equals("hello", "hello").resolve().unwrap());
        assert!(!Condition::equals("hello", "bye").resolve().unwrap());
        assert!(Condition::not_equals(1i64, 2i64).resolve().unwrap());
        assert!(Condition::equals(1i64, 1.0).resolve().unwrap());
        assert!(Condition::lt(1i64, 2.5).resolve().unwrap());
        assert!(Condition::gt("b", "a").resolve().unwrap());
        assert!(Condition::neg(false).resolve().unwrap());
        assert!(Condition::neg(json!([])).resolve().unwrap());
    }

    #[test]
    fn test_resolve_errors() {
        assert!(Condition::lt("a", 1i64).resolve().is_err());
        assert!(
            Condition::equals(Reference::parameter("x", None), "a")
                .resolve()
                .is_err()
        );
    }

    #[test]
    fn test_value_recorded() {
        let mut cond = Condition::equals("a", "a");
        assert_eq!(cond.value(), None);
        cond.resolve().unwrap();
        assert_eq!(cond.value(), Some(true));
    }
}
