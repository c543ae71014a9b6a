//! Entry points for defining workflow functions.
//!
//! ```ignore
//! use argonaut_plan::prelude::*;
//!
//! let say_hello = task("say_hello")
//!     .param("name", TypeHint::Str)
//!     .body(|args| Ok(json!(format!("hello {}", args.str("name")?))));
//!
//! let hello = dag("hello").param("name", TypeHint::Str).body(move |scope, args| {
//!     say_hello.call(scope, Call::new().arg(args.value("name")?))
//! });
//! ```
//!
//! Each function's template name is derived from its qualified identity:
//! the definition site by default, or `module::name` when
//! [`FunctionBuilder::module`](crate::wrapper::FunctionBuilder::module) is
//! set.

use std::panic::Location;

use crate::wrapper::{DagBuilder, TaskBuilder, WorkflowTemplateBuilder};

/// Define a task
#[track_caller]
#[must_use]
pub fn task(name: &str) -> TaskBuilder {
    TaskBuilder::new(name, Location::caller())
}

/// Define a DAG
#[track_caller]
#[must_use]
pub fn dag(name: &str) -> DagBuilder {
    DagBuilder::new(name, Location::caller())
}

/// Define a DAG published as the workflow template `workflow_template`
#[track_caller]
#[must_use]
pub fn workflow_template(name: &str, workflow_template: &str) -> WorkflowTemplateBuilder {
    WorkflowTemplateBuilder::new(name, workflow_template, Location::caller())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::{FunctionBuilder, NodeFunction};
    use serde_json::Value as Json;

    #[test]
    fn test_identity_records_definition_site() {
        let t = task("located").body(|_| Ok(Json::Null));
        assert!(t.definition().identity.contains(file!()));
        assert!(t.definition().identity.ends_with("::located"));
    }

    #[test]
    fn test_workflow_template_name() {
        let w = workflow_template("sub", "shared").module("m").body(|_, _| Ok(crate::value::Value::null()));
        assert_eq!(w.workflow_template_name(), "shared");
        assert_eq!(w.definition().identity, "m::sub");
    }
}
