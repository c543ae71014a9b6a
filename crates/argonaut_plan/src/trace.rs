//! Trace scope.
//!
//! A [`TraceScope`] is threaded through every DAG body. In tracing mode it
//! records one [`Node`] per call; in execution mode calls run for real and
//! the scope only tracks which conditions are active.

use argonaut_core::CoreResult;
use tracing::debug;

use crate::condition::Condition;
use crate::node::Node;

/// Per-pass state shared by the calls of one DAG body
#[derive(Debug)]
pub struct TraceScope {
    tracing: bool,
    nodes: Vec<Node>,
    conditions: Vec<Condition>,
}

impl TraceScope {
    /// Scope that runs calls directly
    #[must_use]
    pub fn execution() -> Self {
        Self {
            tracing: false,
            nodes: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Scope that records calls as nodes
    #[must_use]
    pub fn tracing() -> Self {
        Self {
            tracing: true,
            ..Self::execution()
        }
    }

    /// Whether calls are recorded rather than run
    #[must_use]
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// A fresh scope in the same mode with no nodes and no conditions
    #[must_use]
    pub fn isolated(&self) -> Self {
        Self {
            tracing: self.tracing,
            nodes: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Run `body` with `condition` pushed onto the condition stack
    ///
    /// Outside of tracing the condition is evaluated on entry; calls made
    /// under a false condition return null without running.
    ///
    /// # Errors
    ///
    /// Returns error if the condition cannot be evaluated or `body` fails
    pub fn when<R>(
        &mut self,
        mut condition: Condition,
        body: impl FnOnce(&mut Self) -> CoreResult<R>,
    ) -> CoreResult<R> {
        if !self.tracing {
            let value = condition.resolve()?;
            debug!(condition = %condition, value, "entered condition");
        }
        self.conditions.push(condition);
        let result = body(self);
        self.conditions.pop();
        result
    }

    /// Conditions currently in effect, outermost first
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether every active condition holds
    #[must_use]
    pub fn conditions_hold(&self) -> bool {
        self.conditions.iter().all(|c| c.value().unwrap_or(true))
    }

    /// Nodes recorded so far
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn record(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub(crate) fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

impl Default for TraceScope {
    fn default() -> Self {
        Self::execution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;

    #[test]
    fn test_modes() {
        assert!(!TraceScope::execution().is_tracing());
        assert!(TraceScope::tracing().is_tracing());
        assert!(TraceScope::tracing().isolated().is_tracing());
    }

    #[test]
    fn test_condition_stack_restored() {
        let mut scope = TraceScope::tracing();
        let depth = scope
            .when(Condition::equals(Reference::parameter("a", None), "x"), |s| {
                s.when(Condition::neg(Reference::parameter("b", None)), |s| Ok(s.conditions().len()))
            })
            .unwrap();
        assert_eq!(depth, 2);
        assert!(scope.conditions().is_empty());
    }

    #[test]
    fn test_condition_stack_restored_on_error() {
        let mut scope = TraceScope::execution();
        let result: CoreResult<()> = scope.when(Condition::equals("a", "a"), |_| {
            Err(argonaut_core::CoreError::NestedLoop {
                function: "f".to_string(),
            })
        });
        assert!(result.is_err());
        assert!(scope.conditions().is_empty());
    }

    #[test]
    fn test_execution_evaluates_conditions() {
        let mut scope = TraceScope::execution();
        let held = scope
            .when(Condition::equals("a", "b"), |s| Ok(s.conditions_hold()))
            .unwrap();
        assert!(!held);
        assert!(scope.conditions_hold());
    }

    #[test]
    fn test_isolated_scope_is_empty() {
        let mut scope = TraceScope::tracing();
        let inner = scope
            .when(Condition::neg(true), |s| Ok(s.isolated().conditions().len()))
            .unwrap();
        assert_eq!(inner, 0);
    }
}
