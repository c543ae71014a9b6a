//! Template collection for one compile pass.

use indexmap::IndexMap;

use crate::template::Template;

/// Ordered, de-duplicated set of compiled templates
///
/// Templates are kept in insertion order. The compiler inserts children
/// before parents, so the collected order is a valid post-order.
#[derive(Debug, Default)]
pub struct TemplateCollector {
    templates: IndexMap<String, Template>,
}

impl TemplateCollector {
    /// Empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a template with `name` was already collected
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Collected template named `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Collect `template`; returns `false` if its name was already present
    pub fn add(&mut self, template: Template) -> bool {
        if self.templates.contains_key(&template.name) {
            return false;
        }
        self.templates.insert(template.name.clone(), template);
        true
    }

    /// Number of collected templates
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether nothing was collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Take every collected template, leaving the collector empty
    pub fn drain(&mut self) -> Vec<Template> {
        self.templates.drain(..).map(|(_, t)| t).collect()
    }

    /// Forget every collected template
    pub fn clear(&mut self) {
        self.templates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DagTemplate, TemplateBody};

    fn template(name: &str) -> Template {
        Template::new(name, TemplateBody::Dag(DagTemplate::default()))
    }

    #[test]
    fn test_add_deduplicates() {
        let mut collector = TemplateCollector::new();
        assert!(collector.add(template("a")));
        assert!(!collector.add(template("a")));
        assert!(collector.add(template("b")));
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_drain_keeps_order() {
        let mut collector = TemplateCollector::new();
        collector.add(template("child"));
        collector.add(template("parent"));
        let names: Vec<String> = collector.drain().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["child", "parent"]);
        assert!(collector.is_empty());
    }
}
