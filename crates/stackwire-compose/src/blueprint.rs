//! Blueprints: ordered section lists that define one kind of stack.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use stackwire_common::error::{Result, StackwireError};

use crate::blueprints;
use crate::section::Section;

/// A named recipe for a stack.
pub trait Blueprint: Send + Sync {
    /// Name deployment files refer to.
    fn name(&self) -> &str;

    /// Dotted variable paths that must be present before any section runs.
    fn required_variables(&self) -> &[&str];

    /// Sections in the order they run.
    fn sections(&self) -> &[Box<dyn Section>];
}

/// A blueprint assembled from a list of sections.
pub struct SectionedBlueprint {
    name: String,
    required: Vec<&'static str>,
    sections: Vec<Box<dyn Section>>,
}

impl SectionedBlueprint {
    /// An empty blueprint.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Declares required variables.
    #[must_use]
    pub fn require(mut self, paths: &[&'static str]) -> Self {
        self.required.extend_from_slice(paths);
        self
    }

    /// Appends a section.
    #[must_use]
    pub fn section(mut self, section: impl Section + 'static) -> Self {
        self.sections.push(Box::new(section));
        self
    }
}

impl fmt::Debug for SectionedBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: Vec<&str> = self.sections.iter().map(|s| s.name()).collect();
        f.debug_struct("SectionedBlueprint")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("sections", &sections)
            .finish()
    }
}

impl Blueprint for SectionedBlueprint {
    fn name(&self) -> &str {
        &self.name
    }

    fn required_variables(&self) -> &[&str] {
        &self.required
    }

    fn sections(&self) -> &[Box<dyn Section>] {
        &self.sections
    }
}

/// Blueprints by name.
#[derive(Clone, Default)]
pub struct BlueprintRegistry {
    blueprints: BTreeMap<String, Arc<dyn Blueprint>>,
}

impl BlueprintRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in blueprints.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(blueprints::api::blueprint());
        registry.register(blueprints::integrations::blueprint());
        registry.register(blueprints::lambdas::blueprint());
        registry.register(blueprints::jobs::blueprint());
        registry
    }

    /// Adds or replaces a blueprint under its own name.
    pub fn register(&mut self, blueprint: impl Blueprint + 'static) {
        let name = blueprint.name().to_string();
        if self.blueprints.insert(name.clone(), Arc::new(blueprint)).is_some() {
            tracing::debug!(blueprint = %name, "replaced registered blueprint");
        }
    }

    /// Looks up a blueprint.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the known blueprints if `name` is unknown.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Blueprint>> {
        self.blueprints
            .get(name)
            .cloned()
            .ok_or_else(|| StackwireError::Config {
                message: format!(
                    "unknown blueprint \"{name}\" (known: {})",
                    self.names().join(", ")
                ),
            })
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.blueprints.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for BlueprintRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueprintRegistry")
            .field("blueprints", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::section;

    #[test]
    fn builtins_are_registered() {
        let registry = BlueprintRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["api", "integrations", "jobs", "lambdas"]);
    }

    #[test]
    fn unknown_blueprint_lists_known_names() {
        let registry = BlueprintRegistry::with_builtins();
        let err = registry.get("queues").err().expect("error");
        assert!(err.to_string().contains("api, integrations"), "got: {err}");
    }

    #[test]
    fn sections_keep_declaration_order() {
        let blueprint = SectionedBlueprint::new("custom")
            .require(&["env-dict.Name"])
            .section(section("second", |_| Ok(())))
            .section(section("first", |_| Ok(())));
        let names: Vec<_> = blueprint.sections().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(blueprint.required_variables(), &["env-dict.Name"]);
    }
}
