//! Accumulates the descriptors, edges, inputs, and outputs of one stack.
//!
//! The builder is the only source of [`ResourceHandle`]s: every successful
//! insert returns a handle that later calls (and later blueprint sections)
//! use to reference the descriptor. Structural checks that need the whole
//! graph are deferred to [`GraphBuilder::finalize`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{LogicalId, StackId};

use crate::descriptor::ResourceDescriptor;
use crate::graph::{DependencyGraph, EdgeKind};
use crate::kinds::{AnyHandle, Kind, ResourceHandle};
use crate::stack::{InputVariable, Output, StackGraph};

/// Mutable graph of one stack under construction.
#[derive(Debug)]
pub struct GraphBuilder {
    stack: StackId,
    resources: Vec<ResourceDescriptor>,
    index: HashMap<LogicalId, usize>,
    outputs: Vec<Output>,
    inputs: Vec<InputVariable>,
}

impl GraphBuilder {
    /// Creates an empty builder for `stack`.
    #[must_use]
    pub fn new(stack: StackId) -> Self {
        Self {
            stack,
            resources: Vec::new(),
            index: HashMap::new(),
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Returns the stack being built.
    #[must_use]
    pub const fn stack(&self) -> &StackId {
        &self.stack
    }

    /// Inserts a descriptor and returns an untyped handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::DuplicateLogicalId`] if the id is taken; the
    /// builder is left unchanged.
    pub fn add_resource(&mut self, descriptor: ResourceDescriptor) -> Result<AnyHandle> {
        let id = descriptor.logical_id().clone();
        if self.index.contains_key(&id) {
            return Err(StackwireError::DuplicateLogicalId {
                stack: self.stack.clone(),
                id,
            });
        }
        tracing::debug!(stack = %self.stack, id = %id, kind = %descriptor.kind(), "adding resource");
        let _ = self.index.insert(id.clone(), self.resources.len());
        self.resources.push(descriptor);
        Ok(AnyHandle::new(id))
    }

    /// Inserts a descriptor of kind `K` and returns a typed handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::KindMismatch`] if the descriptor's kind is
    /// not `K`, or [`StackwireError::DuplicateLogicalId`] if the id is taken.
    /// The builder is left unchanged in both cases.
    pub fn add<K: Kind>(&mut self, descriptor: ResourceDescriptor) -> Result<ResourceHandle<K>> {
        if descriptor.kind() != &K::KIND {
            return Err(StackwireError::KindMismatch {
                stack: self.stack.clone(),
                id: descriptor.logical_id().clone(),
                expected: K::KIND.to_string(),
                found: descriptor.kind().to_string(),
            });
        }
        let handle = self.add_resource(descriptor)?;
        Ok(ResourceHandle::new(handle.id().clone()))
    }

    /// Records that `from` must be realized after `to`.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::UnknownResource`] if either id is not in the
    /// builder.
    pub fn add_dependency(&mut self, from: &LogicalId, to: &LogicalId) -> Result<()> {
        if !self.index.contains_key(to) {
            return Err(self.unknown(to, Some(from.to_string())));
        }
        let Some(&slot) = self.index.get(from) else {
            return Err(self.unknown(from, None));
        };
        if self.resources[slot].add_explicit_dependency(to.clone()) {
            tracing::debug!(stack = %self.stack, from = %from, to = %to, "added dependency");
        }
        Ok(())
    }

    /// Registers an output.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::Config`] if an output with the same name
    /// already exists.
    pub fn add_output(&mut self, output: Output) -> Result<()> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(StackwireError::Config {
                message: format!("stack {}: duplicate output \"{}\"", self.stack, output.name),
            });
        }
        self.outputs.push(output);
        Ok(())
    }

    /// Declares an input variable.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::Config`] if an input with the same name
    /// already exists.
    pub fn add_input(&mut self, input: InputVariable) -> Result<()> {
        if self.inputs.iter().any(|i| i.name == input.name) {
            return Err(StackwireError::Config {
                message: format!("stack {}: duplicate input \"{}\"", self.stack, input.name),
            });
        }
        self.inputs.push(input);
        Ok(())
    }

    /// Returns `true` if a descriptor with `id` has been added.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(&LogicalId::new(id))
    }

    /// Looks up a descriptor added earlier.
    #[must_use]
    pub fn descriptor(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.index
            .get(&LogicalId::new(id))
            .map(|&slot| &self.resources[slot])
    }

    /// Returns a typed handle to a descriptor added earlier, e.g. by a
    /// previous blueprint section.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::UnknownResource`] if no such descriptor
    /// exists, or [`StackwireError::KindMismatch`] if it is not of kind `K`.
    pub fn handle<K: Kind>(&self, id: &str) -> Result<ResourceHandle<K>> {
        let logical_id = LogicalId::new(id);
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| self.unknown(&logical_id, None))?;
        if descriptor.kind() != &K::KIND {
            return Err(StackwireError::KindMismatch {
                stack: self.stack.clone(),
                id: logical_id,
                expected: K::KIND.to_string(),
                found: descriptor.kind().to_string(),
            });
        }
        Ok(ResourceHandle::new(logical_id))
    }

    /// Descriptors in insertion order.
    #[must_use]
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    /// Number of descriptors added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no descriptors have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Validates the graph and returns it in realization order.
    ///
    /// # Checks performed
    ///
    /// 1. Every `Input` reference names a declared input.
    /// 2. Every explicit dependency and every `Ref`/`GetAtt` target is a
    ///    descriptor of this stack.
    /// 3. Every output references at least one descriptor, and only
    ///    descriptors of this stack.
    /// 4. The dependency graph is acyclic.
    ///
    /// The builder is not modified, so `finalize` may be called repeatedly
    /// and yields the same graph each time.
    ///
    /// # Errors
    ///
    /// Returns the first structural error found.
    pub fn finalize(&self) -> Result<StackGraph> {
        self.check_inputs()?;
        self.check_outputs()?;

        let mut graph = DependencyGraph::new(&self.stack);
        for descriptor in &self.resources {
            graph.add_node(descriptor.logical_id());
        }
        let mut dependencies = BTreeMap::new();
        for descriptor in &self.resources {
            let id = descriptor.logical_id();
            for dep in descriptor.explicit_dependencies() {
                self.require(dep, id)?;
                graph.add_dependency(id, dep, EdgeKind::Explicit);
            }
            for dep in descriptor.properties().values().flat_map(|v| v.references()) {
                self.require(dep, id)?;
                graph.add_dependency(id, dep, EdgeKind::Inferred);
            }
            let deps: BTreeSet<LogicalId> =
                descriptor.all_dependencies().into_iter().cloned().collect();
            let _ = dependencies.insert(id.clone(), deps);
        }

        let order = graph.resolve_order()?;
        let resources = order
            .into_iter()
            .map(|id| self.resources[self.index[id]].clone())
            .collect();

        tracing::info!(
            stack = %self.stack,
            resources = self.resources.len(),
            outputs = self.outputs.len(),
            "stack graph finalized"
        );
        Ok(StackGraph {
            stack: self.stack.clone(),
            resources,
            dependencies,
            outputs: self.outputs.clone(),
            inputs: self.inputs.clone(),
        })
    }

    fn check_inputs(&self) -> Result<()> {
        let declared: HashSet<&str> = self.inputs.iter().map(|i| i.name.as_str()).collect();
        for descriptor in &self.resources {
            for name in descriptor.properties().values().flat_map(|v| v.inputs()) {
                if !declared.contains(name) {
                    return Err(StackwireError::UnknownInput {
                        stack: self.stack.clone(),
                        name: name.to_string(),
                        referrer: descriptor.logical_id().clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_outputs(&self) -> Result<()> {
        for output in &self.outputs {
            let references = output.value.references();
            if references.is_empty() {
                return Err(StackwireError::Config {
                    message: format!(
                        "stack {}: output \"{}\" does not reference any resource",
                        self.stack, output.name
                    ),
                });
            }
            for id in references {
                if !self.index.contains_key(id) {
                    return Err(self.unknown(id, Some(format!("output {}", output.name))));
                }
            }
        }
        Ok(())
    }

    fn require(&self, dep: &LogicalId, referrer: &LogicalId) -> Result<()> {
        if self.index.contains_key(dep) {
            Ok(())
        } else {
            Err(self.unknown(dep, Some(referrer.to_string())))
        }
    }

    fn unknown(&self, id: &LogicalId, referrer: Option<String>) -> StackwireError {
        StackwireError::UnknownResource {
            stack: self.stack.clone(),
            id: id.clone(),
            referrer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;
    use crate::kinds::{ApiResource, Function, RestApi};
    use crate::value::PropertyValue;

    fn custom(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(id, ResourceKind::Custom("test.node".into()))
    }

    fn builder() -> GraphBuilder {
        GraphBuilder::new(StackId::new("test"))
    }

    fn order(graph: &StackGraph) -> Vec<&str> {
        graph.order().into_iter().map(LogicalId::as_str).collect()
    }

    #[test]
    fn duplicate_logical_id_leaves_graph_unchanged() {
        let mut b = builder();
        let _ = b.add_resource(custom("A").property("v", 1_i64)).expect("first insert");
        let err = b.add_resource(custom("A").property("v", 2_i64)).unwrap_err();
        assert!(matches!(err, StackwireError::DuplicateLogicalId { .. }));
        assert_eq!(b.len(), 1);
        assert_eq!(
            b.descriptor("A").and_then(|d| d.get("v")),
            Some(&PropertyValue::Integer(1))
        );
    }

    #[test]
    fn add_dependency_rejects_unknown_ids() {
        let mut b = builder();
        let a = b.add_resource(custom("A")).expect("insert");
        let ghost = LogicalId::new("Ghost");
        let err = b.add_dependency(a.id(), &ghost).unwrap_err();
        assert!(matches!(err, StackwireError::UnknownResource { ref id, .. } if id == &ghost));
        let err = b.add_dependency(&ghost, a.id()).unwrap_err();
        assert!(matches!(err, StackwireError::UnknownResource { ref id, .. } if id == &ghost));
    }

    #[test]
    fn finalize_orders_chain_regardless_of_insertion() {
        let mut b = builder();
        let _ = b.add_resource(custom("X").depends_on_id("Y")).expect("X");
        let _ = b.add_resource(custom("Y").depends_on_id("Z")).expect("Y");
        let _ = b.add_resource(custom("Z")).expect("Z");
        let graph = b.finalize().expect("finalize");
        assert_eq!(order(&graph), vec!["Z", "Y", "X"]);
    }

    #[test]
    fn finalize_uses_add_dependency_edges() {
        let mut b = builder();
        let first = b.add_resource(custom("A")).expect("A");
        let second = b.add_resource(custom("B")).expect("B");
        b.add_dependency(first.id(), second.id()).expect("edge");
        let graph = b.finalize().expect("finalize");
        assert_eq!(order(&graph), vec!["B", "A"]);
    }

    #[test]
    fn finalize_infers_edges_from_references() {
        let mut b = builder();
        let _ = b
            .add_resource(custom("Method").property("Target", PropertyValue::Ref("Backend".into())))
            .expect("Method");
        let _ = b.add_resource(custom("Backend")).expect("Backend");
        let graph = b.finalize().expect("finalize");
        assert_eq!(order(&graph), vec!["Backend", "Method"]);
        let deps = graph
            .dependencies_of(&LogicalId::new("Method"))
            .expect("deps");
        assert!(deps.contains(&LogicalId::new("Backend")));
    }

    #[test]
    fn finalize_rejects_dangling_reference() {
        let mut b = builder();
        let _ = b
            .add_resource(custom("A").property("p", PropertyValue::Ref("Nope".into())))
            .expect("A");
        let err = b.finalize().unwrap_err();
        match err {
            StackwireError::UnknownResource { id, referrer, .. } => {
                assert_eq!(id.as_str(), "Nope");
                assert_eq!(referrer.as_deref(), Some("A"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finalize_reports_full_cycle() {
        let mut b = builder();
        let _ = b.add_resource(custom("A").depends_on_id("B")).expect("A");
        let _ = b.add_resource(custom("B").depends_on_id("C")).expect("B");
        let _ = b
            .add_resource(custom("C").property("p", PropertyValue::Ref("A".into())))
            .expect("C");
        let _ = b.add_resource(custom("D").depends_on_id("A")).expect("D");
        let err = b.finalize().unwrap_err();
        match err {
            StackwireError::DependencyCycle { cycle, .. } => {
                let names: Vec<_> = cycle.iter().map(LogicalId::as_str).collect();
                assert_eq!(names, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut b = builder();
        let _ = b.add_resource(custom("B")).expect("B");
        let _ = b.add_resource(custom("A").depends_on_id("B")).expect("A");
        let first = b.finalize().expect("first");
        let second = b.finalize().expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn failed_finalize_keeps_builder_usable() {
        let mut b = builder();
        let _ = b.add_resource(custom("A").depends_on_id("Later")).expect("A");
        assert!(b.finalize().is_err());
        let _ = b.add_resource(custom("Later")).expect("Later");
        let graph = b.finalize().expect("finalize after fix");
        assert_eq!(order(&graph), vec!["Later", "A"]);
    }

    #[test]
    fn typed_add_checks_kind() {
        let mut b = builder();
        let err = b
            .add::<Function>(ResourceDescriptor::new("Api", ResourceKind::RestApi))
            .unwrap_err();
        assert!(matches!(err, StackwireError::KindMismatch { .. }));
        assert!(b.is_empty());
    }

    #[test]
    fn handle_lookup_checks_kind() {
        let mut b = builder();
        let _ = b
            .add::<RestApi>(ResourceDescriptor::new("Api", ResourceKind::RestApi))
            .expect("api");
        let api = b.handle::<RestApi>("Api").expect("typed lookup");
        assert_eq!(api.id().as_str(), "Api");
        assert!(matches!(
            b.handle::<ApiResource>("Api"),
            Err(StackwireError::KindMismatch { .. })
        ));
        assert!(matches!(
            b.handle::<RestApi>("Missing"),
            Err(StackwireError::UnknownResource { .. })
        ));
    }

    #[test]
    fn undeclared_input_is_rejected() {
        let mut b = builder();
        let _ = b
            .add_resource(custom("Fn").property("Bucket", PropertyValue::Input("Bucket".into())))
            .expect("Fn");
        assert!(matches!(
            b.finalize(),
            Err(StackwireError::UnknownInput { .. })
        ));
        b.add_input(InputVariable::string("Bucket")).expect("input");
        assert!(b.finalize().is_ok());
    }

    #[test]
    fn outputs_must_reference_existing_resources() {
        let mut b = builder();
        let api = b
            .add::<RestApi>(ResourceDescriptor::new("Api", ResourceKind::RestApi))
            .expect("api");
        b.add_output(Output::reference("ApiId", &api)).expect("output");
        assert!(b.finalize().is_ok());

        b.add_output(Output::value("Ghost", PropertyValue::Ref("Nope".into())))
            .expect("output");
        assert!(matches!(
            b.finalize(),
            Err(StackwireError::UnknownResource { .. })
        ));
    }

    #[test]
    fn literal_output_is_rejected() {
        let mut b = builder();
        b.add_output(Output::value("Const", PropertyValue::from("x")))
            .expect("output");
        assert!(matches!(b.finalize(), Err(StackwireError::Config { .. })));
    }

    #[test]
    fn duplicate_output_name_is_rejected() {
        let mut b = builder();
        let api = b
            .add::<RestApi>(ResourceDescriptor::new("Api", ResourceKind::RestApi))
            .expect("api");
        b.add_output(Output::reference("ApiId", &api)).expect("first");
        assert!(b.add_output(Output::reference("ApiId", &api)).is_err());
    }
}
