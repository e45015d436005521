//! The finalized stack graph and its outputs and inputs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use stackwire_common::error::Result;
use stackwire_common::types::{LogicalId, ParameterKey, StackId, ValueType};

use crate::descriptor::ResourceDescriptor;
use crate::kinds::ResourceHandle;
use crate::value::PropertyValue;

/// A value the stack exposes to the provisioning engine and, optionally, to
/// other stacks through the parameter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Output name, unique within the stack.
    pub name: String,
    /// Exposed value; references a descriptor of the stack.
    pub value: PropertyValue,
    /// Store key the value is published under when the stack is realized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<ParameterKey>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Output {
    /// Exposes the primary identifier of `handle`.
    #[must_use]
    pub fn reference<K>(name: impl Into<String>, handle: &ResourceHandle<K>) -> Self {
        Self::value(name, handle.to_ref())
    }

    /// Exposes an attribute of `handle`.
    #[must_use]
    pub fn attribute<K>(
        name: impl Into<String>,
        handle: &ResourceHandle<K>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::value(name, handle.attr(attribute))
    }

    /// Exposes an arbitrary value.
    #[must_use]
    pub fn value(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
            publish: None,
            description: None,
        }
    }

    /// Marks the output for publishing under `key`.
    #[must_use]
    pub fn publish_as(mut self, key: ParameterKey) -> Self {
        self.publish = Some(key);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns `true` if the output is written to the parameter store.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.publish.is_some()
    }
}

/// A declared input variable, bound by the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVariable {
    /// Variable name, unique within the stack.
    pub name: String,
    /// Declared type.
    pub value_type: ValueType,
    /// Value used when the engine supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputVariable {
    /// Declares a string input.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::String,
            default: None,
            description: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// A property value referencing this input.
    #[must_use]
    pub fn to_ref(&self) -> PropertyValue {
        PropertyValue::Input(self.name.clone())
    }
}

/// A validated, topologically ordered stack.
///
/// Produced by [`GraphBuilder::finalize`](crate::GraphBuilder::finalize);
/// every dependency and output reference resolves within the stack and the
/// descriptors are stored in realization order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackGraph {
    pub(crate) stack: StackId,
    pub(crate) resources: Vec<ResourceDescriptor>,
    pub(crate) dependencies: BTreeMap<LogicalId, BTreeSet<LogicalId>>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) inputs: Vec<InputVariable>,
}

impl StackGraph {
    /// Returns the owning stack.
    #[must_use]
    pub const fn stack(&self) -> &StackId {
        &self.stack
    }

    /// Descriptors in realization order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    /// Logical ids in realization order.
    #[must_use]
    pub fn order(&self) -> Vec<&LogicalId> {
        self.resources.iter().map(ResourceDescriptor::logical_id).collect()
    }

    /// Looks up a descriptor by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.logical_id().as_str() == id)
    }

    /// Explicit plus inferred dependencies of `id`.
    #[must_use]
    pub fn dependencies_of(&self, id: &LogicalId) -> Option<&BTreeSet<LogicalId>> {
        self.dependencies.get(id)
    }

    /// Declared outputs, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Outputs that are written to the parameter store.
    pub fn published_outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.iter().filter(|o| o.is_published())
    }

    /// Declared inputs, in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[InputVariable] {
        &self.inputs
    }

    /// Every deferred store key read by the stack, deduplicated and sorted.
    #[must_use]
    pub fn deferred_keys(&self) -> BTreeSet<&ParameterKey> {
        self.resources
            .iter()
            .flat_map(|r| r.properties().values())
            .flat_map(PropertyValue::deferred)
            .map(|d| &d.key)
            .collect()
    }

    /// Returns `true` if no deferred references remain.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.deferred_keys().is_empty()
    }

    /// Returns a copy in which every property value has been passed through
    /// `map`; ids, kinds, dependencies, order, outputs, and inputs are kept.
    ///
    /// `self` is never modified, so a failed mapping leaves the graph exactly
    /// as it was.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `map`.
    pub fn try_map_properties<F>(&self, mut map: F) -> Result<Self>
    where
        F: FnMut(&ResourceDescriptor, &str, &PropertyValue) -> Result<PropertyValue>,
    {
        let resources = self
            .resources
            .iter()
            .map(|descriptor| -> Result<ResourceDescriptor> {
                let properties = descriptor
                    .properties()
                    .iter()
                    .map(|(name, value)| -> Result<(String, PropertyValue)> {
                        Ok((name.clone(), map(descriptor, name, value)?))
                    })
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(descriptor.with_properties(properties))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stack: self.stack.clone(),
            resources,
            dependencies: self.dependencies.clone(),
            outputs: self.outputs.clone(),
            inputs: self.inputs.clone(),
        })
    }
}
