//! Blueprint sections: named passes that contribute to one stack's graph.

use std::fmt;

use stackwire_common::config::Variables;
use stackwire_common::error::Result;
use stackwire_common::types::{DeferredReference, StackId, ValueType};
use stackwire_graph::kinds::{Kind, ResourceHandle};
use stackwire_graph::{GraphBuilder, InputVariable, Output, PropertyValue, legacy};
use stackwire_store::ParameterStore;

use crate::catalog::Declared;

/// One named pass over a stack's builder.
///
/// Sections run in the order their blueprint lists them and may look up
/// descriptors added by earlier sections through
/// [`SectionContext::handle`].
pub trait Section: Send + Sync {
    /// Name used in logs and error annotations.
    fn name(&self) -> &str;

    /// Adds descriptors, edges, inputs, and outputs.
    ///
    /// # Errors
    ///
    /// Any error aborts the composition; the composer annotates it with
    /// this section's name.
    fn contribute(&self, ctx: &mut SectionContext<'_>) -> Result<()>;
}

/// A section backed by a closure or function.
pub struct FnSection<F> {
    name: String,
    contribute: F,
}

impl<F> fmt::Debug for FnSection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSection").field("name", &self.name).finish()
    }
}

impl<F> Section for FnSection<F>
where
    F: Fn(&mut SectionContext<'_>) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn contribute(&self, ctx: &mut SectionContext<'_>) -> Result<()> {
        (self.contribute)(ctx)
    }
}

/// Wraps `contribute` as a named section.
pub fn section<F>(name: impl Into<String>, contribute: F) -> FnSection<F>
where
    F: Fn(&mut SectionContext<'_>) -> Result<()> + Send + Sync,
{
    FnSection {
        name: name.into(),
        contribute,
    }
}

/// What a section sees while it runs.
#[derive(Debug)]
pub struct SectionContext<'a> {
    stack: &'a StackId,
    variables: &'a Variables,
    builder: &'a mut GraphBuilder,
}

impl<'a> SectionContext<'a> {
    pub(crate) fn new(
        stack: &'a StackId,
        variables: &'a Variables,
        builder: &'a mut GraphBuilder,
    ) -> Self {
        Self {
            stack,
            variables,
            builder,
        }
    }

    /// The stack being composed.
    #[must_use]
    pub const fn stack(&self) -> &StackId {
        self.stack
    }

    /// The stack's configuration variables.
    #[must_use]
    pub const fn variables(&self) -> &Variables {
        self.variables
    }

    /// Direct access to the shared builder.
    pub fn builder(&mut self) -> &mut GraphBuilder {
        &mut *self.builder
    }

    /// Reads a string variable by dotted path.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` if absent, `Config` if not a scalar.
    pub fn require_str(&self, path: &str) -> Result<String> {
        self.variables.require_str(self.stack, path)
    }

    /// Reads a string variable as a property value. Legacy resolve tokens in
    /// the value become deferred references.
    ///
    /// # Errors
    ///
    /// As [`Self::require_str`], plus token migration errors.
    pub fn var(&self, path: &str) -> Result<PropertyValue> {
        legacy::migrate_string(&self.require_str(path)?)
    }

    /// A string-typed deferred reference to `key`. Never touches the store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a malformed key.
    pub fn deferred_ref(&self, key: &str) -> Result<DeferredReference> {
        ParameterStore::deferred_ref(key, ValueType::String)
    }

    /// Adds a catalog declaration and returns its typed handle.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLogicalId` if the id is taken, or a migration error
    /// for a malformed legacy token in a property.
    pub fn add<K: Kind>(&mut self, declared: Declared<K>) -> Result<ResourceHandle<K>> {
        declared.add_to(self.builder)
    }

    /// Looks up a descriptor added by an earlier section.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` or `KindMismatch`.
    pub fn handle<K: Kind>(&self, id: &str) -> Result<ResourceHandle<K>> {
        self.builder.handle(id)
    }

    /// Registers an output.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a duplicate output name.
    pub fn add_output(&mut self, output: Output) -> Result<()> {
        self.builder.add_output(output)
    }

    /// Declares an input variable and returns a reference to it.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a duplicate input name.
    pub fn add_input(&mut self, input: InputVariable) -> Result<PropertyValue> {
        let reference = input.to_ref();
        self.builder.add_input(input)?;
        Ok(reference)
    }
}
