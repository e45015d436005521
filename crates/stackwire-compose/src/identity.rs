//! Physical identities of realized resources.
//!
//! Published outputs reference descriptors of their own stack. The value that
//! lands in the store is the identity the provisioning engine assigns to that
//! descriptor; [`IdentityResolver`] supplies it.

use std::fmt::Write;

use sha2::{Digest, Sha256};
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::StackId;
use stackwire_graph::{Output, PropertyValue, ResourceDescriptor, StackGraph};

/// Maps descriptors to the identifiers a realized resource would carry.
pub trait IdentityResolver: Send + Sync {
    /// The resource's primary identifier (what a `Ref` evaluates to).
    fn physical_id(&self, stack: &StackId, descriptor: &ResourceDescriptor) -> String;

    /// A named attribute (what a `GetAtt` evaluates to).
    fn attribute(&self, stack: &StackId, descriptor: &ResourceDescriptor, attribute: &str)
    -> String;
}

/// Stable identifiers derived from a SHA-256 digest of namespace, stack, and
/// logical id, so repeated runs publish identical values.
#[derive(Debug, Clone)]
pub struct DeterministicIds {
    namespace: String,
}

const ID_LENGTH: usize = 10;

impl DeterministicIds {
    /// Creates a resolver scoped to `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn digest(&self, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        for part in parts {
            hasher.update([0]);
            hasher.update(part.as_bytes());
        }
        let mut hex = String::with_capacity(ID_LENGTH);
        for byte in hasher.finalize().iter().take(ID_LENGTH / 2) {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

impl IdentityResolver for DeterministicIds {
    fn physical_id(&self, stack: &StackId, descriptor: &ResourceDescriptor) -> String {
        self.digest(&[stack.as_str(), descriptor.logical_id().as_str()])
    }

    fn attribute(
        &self,
        stack: &StackId,
        descriptor: &ResourceDescriptor,
        attribute: &str,
    ) -> String {
        if attribute == "Arn" {
            return format!(
                "arn:stackwire:{}:{}:{}/{}",
                descriptor.kind(),
                self.namespace,
                stack,
                self.physical_id(stack, descriptor)
            );
        }
        self.digest(&[stack.as_str(), descriptor.logical_id().as_str(), attribute])
    }
}

/// Evaluates `output` against a resolved graph into the string that is
/// published.
///
/// Lists are joined with commas. `Sub` placeholders bound in `vars` are
/// substituted; other placeholders are kept.
///
/// # Errors
///
/// Returns `Config` for values that have no string form (mappings, inputs,
/// unresolved deferred references) and `UnknownResource` for a reference to
/// a descriptor not in `graph`.
pub fn render_output(
    resolver: &dyn IdentityResolver,
    graph: &StackGraph,
    output: &Output,
) -> Result<String> {
    evaluate(resolver, graph, &output.name, &output.value)
}

fn evaluate(
    resolver: &dyn IdentityResolver,
    graph: &StackGraph,
    output: &str,
    value: &PropertyValue,
) -> Result<String> {
    let lookup = |id: &str| {
        graph
            .resource(id)
            .ok_or_else(|| StackwireError::UnknownResource {
                stack: graph.stack().clone(),
                id: id.into(),
                referrer: Some(format!("output {output}")),
            })
    };
    match value {
        PropertyValue::String(s) => Ok(s.clone()),
        PropertyValue::Integer(i) => Ok(i.to_string()),
        PropertyValue::Boolean(b) => Ok(b.to_string()),
        PropertyValue::List(items) => Ok(items
            .iter()
            .map(|item| evaluate(resolver, graph, output, item))
            .collect::<Result<Vec<_>>>()?
            .join(",")),
        PropertyValue::Ref(id) => Ok(resolver.physical_id(graph.stack(), lookup(id.as_str())?)),
        PropertyValue::GetAtt { target, attribute } => Ok(resolver.attribute(
            graph.stack(),
            lookup(target.as_str())?,
            attribute,
        )),
        PropertyValue::Sub { template, vars } => {
            let mut text = template.clone();
            for (name, var) in vars {
                let rendered = evaluate(resolver, graph, output, var)?;
                text = text.replace(&format!("${{{name}}}"), &rendered);
            }
            Ok(text.replace("${!", "${"))
        }
        PropertyValue::Map(_) | PropertyValue::Input(_) | PropertyValue::Deferred(_) => {
            Err(StackwireError::Config {
                message: format!(
                    "stack {}: output \"{output}\" has no string form",
                    graph.stack()
                ),
            })
        }
    }
}
