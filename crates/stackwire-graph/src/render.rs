//! Renders a resolved stack into the JSON template the provisioning engine
//! consumes.
//!
//! In-stack references keep their engine intrinsic form (`Ref`,
//! `Fn::GetAtt`, `Fn::Sub`); deferred references must already have been
//! replaced by literals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{LogicalId, ParameterKey};

use crate::stack::{InputVariable, StackGraph};
use crate::value::PropertyValue;

/// Serializable template of one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedTemplate {
    /// Stack name.
    pub stack: String,
    /// Resources in realization order.
    pub resources: Vec<RenderedResource>,
    /// Declared input variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputVariable>,
    /// Declared outputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<RenderedOutput>,
}

/// One resource entry of a [`RenderedTemplate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedResource {
    /// Logical id.
    pub logical_id: LogicalId,
    /// Namespaced kind, e.g. `compute.function`.
    pub kind: String,
    /// Properties in engine form.
    pub properties: Map<String, Value>,
    /// Explicit plus inferred dependencies, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
}

/// One output entry of a [`RenderedTemplate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedOutput {
    /// Output name.
    pub name: String,
    /// Value in engine form.
    pub value: Value,
    /// Store key the value is published under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<ParameterKey>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RenderedTemplate {
    /// Renders `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::UnresolvedCrossStackReference`] for the first
    /// deferred reference still present in the graph.
    pub fn render(graph: &StackGraph) -> Result<Self> {
        let mut resources = Vec::with_capacity(graph.resources().len());
        for descriptor in graph.resources() {
            let mut properties = Map::new();
            for (name, value) in descriptor.properties() {
                let _ = value.replace_deferred(name, &mut |reference, path| {
                    Err(StackwireError::UnresolvedCrossStackReference {
                        stack: graph.stack().clone(),
                        key: reference.key.to_string(),
                        resource: descriptor.logical_id().clone(),
                        path: path.to_string(),
                    })
                })?;
                let _ = properties.insert(name.clone(), to_json(value));
            }
            let depends_on = graph
                .dependencies_of(descriptor.logical_id())
                .map(|deps| deps.iter().cloned().collect())
                .unwrap_or_default();
            resources.push(RenderedResource {
                logical_id: descriptor.logical_id().clone(),
                kind: descriptor.kind().to_string(),
                properties,
                depends_on,
            });
        }

        let outputs = graph
            .outputs()
            .iter()
            .map(|o| RenderedOutput {
                name: o.name.clone(),
                value: to_json(&o.value),
                publish: o.publish.clone(),
                description: o.description.clone(),
            })
            .collect();

        Ok(Self {
            stack: graph.stack().to_string(),
            resources,
            inputs: graph.inputs().to_vec(),
            outputs,
        })
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::Serialization`] if encoding fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Looks up a rendered resource by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&RenderedResource> {
        self.resources.iter().find(|r| r.logical_id.as_str() == id)
    }
}

/// Converts a property value to engine JSON.
///
/// A deferred reference that slipped through renders as its key wrapped in
/// a `Stackwire::Deferred` marker; [`RenderedTemplate::render`] rejects those
/// before conversion.
#[must_use]
pub fn to_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::Integer(i) => json!(i),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        PropertyValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        PropertyValue::Ref(id) => json!({ "Ref": id }),
        PropertyValue::Input(name) => json!({ "Ref": name }),
        PropertyValue::GetAtt { target, attribute } => {
            json!({ "Fn::GetAtt": [target, attribute] })
        }
        PropertyValue::Sub { template, vars } if vars.is_empty() => {
            json!({ "Fn::Sub": template })
        }
        PropertyValue::Sub { template, vars } => {
            let vars: Map<String, Value> =
                vars.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
            json!({ "Fn::Sub": [template, vars] })
        }
        PropertyValue::Deferred(reference) => {
            json!({ "Stackwire::Deferred": reference.key })
        }
    }
}
