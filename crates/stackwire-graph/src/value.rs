//! Property values carried by resource descriptors.
//!
//! A value is a literal tree that may embed three kinds of indirection:
//! in-stack references (`Ref`, `GetAtt`) that imply an ordering edge,
//! input-variable references that are bound by the provisioning engine, and
//! deferred cross-stack references that are substituted at render time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stackwire_common::error::Result;
use stackwire_common::types::{DeferredReference, LogicalId};

/// A property value in a resource descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// A string literal.
    String(String),
    /// An integer literal.
    Integer(i64),
    /// A boolean literal.
    Boolean(bool),
    /// An ordered list of values.
    List(Vec<PropertyValue>),
    /// A nested mapping.
    Map(BTreeMap<String, PropertyValue>),
    /// The primary identifier of another descriptor in the same stack.
    Ref(LogicalId),
    /// A named attribute of another descriptor in the same stack.
    GetAtt {
        /// Descriptor whose attribute is read.
        target: LogicalId,
        /// Attribute name, e.g. `Arn`.
        attribute: String,
    },
    /// String interpolation: `${name}` placeholders in `template` are
    /// replaced by the matching entry of `vars`.
    Sub {
        /// Template text.
        template: String,
        /// Values bound to placeholders.
        vars: BTreeMap<String, PropertyValue>,
    },
    /// A declared input variable of the stack.
    Input(String),
    /// A value read from the parameter store at render time.
    Deferred(DeferredReference),
}

impl PropertyValue {
    /// Builds a `Map` from `(key, value)` pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a `List` from values.
    pub fn list<V: Into<Self>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a `Sub` from a template and `(name, value)` bindings.
    pub fn sub<K, V>(template: impl Into<String>, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
    {
        Self::Sub {
            template: template.into(),
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the string literal, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collects every in-stack descriptor this value references.
    #[must_use]
    pub fn references(&self) -> Vec<&LogicalId> {
        let mut out = Vec::new();
        self.walk(&mut |value| match value {
            Self::Ref(id) | Self::GetAtt { target: id, .. } => out.push(id),
            _ => {}
        });
        out
    }

    /// Collects every input variable this value references.
    #[must_use]
    pub fn inputs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |value| {
            if let Self::Input(name) = value {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Collects every deferred reference embedded in this value.
    #[must_use]
    pub fn deferred(&self) -> Vec<&DeferredReference> {
        let mut out = Vec::new();
        self.walk(&mut |value| {
            if let Self::Deferred(reference) = value {
                out.push(reference);
            }
        });
        out
    }

    /// Visits this value and every nested value, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        match self {
            Self::List(items) => items.iter().for_each(|item| item.walk(visit)),
            Self::Map(entries) | Self::Sub { vars: entries, .. } => {
                entries.values().for_each(|v| v.walk(visit));
            }
            _ => {}
        }
    }

    /// Returns a copy of this value with every deferred reference replaced
    /// by the result of `resolve`.
    ///
    /// `path` is the property path of `self`; nested paths are derived as
    /// `parent.key` for mappings and substitution variables and
    /// `parent[index]` for lists. `resolve` receives each reference with its
    /// path. The first error aborts the walk and is returned unchanged.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `resolve`.
    pub fn replace_deferred<F>(&self, path: &str, resolve: &mut F) -> Result<Self>
    where
        F: FnMut(&DeferredReference, &str) -> Result<Self>,
    {
        match self {
            Self::Deferred(reference) => resolve(reference, path),
            Self::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| item.replace_deferred(&format!("{path}[{i}]"), resolve))
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            Self::Map(entries) => replace_entries(entries, path, resolve).map(Self::Map),
            Self::Sub { template, vars } => Ok(Self::Sub {
                template: template.clone(),
                vars: replace_entries(vars, path, resolve)?,
            }),
            other => Ok(other.clone()),
        }
    }
}

fn replace_entries<F>(
    entries: &BTreeMap<String, PropertyValue>,
    path: &str,
    resolve: &mut F,
) -> Result<BTreeMap<String, PropertyValue>>
where
    F: FnMut(&DeferredReference, &str) -> Result<PropertyValue>,
{
    entries
        .iter()
        .map(|(k, v)| -> Result<(String, PropertyValue)> {
            Ok((k.clone(), v.replace_deferred(&format!("{path}.{k}"), resolve)?))
        })
        .collect()
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DeferredReference> for PropertyValue {
    fn from(value: DeferredReference) -> Self {
        Self::Deferred(value)
    }
}

impl<V: Into<Self>> From<Vec<V>> for PropertyValue {
    fn from(value: Vec<V>) -> Self {
        Self::list(value)
    }
}
