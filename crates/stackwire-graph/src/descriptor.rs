//! Resource descriptors: the named, typed units a stack is built from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use stackwire_common::types::LogicalId;

use crate::kinds::{AnyHandle, ResourceHandle};
use crate::value::PropertyValue;

/// Kind of infrastructure a descriptor declares.
///
/// The graph builder treats kinds as opaque tags; only typed handles and the
/// resource catalog give them meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// HTTP API gateway.
    RestApi,
    /// Path segment under an API.
    ApiResource,
    /// HTTP method bound to an API resource.
    ApiMethod,
    /// Immutable snapshot of an API.
    ApiDeployment,
    /// Named stage pointing at a deployment.
    ApiStage,
    /// Quota and throttling plan.
    UsagePlan,
    /// Client API key.
    ApiKey,
    /// Association of an API key with a usage plan.
    UsagePlanKey,
    /// Serverless compute function.
    Function,
    /// Execution role with attached policies.
    Role,
    /// Grant allowing a principal to invoke a function.
    Permission,
    /// Time-based invocation schedule.
    Schedule,
    /// Parameter-store entry declared as a resource.
    StoreParameter,
    /// Any kind the built-in catalog does not model.
    Custom(String),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestApi => write!(f, "gateway.rest_api"),
            Self::ApiResource => write!(f, "gateway.resource"),
            Self::ApiMethod => write!(f, "gateway.method"),
            Self::ApiDeployment => write!(f, "gateway.deployment"),
            Self::ApiStage => write!(f, "gateway.stage"),
            Self::UsagePlan => write!(f, "gateway.usage_plan"),
            Self::ApiKey => write!(f, "gateway.api_key"),
            Self::UsagePlanKey => write!(f, "gateway.usage_plan_key"),
            Self::Function => write!(f, "compute.function"),
            Self::Role => write!(f, "iam.role"),
            Self::Permission => write!(f, "compute.permission"),
            Self::Schedule => write!(f, "scheduler.schedule"),
            Self::StoreParameter => write!(f, "store.parameter"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A named, typed unit of infrastructure.
///
/// The logical id is fixed at construction; properties and explicit
/// dependencies may be added until the descriptor is handed to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    logical_id: LogicalId,
    kind: ResourceKind,
    properties: BTreeMap<String, PropertyValue>,
    explicit_dependencies: BTreeSet<LogicalId>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with no properties.
    #[must_use]
    pub fn new(logical_id: impl Into<LogicalId>, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties: BTreeMap::new(),
            explicit_dependencies: BTreeSet::new(),
        }
    }

    /// Sets a property, replacing any previous value under the same name.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let _ = self.properties.insert(name.into(), value.into());
        self
    }

    /// Sets a property only when `value` is present.
    #[must_use]
    pub fn property_opt(self, name: impl Into<String>, value: Option<impl Into<PropertyValue>>) -> Self {
        match value {
            Some(v) => self.property(name, v),
            None => self,
        }
    }

    /// Declares that this descriptor must be realized after `dependency`.
    #[must_use]
    pub fn depends_on<K>(mut self, dependency: &ResourceHandle<K>) -> Self {
        let _ = self.explicit_dependencies.insert(dependency.id().clone());
        self
    }

    /// Declares a dependency through an untyped handle.
    #[must_use]
    pub fn depends_on_any(mut self, dependency: &AnyHandle) -> Self {
        let _ = self.explicit_dependencies.insert(dependency.id().clone());
        self
    }

    /// Declares a dependency by raw logical id.
    ///
    /// Unlike handle-based dependencies the id is not known to exist; it is
    /// checked when the graph is finalized.
    #[must_use]
    pub fn depends_on_id(mut self, dependency: impl Into<LogicalId>) -> Self {
        let _ = self.explicit_dependencies.insert(dependency.into());
        self
    }

    /// Returns the logical id.
    #[must_use]
    pub const fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Returns all properties keyed by name.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Returns a single property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Returns the explicitly declared dependencies.
    #[must_use]
    pub const fn explicit_dependencies(&self) -> &BTreeSet<LogicalId> {
        &self.explicit_dependencies
    }

    /// Returns explicit dependencies plus every descriptor referenced from
    /// properties, deduplicated and sorted.
    #[must_use]
    pub fn all_dependencies(&self) -> BTreeSet<&LogicalId> {
        let mut deps: BTreeSet<&LogicalId> = self.explicit_dependencies.iter().collect();
        for value in self.properties.values() {
            deps.extend(value.references());
        }
        deps
    }

    pub(crate) fn add_explicit_dependency(&mut self, dependency: LogicalId) -> bool {
        self.explicit_dependencies.insert(dependency)
    }

    pub(crate) fn with_properties(&self, properties: BTreeMap<String, PropertyValue>) -> Self {
        Self {
            logical_id: self.logical_id.clone(),
            kind: self.kind.clone(),
            properties,
            explicit_dependencies: self.explicit_dependencies.clone(),
        }
    }
}
