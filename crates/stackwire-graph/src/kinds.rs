//! Resource-kind markers and the typed handles returned by the builder.
//!
//! A [`ResourceHandle<K>`] can only be obtained from a
//! [`GraphBuilder`](crate::GraphBuilder) that holds a descriptor of kind `K`,
//! so APIs that take e.g. `&ResourceHandle<Function>` cannot be wired to a
//! descriptor of any other kind.

use std::fmt;
use std::marker::PhantomData;

use stackwire_common::types::LogicalId;

use crate::descriptor::ResourceKind;
use crate::value::PropertyValue;

/// Marker trait tying a zero-sized type to a [`ResourceKind`].
pub trait Kind: 'static {
    /// The descriptor kind this marker stands for.
    const KIND: ResourceKind;
}

macro_rules! kinds {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub enum $name {}

            impl Kind for $name {
                const KIND: ResourceKind = ResourceKind::$name;
            }
        )*
    };
}

kinds! {
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
    /// Execution role.
    Role,
    /// Invoke permission.
    Permission,
    /// Time-based invocation schedule.
    Schedule,
    /// Parameter-store entry declared as a resource.
    StoreParameter,
}

/// Opaque, kind-checked reference to a descriptor in a builder.
pub struct ResourceHandle<K> {
    id: LogicalId,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ResourceHandle<K> {
    pub(crate) const fn new(id: LogicalId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    /// Returns the logical id of the referenced descriptor.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// A `Ref` to the descriptor's primary identifier.
    #[must_use]
    pub fn to_ref(&self) -> PropertyValue {
        PropertyValue::Ref(self.id.clone())
    }

    /// A `GetAtt` reading `attribute` from the descriptor.
    #[must_use]
    pub fn attr(&self, attribute: impl Into<String>) -> PropertyValue {
        PropertyValue::GetAtt {
            target: self.id.clone(),
            attribute: attribute.into(),
        }
    }

    /// Erases the kind.
    #[must_use]
    pub fn erase(&self) -> AnyHandle {
        AnyHandle {
            id: self.id.clone(),
        }
    }
}

impl<K> Clone for ResourceHandle<K> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<K> PartialEq for ResourceHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K> Eq for ResourceHandle<K> {}

impl<K: Kind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle<{}>({})", K::KIND, self.id)
    }
}

impl<K> From<&ResourceHandle<K>> for PropertyValue {
    fn from(handle: &ResourceHandle<K>) -> Self {
        handle.to_ref()
    }
}

/// Handle whose kind is not tracked statically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnyHandle {
    id: LogicalId,
}

impl AnyHandle {
    pub(crate) const fn new(id: LogicalId) -> Self {
        Self { id }
    }

    /// Returns the logical id of the referenced descriptor.
    #[must_use]
    pub const fn id(&self) -> &LogicalId {
        &self.id
    }

    /// A `Ref` to the descriptor's primary identifier.
    #[must_use]
    pub fn to_ref(&self) -> PropertyValue {
        PropertyValue::Ref(self.id.clone())
    }
}

impl From<&AnyHandle> for PropertyValue {
    fn from(handle: &AnyHandle) -> Self {
        handle.to_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_builds_references() {
        let handle: ResourceHandle<Function> = ResourceHandle::new(LogicalId::new("Fn"));
        assert_eq!(handle.to_ref(), PropertyValue::Ref(LogicalId::new("Fn")));
        assert_eq!(
            handle.attr("Arn"),
            PropertyValue::GetAtt {
                target: LogicalId::new("Fn"),
                attribute: "Arn".into(),
            }
        );
    }

    #[test]
    fn handle_debug_names_kind() {
        let handle: ResourceHandle<Schedule> = ResourceHandle::new(LogicalId::new("Nightly"));
        assert_eq!(
            format!("{handle:?}"),
            "ResourceHandle<scheduler.schedule>(Nightly)"
        );
    }

    #[test]
    fn erased_handle_keeps_id() {
        let handle: ResourceHandle<RestApi> = ResourceHandle::new(LogicalId::new("Api"));
        assert_eq!(handle.erase().id().as_str(), "Api");
    }
}
