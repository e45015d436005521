//! Typed constructors for the built-in resource kinds.
//!
//! Every relationship between resources is expressed through a handle typed
//! by the kind it must point at, so a method can only be attached to an API
//! resource and a schedule can only target a function. Relationships that
//! cross stacks take a [`Link`], which is either a local handle or a deferred
//! reference to an id another stack published.

use std::fmt;
use std::marker::PhantomData;

use stackwire_common::error::Result;
use stackwire_common::types::{DeferredReference, ParameterKey};
use stackwire_graph::kinds::{
    ApiDeployment, ApiKey, ApiMethod, ApiResource, ApiStage, Function, Kind, Permission,
    ResourceHandle, RestApi, Role, Schedule, StoreParameter, UsagePlan, UsagePlanKey,
};
use stackwire_graph::{GraphBuilder, PropertyValue, ResourceDescriptor, legacy};

/// A descriptor of kind `K` that has not been added to a builder yet.
pub struct Declared<K> {
    descriptor: ResourceDescriptor,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Kind> Declared<K> {
    /// An empty declaration of kind `K`.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            descriptor: ResourceDescriptor::new(id, K::KIND),
            _kind: PhantomData,
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.descriptor = self.descriptor.property(name, value);
        self
    }

    /// Adds an explicit ordering edge.
    #[must_use]
    pub fn depends_on<D>(mut self, dependency: &ResourceHandle<D>) -> Self {
        self.descriptor = self.descriptor.depends_on(dependency);
        self
    }

    /// The descriptor built so far.
    #[must_use]
    pub const fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Migrates legacy resolve tokens and adds the descriptor to `builder`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateLogicalId` if the id is taken, or a migration error.
    pub fn add_to(self, builder: &mut GraphBuilder) -> Result<ResourceHandle<K>> {
        builder.add::<K>(legacy::migrate_descriptor(&self.descriptor)?)
    }
}

impl<K: Kind> fmt::Debug for Declared<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Declared").field(&self.descriptor).finish()
    }
}

/// A relationship to a resource of kind `K` in this stack or another one.
pub enum Link<K> {
    /// A descriptor of the stack being built.
    Local(ResourceHandle<K>),
    /// An id published by another stack.
    Deferred(DeferredReference),
}

impl<K> Link<K> {
    /// The primary identifier as a property value.
    #[must_use]
    pub fn to_ref(&self) -> PropertyValue {
        match self {
            Self::Local(handle) => handle.to_ref(),
            Self::Deferred(reference) => PropertyValue::Deferred(reference.clone()),
        }
    }
}

impl<K> Clone for Link<K> {
    fn clone(&self) -> Self {
        match self {
            Self::Local(handle) => Self::Local(handle.clone()),
            Self::Deferred(reference) => Self::Deferred(reference.clone()),
        }
    }
}

impl<K: Kind> fmt::Debug for Link<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(handle) => f.debug_tuple("Local").field(handle).finish(),
            Self::Deferred(reference) => f.debug_tuple("Deferred").field(reference).finish(),
        }
    }
}

impl<K> From<&ResourceHandle<K>> for Link<K> {
    fn from(handle: &ResourceHandle<K>) -> Self {
        Self::Local(handle.clone())
    }
}

impl<K> From<DeferredReference> for Link<K> {
    fn from(reference: DeferredReference) -> Self {
        Self::Deferred(reference)
    }
}

/// Where a new API resource hangs in the path tree.
#[derive(Debug, Clone)]
pub enum Parent {
    /// Directly under the root of a local API.
    Root(ResourceHandle<RestApi>),
    /// Under another API resource.
    Resource(Link<ApiResource>),
}

impl Parent {
    fn to_value(&self) -> PropertyValue {
        match self {
            Self::Root(api) => api.attr("RootResourceId"),
            Self::Resource(link) => link.to_ref(),
        }
    }
}

/// Request quota of a usage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum requests per period.
    pub limit: i64,
    /// `DAY`, `WEEK`, or `MONTH`.
    pub period: &'static str,
}

/// Steady-state and burst request rates of a usage plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    /// Maximum burst size.
    pub burst_limit: i64,
    /// Requests per second.
    pub rate_limit: i64,
}

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence<'a> {
    /// `cron(...)` or `rate(...)` expression.
    pub expression: &'a str,
    /// IANA time zone the expression is evaluated in.
    pub timezone: &'a str,
}

/// Retry behavior of a schedule target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries before the event is dropped.
    pub maximum_retry_attempts: i64,
    /// Age in seconds after which the event is dropped.
    pub maximum_event_age_seconds: i64,
}

/// Location of a function's deployment package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCode {
    /// Bucket holding the package.
    pub bucket: PropertyValue,
    /// Object key of the package.
    pub key: PropertyValue,
}

/// One inline policy of a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    statements: Vec<PropertyValue>,
}

impl Policy {
    /// An empty policy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: Vec::new(),
        }
    }

    /// Adds an `Allow` statement.
    #[must_use]
    pub fn allow<A, R>(mut self, actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<PropertyValue>,
        R: IntoIterator,
        R::Item: Into<PropertyValue>,
    {
        self.statements.push(PropertyValue::map([
            ("Effect", PropertyValue::from("Allow")),
            ("Action", PropertyValue::list(actions)),
            ("Resource", PropertyValue::list(resources)),
        ]));
        self
    }

    fn into_value(self) -> PropertyValue {
        PropertyValue::map([
            ("PolicyName", PropertyValue::from(self.name)),
            ("PolicyDocument", document(self.statements)),
        ])
    }
}

fn document(statements: Vec<PropertyValue>) -> PropertyValue {
    PropertyValue::map([
        ("Version", PropertyValue::from("2012-10-17")),
        ("Statement", PropertyValue::List(statements)),
    ])
}

/// A REST API with header-sourced API keys and a regional endpoint.
#[must_use]
pub fn rest_api(id: &str, name: impl Into<PropertyValue>) -> Declared<RestApi> {
    Declared::new(id)
        .property("Name", name)
        .property("ApiKeySourceType", "HEADER")
        .property(
            "EndpointConfiguration",
            PropertyValue::map([("Types", PropertyValue::list(["REGIONAL"]))]),
        )
}

/// A path segment under `parent`.
#[must_use]
pub fn api_resource(
    id: &str,
    api: &Link<RestApi>,
    parent: &Parent,
    path_part: &str,
) -> Declared<ApiResource> {
    Declared::new(id)
        .property("RestApiId", api.to_ref())
        .property("ParentId", parent.to_value())
        .property("PathPart", path_part)
}

/// A method on `resource` proxied to `function`, without authorization and
/// without an API key unless [`Declared::api_key_required`] says otherwise.
#[must_use]
pub fn lambda_proxy_method(
    id: &str,
    api: &Link<RestApi>,
    resource: &Link<ApiResource>,
    http_method: &str,
    function: &ResourceHandle<Function>,
) -> Declared<ApiMethod> {
    let uri = PropertyValue::sub(
        "arn:aws:apigateway:${AWS::Region}:lambda:path/2015-03-31/functions/${LambdaArn}/invocations",
        [("LambdaArn", function.attr("Arn"))],
    );
    Declared::new(id)
        .depends_on(function)
        .property("AuthorizationType", "NONE")
        .property("ApiKeyRequired", false)
        .property("HttpMethod", http_method)
        .property("RestApiId", api.to_ref())
        .property("ResourceId", resource.to_ref())
        .property(
            "Integration",
            PropertyValue::map([
                ("IntegrationHttpMethod", PropertyValue::from("POST")),
                ("Type", PropertyValue::from("AWS_PROXY")),
                ("Uri", uri),
            ]),
        )
}

impl Declared<ApiMethod> {
    /// Requires callers to present an API key.
    #[must_use]
    pub fn api_key_required(self, required: bool) -> Self {
        self.property("ApiKeyRequired", required)
    }
}

/// A deployment snapshot of `api`.
#[must_use]
pub fn deployment(id: &str, api: &Link<RestApi>) -> Declared<ApiDeployment> {
    Declared::new(id).property("RestApiId", api.to_ref())
}

/// A named stage serving `deployment`.
#[must_use]
pub fn stage(
    id: &str,
    api: &Link<RestApi>,
    deployment: &ResourceHandle<ApiDeployment>,
    name: &str,
) -> Declared<ApiStage> {
    Declared::new(id)
        .property("DeploymentId", deployment)
        .property("RestApiId", api.to_ref())
        .property("StageName", name)
}

/// A usage plan bound to one stage of `api`.
#[must_use]
pub fn usage_plan(
    id: &str,
    name: impl Into<PropertyValue>,
    api: &Link<RestApi>,
    stage: &ResourceHandle<ApiStage>,
    quota: Quota,
    throttle: Throttle,
) -> Declared<UsagePlan> {
    Declared::new(id)
        .depends_on(stage)
        .property("UsagePlanName", name)
        .property(
            "ApiStages",
            PropertyValue::list([PropertyValue::map([
                ("ApiId", api.to_ref()),
                ("Stage", stage.to_ref()),
            ])]),
        )
        .property(
            "Quota",
            PropertyValue::map([
                ("Limit", PropertyValue::from(quota.limit)),
                ("Period", PropertyValue::from(quota.period)),
            ]),
        )
        .property(
            "Throttle",
            PropertyValue::map([
                ("BurstLimit", throttle.burst_limit),
                ("RateLimit", throttle.rate_limit),
            ]),
        )
}

/// An enabled API key.
#[must_use]
pub fn api_key(id: &str, name: impl Into<PropertyValue>) -> Declared<ApiKey> {
    Declared::new(id).property("Name", name).property("Enabled", true)
}

/// Attaches `key` to `plan`.
#[must_use]
pub fn usage_plan_key(
    id: &str,
    plan: &ResourceHandle<UsagePlan>,
    key: &ResourceHandle<ApiKey>,
) -> Declared<UsagePlanKey> {
    Declared::new(id)
        .depends_on(plan)
        .property("KeyId", key)
        .property("KeyType", "API_KEY")
        .property("UsagePlanId", plan)
}

/// A role assumable by `services`, with inline `policies`.
#[must_use]
pub fn role(id: &str, services: &[&str], policies: Vec<Policy>) -> Declared<Role> {
    role_with_trust(
        id,
        PropertyValue::map([
            ("Effect", PropertyValue::from("Allow")),
            (
                "Principal",
                PropertyValue::map([("Service", PropertyValue::list(services.iter().copied()))]),
            ),
            ("Action", PropertyValue::list(["sts:AssumeRole"])),
        ]),
        policies,
    )
}

/// A role with a caller-supplied trust statement.
#[must_use]
pub fn role_with_trust(id: &str, trust: PropertyValue, policies: Vec<Policy>) -> Declared<Role> {
    Declared::new(id)
        .property("AssumeRolePolicyDocument", document(vec![trust]))
        .property(
            "Policies",
            PropertyValue::List(policies.into_iter().map(Policy::into_value).collect()),
        )
}

/// A function executing as `role`.
#[must_use]
pub fn function(
    id: &str,
    name: impl Into<PropertyValue>,
    role: &ResourceHandle<Role>,
    code: FunctionCode,
    handler: &str,
    runtime: &str,
) -> Declared<Function> {
    Declared::new(id)
        .property("FunctionName", name)
        .property(
            "Code",
            PropertyValue::map([("S3Bucket", code.bucket), ("S3Key", code.key)]),
        )
        .property("Handler", handler)
        .property("Runtime", runtime)
        .property("Role", role.attr("Arn"))
}

impl Declared<Function> {
    /// Sets environment variables.
    #[must_use]
    pub fn environment<N, V>(self, variables: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<PropertyValue>,
    {
        self.property(
            "Environment",
            PropertyValue::map([("Variables", PropertyValue::map(variables))]),
        )
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn timeout(self, seconds: i64) -> Self {
        self.property("Timeout", seconds)
    }
}

/// Allows `principal` to invoke `function` from `source_arn`.
#[must_use]
pub fn invoke_permission(
    id: &str,
    function: &ResourceHandle<Function>,
    principal: &str,
    source_arn: impl Into<PropertyValue>,
) -> Declared<Permission> {
    Declared::new(id)
        .depends_on(function)
        .property("Action", "lambda:InvokeFunction")
        .property("FunctionName", function)
        .property("Principal", principal)
        .property("SourceArn", source_arn)
}

/// A recurring invocation of `target`.
#[must_use]
pub fn schedule(
    id: &str,
    name: &str,
    recurrence: Recurrence<'_>,
    target: &ResourceHandle<Function>,
    role: &ResourceHandle<Role>,
    input: &str,
    retry: RetryPolicy,
) -> Declared<Schedule> {
    Declared::new(id)
        .property("Name", name)
        .property("ScheduleExpression", recurrence.expression)
        .property("ScheduleExpressionTimezone", recurrence.timezone)
        .property(
            "FlexibleTimeWindow",
            PropertyValue::map([("Mode", "OFF")]),
        )
        .property(
            "Target",
            PropertyValue::map([
                ("Arn", target.attr("Arn")),
                ("Input", PropertyValue::from(input)),
                (
                    "RetryPolicy",
                    PropertyValue::map([
                        ("MaximumEventAgeInSeconds", retry.maximum_event_age_seconds),
                        ("MaximumRetryAttempts", retry.maximum_retry_attempts),
                    ]),
                ),
                ("RoleArn", role.attr("Arn")),
            ]),
        )
}

/// A string parameter the provisioning engine writes under `key`.
#[must_use]
pub fn store_parameter(
    id: &str,
    key: &ParameterKey,
    value: impl Into<PropertyValue>,
) -> Declared<StoreParameter> {
    Declared::new(id)
        .property("Name", key.as_str())
        .property("Type", "String")
        .property("Value", value)
}

#[cfg(test)]
mod tests {
    use stackwire_common::types::StackId;
    use stackwire_graph::descriptor::ResourceKind;

    use super::*;

    fn key(path: &str) -> DeferredReference {
        DeferredReference::string(ParameterKey::parse(path).expect("key"))
    }

    #[test]
    fn declarations_carry_their_kind() {
        let api = rest_api("Api", "stocks");
        assert_eq!(api.descriptor().kind(), &ResourceKind::RestApi);
        assert_eq!(
            api.descriptor().get("ApiKeySourceType"),
            Some(&PropertyValue::from("HEADER"))
        );
    }

    #[test]
    fn links_render_local_and_deferred_ids() {
        let mut b = GraphBuilder::new(StackId::new("s"));
        let api = rest_api("Api", "stocks").add_to(&mut b).expect("api");
        let local: Link<RestApi> = (&api).into();
        assert_eq!(local.to_ref(), api.to_ref());
        let remote: Link<RestApi> = key("/stocks/api/id").into();
        assert!(matches!(remote.to_ref(), PropertyValue::Deferred(_)));
    }

    #[test]
    fn resource_under_root_reads_root_resource_id() {
        let mut b = GraphBuilder::new(StackId::new("s"));
        let api = rest_api("Api", "stocks").add_to(&mut b).expect("api");
        let webhook = api_resource("Webhook", &(&api).into(), &Parent::Root(api.clone()), "webhook");
        assert_eq!(webhook.descriptor().get("ParentId"), Some(&api.attr("RootResourceId")));
    }

    #[test]
    fn method_depends_on_its_function() {
        let mut b = GraphBuilder::new(StackId::new("s"));
        let role = role("Role", &["lambda.amazonaws.com"], Vec::new())
            .add_to(&mut b)
            .expect("role");
        let code = FunctionCode {
            bucket: PropertyValue::from("bucket"),
            key: PropertyValue::from("fn.zip"),
        };
        let function = function("Fn", "fn", &role, code, "handler", "provided.al2023")
            .add_to(&mut b)
            .expect("fn");
        let method = lambda_proxy_method(
            "Post",
            &key("/stocks/api/id").into(),
            &key("/stocks/sync/resource/id").into(),
            "POST",
            &function,
        )
        .api_key_required(true);
        assert!(method.descriptor().explicit_dependencies().contains(function.id()));
        assert_eq!(
            method.descriptor().get("ApiKeyRequired"),
            Some(&PropertyValue::Boolean(true))
        );
    }

    #[test]
    fn schedule_targets_function_arn() {
        let mut b = GraphBuilder::new(StackId::new("s"));
        let role = role("Role", &["scheduler.amazonaws.com"], Vec::new())
            .add_to(&mut b)
            .expect("role");
        let code = FunctionCode {
            bucket: PropertyValue::from("bucket"),
            key: PropertyValue::from("fn.zip"),
        };
        let target = function("Fn", "fn", &role, code, "handler", "provided.al2023")
            .add_to(&mut b)
            .expect("fn");
        let retry = RetryPolicy {
            maximum_retry_attempts: 185,
            maximum_event_age_seconds: 86_400,
        };
        let nightly = schedule(
            "Nightly",
            "nightly",
            Recurrence {
                expression: "cron(0 0 * * ? *)",
                timezone: "UTC",
            },
            &target,
            &role,
            "{}",
            retry,
        )
        .add_to(&mut b)
        .expect("schedule");
        let graph = b.finalize().expect("finalize");
        let deps = graph.dependencies_of(nightly.id()).expect("deps");
        assert!(deps.contains(target.id()));
    }

    #[test]
    fn legacy_tokens_are_migrated_on_add() {
        let mut b = GraphBuilder::new(StackId::new("s"));
        let _ = deployment("Deployment", &key("/stocks/api/id").into())
            .property("Description", "{{resolve:ssm:/stocks/release}} build")
            .add_to(&mut b)
            .expect("deployment");
        let graph = b.finalize().expect("finalize");
        assert_eq!(graph.deferred_keys().len(), 2);
    }
}
