//! Order synchronization: a function behind `POST /sync/orders`, invoked
//! nightly by a schedule and on demand by API-key holders.

use stackwire_common::error::Result;
use stackwire_graph::kinds::{ApiResource, Function, RestApi};
use stackwire_graph::PropertyValue;

use super::{API_ID_KEY, SYNC_RESOURCE_KEY, bucket_input, lambda_role, packaged_function};
use crate::blueprint::SectionedBlueprint;
use crate::catalog::{self, Link, Parent, Policy, Recurrence, RetryPolicy};
use crate::section::{SectionContext, section};

const ROLE: &str = "OrderSyncLambdaExecutionRole";
const FUNCTION: &str = "OrderSyncLambdaFunction";
const RESOURCE: &str = "OrderSyncResource";
const METHOD: &str = "OrderSyncMethod";
const PERMISSION: &str = "OrderSyncInvokePermission";
const SCHEDULER_ROLE: &str = "OrderSyncSchedulerExecutionRole";
const SCHEDULE: &str = "OrderSyncScheduler";

const SCHEDULE_NAME: &str = "order-sync-scheduler";
const NIGHTLY: Recurrence<'static> = Recurrence {
    expression: "cron(0 0 * * ? *)",
    timezone: "America/Los_Angeles",
};
const RETRY: RetryPolicy = RetryPolicy {
    maximum_retry_attempts: 185,
    maximum_event_age_seconds: 86_400,
};
const SYNC_REQUEST: &str = r#"{"httpMethod": "POST", "path": "/sync/orders"}"#;

/// Builds the `jobs` blueprint.
#[must_use]
pub fn blueprint() -> SectionedBlueprint {
    SectionedBlueprint::new("jobs")
        .require(&[
            "env-dict.BucketName",
            "env-dict.OrderSyncLambdaName",
            "env-dict.SharedSecretsId",
        ])
        .section(section("inputs", bucket_input))
        .section(section("order-sync", order_sync))
        .section(section("scheduler", scheduler))
}

fn order_sync(ctx: &mut SectionContext<'_>) -> Result<()> {
    let role = lambda_role(ctx, ROLE, "OrderSyncLambda", "OrderSyncLambdaName")?;
    let declared = packaged_function(ctx, FUNCTION, "OrderSyncLambdaName", &role)?;
    let function = ctx.add(declared)?;

    let api_id = ctx.deferred_ref(API_ID_KEY)?;
    let api: Link<RestApi> = api_id.clone().into();
    let sync: Link<ApiResource> = ctx.deferred_ref(SYNC_RESOURCE_KEY)?.into();
    let resource = ctx.add(catalog::api_resource(
        RESOURCE,
        &api,
        &Parent::Resource(sync),
        "orders",
    ))?;
    let _ = ctx.add(
        catalog::lambda_proxy_method(METHOD, &api, &(&resource).into(), "POST", &function)
            .api_key_required(true),
    )?;
    let source_arn = PropertyValue::sub(
        "arn:aws:execute-api:${AWS::Region}:${AWS::AccountId}:${ApiId}/*/POST/sync/orders",
        [("ApiId", api_id)],
    );
    let _ = ctx.add(catalog::invoke_permission(
        PERMISSION,
        &function,
        "apigateway.amazonaws.com",
        source_arn,
    ))?;
    Ok(())
}

fn scheduler(ctx: &mut SectionContext<'_>) -> Result<()> {
    let function = ctx.handle::<Function>(FUNCTION)?;
    let no_vars = Vec::<(String, PropertyValue)>::new;

    let trust = PropertyValue::map([
        ("Effect", PropertyValue::from("Allow")),
        (
            "Principal",
            PropertyValue::map([("Service", "scheduler.amazonaws.com")]),
        ),
        ("Action", PropertyValue::from("sts:AssumeRole")),
        (
            "Condition",
            PropertyValue::map([(
                "StringEquals",
                PropertyValue::map([
                    (
                        "aws:SourceArn",
                        PropertyValue::sub(
                            format!(
                                "arn:aws:scheduler:${{AWS::Region}}:${{AWS::AccountId}}:schedule/default/{SCHEDULE_NAME}"
                            ),
                            no_vars(),
                        ),
                    ),
                    ("aws:SourceAccount", PropertyValue::sub("${AWS::AccountId}", no_vars())),
                ]),
            )]),
        ),
    ]);
    let invoke = Policy::new("OrderSyncSchedulerExecutionPolicy").allow(
        ["lambda:InvokeFunction"],
        [
            function.attr("Arn"),
            PropertyValue::sub("${LambdaArn}:*", [("LambdaArn", function.attr("Arn"))]),
        ],
    );
    let role = ctx.add(catalog::role_with_trust(SCHEDULER_ROLE, trust, vec![invoke]))?;

    let schedule = catalog::schedule(
        SCHEDULE,
        SCHEDULE_NAME,
        NIGHTLY,
        &function,
        &role,
        SYNC_REQUEST,
        RETRY,
    )
    .property("Description", "Order Sync Scheduler");
    let _ = ctx.add(schedule)?;
    Ok(())
}
