//! The harmonic-pattern webhook: a function behind
//! `POST /webhook/harmonic-pattern`.

use stackwire_common::error::Result;
use stackwire_graph::kinds::{ApiResource, Function, RestApi};
use stackwire_graph::{Output, PropertyValue};

use super::{API_ID_KEY, WEBHOOK_RESOURCE_KEY, bucket_input, lambda_role, packaged_function};
use crate::blueprint::SectionedBlueprint;
use crate::catalog::{self, Link, Parent};
use crate::section::{SectionContext, section};

const ROLE: &str = "StocksPatternLambdaRole";
const FUNCTION: &str = "StocksPatternLambdaFunction";
const RESOURCE: &str = "HarmonicPatternResource";
const METHOD: &str = "HarmonicPatternPostMethod";
const PERMISSION: &str = "HarmonicPatternInvokePermission";

const TIMEOUT_SECONDS: i64 = 300;

/// Builds the `lambdas` blueprint.
#[must_use]
pub fn blueprint() -> SectionedBlueprint {
    SectionedBlueprint::new("lambdas")
        .require(&[
            "env-dict.BucketName",
            "env-dict.StocksPatternLambdaName",
            "env-dict.SharedSecretsId",
        ])
        .section(section("inputs", bucket_input))
        .section(section("function", function))
        .section(section("routes", routes))
}

fn function(ctx: &mut SectionContext<'_>) -> Result<()> {
    let role = lambda_role(ctx, ROLE, "StocksPatternLambda", "StocksPatternLambdaName")?;
    let declared = packaged_function(ctx, FUNCTION, "StocksPatternLambdaName", &role)?
        .timeout(TIMEOUT_SECONDS);
    let function = ctx.add(declared)?;
    ctx.add_output(Output::attribute("StocksPatternLambdaArn", &function, "Arn"))
}

fn routes(ctx: &mut SectionContext<'_>) -> Result<()> {
    let function = ctx.handle::<Function>(FUNCTION)?;
    let api_id = ctx.deferred_ref(API_ID_KEY)?;
    let api: Link<RestApi> = api_id.clone().into();
    let webhook: Link<ApiResource> = ctx.deferred_ref(WEBHOOK_RESOURCE_KEY)?.into();

    let resource = ctx.add(catalog::api_resource(
        RESOURCE,
        &api,
        &Parent::Resource(webhook),
        "harmonic-pattern",
    ))?;
    let _ = ctx.add(
        catalog::lambda_proxy_method(METHOD, &api, &(&resource).into(), "POST", &function)
            .api_key_required(false),
    )?;
    let source_arn = PropertyValue::sub(
        "arn:aws:execute-api:${AWS::Region}:${AWS::AccountId}:${ApiId}/*/POST/webhook/harmonic-pattern",
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
