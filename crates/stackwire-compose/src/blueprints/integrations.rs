//! Deployment, stage, and metered access for the shared REST API.

use stackwire_common::error::Result;
use stackwire_graph::Output;
use stackwire_graph::kinds::{ApiStage, RestApi};

use super::{API_ID_KEY, env};
use crate::blueprint::SectionedBlueprint;
use crate::catalog::{self, Link, Quota, Throttle};
use crate::section::{SectionContext, section};

const DEPLOYMENT: &str = "StocksApiDeployment";
const STAGE: &str = "StocksApiStage";
const USAGE_PLAN: &str = "StocksApiUsagePlan";
const API_KEY: &str = "StocksApiKey";
const USAGE_PLAN_KEY: &str = "StocksApiUsagePlanKey";

/// Stage every deployment is served from.
pub const STAGE_NAME: &str = "api";

const QUOTA: Quota = Quota {
    limit: 100_000,
    period: "MONTH",
};

const THROTTLE: Throttle = Throttle {
    burst_limit: 100,
    rate_limit: 50,
};

/// Builds the `integrations` blueprint.
#[must_use]
pub fn blueprint() -> SectionedBlueprint {
    SectionedBlueprint::new("integrations")
        .require(&["env-dict.ApiUsagePlanName", "env-dict.ApiKeyName"])
        .section(section("deployment", deployment))
        .section(section("usage-plan", usage_plan))
}

fn api(ctx: &SectionContext<'_>) -> Result<Link<RestApi>> {
    Ok(ctx.deferred_ref(API_ID_KEY)?.into())
}

fn deployment(ctx: &mut SectionContext<'_>) -> Result<()> {
    let api = api(ctx)?;
    let deployment = ctx.add(catalog::deployment(DEPLOYMENT, &api))?;
    let _ = ctx.add(catalog::stage(STAGE, &api, &deployment, STAGE_NAME))?;
    Ok(())
}

fn usage_plan(ctx: &mut SectionContext<'_>) -> Result<()> {
    let api = api(ctx)?;
    let stage = ctx.handle::<ApiStage>(STAGE)?;
    let plan_name = ctx.var(&env("ApiUsagePlanName"))?;
    let key_name = ctx.var(&env("ApiKeyName"))?;

    let plan = ctx.add(catalog::usage_plan(
        USAGE_PLAN, plan_name, &api, &stage, QUOTA, THROTTLE,
    ))?;
    let key = ctx.add(catalog::api_key(API_KEY, key_name))?;
    let _ = ctx.add(catalog::usage_plan_key(USAGE_PLAN_KEY, &plan, &key))?;
    ctx.add_output(Output::reference("StocksApiKeyId", &key).describe("Metered API key"))
}
