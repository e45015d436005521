//! The REST API and its top-level path resources.
//!
//! This is the producing stack: every id the other stacks attach to is
//! published from here.

use stackwire_common::error::Result;
use stackwire_common::types::ParameterKey;
use stackwire_graph::kinds::{ApiResource, RestApi};
use stackwire_graph::Output;

use super::{API_ID_KEY, API_ROOT_RESOURCE_KEY, SYNC_RESOURCE_KEY, WEBHOOK_RESOURCE_KEY, env};
use crate::blueprint::SectionedBlueprint;
use crate::catalog::{self, Link, Parent};
use crate::section::{SectionContext, section};

const REST_API: &str = "StocksApi";
const WEBHOOK: &str = "WebhookResource";
const SYNC: &str = "SyncResource";

/// Builds the `api` blueprint.
#[must_use]
pub fn blueprint() -> SectionedBlueprint {
    SectionedBlueprint::new("api")
        .require(&["env-dict.ApiName"])
        .section(section("gateway", gateway))
        .section(section("parameters", parameters))
}

fn gateway(ctx: &mut SectionContext<'_>) -> Result<()> {
    let name = ctx.var(&env("ApiName"))?;
    let api = ctx.add(catalog::rest_api(REST_API, name))?;
    let link = Link::from(&api);
    let root = Parent::Root(api.clone());
    let _ = ctx.add(catalog::api_resource(WEBHOOK, &link, &root, "webhook"))?;
    let _ = ctx.add(catalog::api_resource(SYNC, &link, &root, "sync"))?;
    Ok(())
}

fn parameters(ctx: &mut SectionContext<'_>) -> Result<()> {
    let api = ctx.handle::<RestApi>(REST_API)?;
    let webhook = ctx.handle::<ApiResource>(WEBHOOK)?;
    let sync = ctx.handle::<ApiResource>(SYNC)?;

    let published = [
        ("StocksApiId", API_ID_KEY, api.to_ref(), "Stocks REST API id"),
        (
            "StocksApiRootResourceId",
            API_ROOT_RESOURCE_KEY,
            api.attr("RootResourceId"),
            "Root resource of the stocks REST API",
        ),
        ("WebhookResourceId", WEBHOOK_RESOURCE_KEY, webhook.to_ref(), "/webhook resource id"),
        ("SyncResourceId", SYNC_RESOURCE_KEY, sync.to_ref(), "/sync resource id"),
    ];
    for (name, key, value, description) in published {
        let key = ParameterKey::parse(key)?;
        let _ = ctx.add(catalog::store_parameter(
            &format!("{name}Parameter"),
            &key,
            value.clone(),
        ))?;
        ctx.add_output(Output::value(name, value).publish_as(key).describe(description))?;
    }
    Ok(())
}
