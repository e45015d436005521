//! End-to-end compositions across stacks sharing one parameter store.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::thread;

use serde_json::json;
use stackwire_common::config::{DeploymentConfig, Variables};
use stackwire_common::error::StackwireError;
use stackwire_common::types::{ParameterKey, StackId};
use stackwire_compose::blueprint::SectionedBlueprint;
use stackwire_compose::blueprints::{self, SYNC_RESOURCE_KEY};
use stackwire_compose::catalog::{self, Link};
use stackwire_compose::identity::IdentityResolver;
use stackwire_compose::section::section;
use stackwire_compose::{
    Blueprint, BlueprintRegistry, CancellationToken, Composer, Composition, CompositionState,
};
use stackwire_graph::kinds::RestApi;
use stackwire_graph::{Output, ResourceDescriptor};
use stackwire_store::{FileBackend, ParameterStore};

/// Assigns every resource the same fixed physical id.
struct FixedIds(&'static str);

impl IdentityResolver for FixedIds {
    fn physical_id(&self, _stack: &StackId, _descriptor: &ResourceDescriptor) -> String {
        self.0.to_string()
    }

    fn attribute(&self, _stack: &StackId, _descriptor: &ResourceDescriptor, attribute: &str) -> String {
        format!("{}.{attribute}", self.0)
    }
}

fn producer() -> SectionedBlueprint {
    SectionedBlueprint::new("producer").section(section("api", |ctx| {
        let api = ctx.add(catalog::rest_api("Api", "stocks"))?;
        let key = ParameterKey::parse("/api/id")?;
        ctx.add_output(Output::reference("ApiId", &api).publish_as(key))
    }))
}

fn consumer() -> SectionedBlueprint {
    SectionedBlueprint::new("consumer").section(section("deployment", |ctx| {
        let api: Link<RestApi> = ctx.deferred_ref("/api/id")?.into();
        let _ = ctx.add(catalog::deployment("Deployment", &api))?;
        Ok(())
    }))
}

fn stocks_variables() -> Variables {
    let mut variables = Variables::new();
    for (name, value) in [
        ("ApiName", "stocks-api"),
        ("ApiUsagePlanName", "stocks-usage-plan"),
        ("ApiKeyName", "stocks-api-key"),
        ("BucketName", "stocks-artifacts"),
        ("StocksPatternLambdaName", "stocks-pattern"),
        ("OrderSyncLambdaName", "order-sync"),
        ("SharedSecretsId", "stocks/shared"),
    ] {
        variables.insert_path(&format!("env-dict.{name}"), value);
    }
    variables
}

#[test]
fn consumer_reads_the_id_the_producer_published() {
    let composer = Composer::new(ParameterStore::memory()).with_identity(FixedIds("abc123"));

    let a = composer
        .run(StackId::new("a"), &Variables::new(), &producer())
        .expect("producer");
    assert_eq!(a.published()[0].value, "abc123");

    let b = composer
        .run(StackId::new("b"), &Variables::new(), &consumer())
        .expect("consumer");
    let template = b.template().expect("template");
    let deployment = template.resource("Deployment").expect("deployment");
    assert_eq!(deployment.properties["RestApiId"], json!("abc123"));
}

#[test]
fn consumer_before_producer_fails_unresolved() {
    let composer = Composer::new(ParameterStore::memory());
    let mut b = Composition::new(StackId::new("b"));
    let err = composer
        .compose(&mut b, &Variables::new(), &consumer())
        .unwrap_err();
    match err {
        StackwireError::UnresolvedCrossStackReference { key, resource, .. } => {
            assert_eq!(key, "/api/id");
            assert_eq!(resource.as_str(), "Deployment");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(b.state(), CompositionState::Finalized);
    assert!(b.resolved().is_none());
    assert!(b.graph().is_some());
    assert!(b.template().is_err());
}

#[test]
fn builtin_stacks_compose_in_order() {
    let composer = Composer::new(ParameterStore::memory());
    let variables = stocks_variables();
    let mut runs = Vec::new();
    for blueprint in [
        blueprints::api::blueprint(),
        blueprints::integrations::blueprint(),
        blueprints::lambdas::blueprint(),
        blueprints::jobs::blueprint(),
    ] {
        let stack = StackId::new(blueprint.name());
        runs.push(composer.run(stack, &variables, &blueprint).expect("compose"));
    }
    assert!(runs.iter().all(|r| r.state() == CompositionState::Published));
    assert_eq!(runs[0].published().len(), 4);

    let sync_id = composer
        .store()
        .get_value(&ParameterKey::parse(SYNC_RESOURCE_KEY).expect("key"))
        .expect("sync id");
    let jobs = runs[3].template().expect("template");
    let orders = jobs.resource("OrderSyncResource").expect("orders");
    assert_eq!(orders.properties["ParentId"], json!(sync_id));
    assert_eq!(orders.properties["PathPart"], json!("orders"));
}

#[test]
fn builtin_consumer_without_api_stack_names_the_missing_key() {
    let composer = Composer::new(ParameterStore::memory());
    let err = composer
        .run(StackId::new("lambdas"), &stocks_variables(), &blueprints::lambdas::blueprint())
        .unwrap_err();
    assert!(
        matches!(&err, StackwireError::UnresolvedCrossStackReference { key, .. } if key == "/stocks/api/id"),
        "got: {err}"
    );
    assert!(!err.is_transient());
}

#[test]
fn deployment_file_runs_stacks_in_file_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store_path = dir.path().join("parameters.json");
    let yaml = format!(
        r"
namespace: prod
store:
  backend: file
  path: {}
stacks:
  - name: stocks-api
    blueprint: api
    variables:
      env-dict:
        ApiName: stocks-api
  - name: stocks-integrations
    blueprint: integrations
    variables:
      env-dict:
        ApiUsagePlanName: stocks-usage-plan
        ApiKeyName: stocks-api-key
",
        store_path.display()
    );
    let config = DeploymentConfig::from_yaml_str(&yaml).expect("config");
    let store = ParameterStore::from_config(&config.store).expect("store");
    let composer = Composer::new(store);

    let runs = composer
        .run_deployment(&config, &BlueprintRegistry::with_builtins(), None)
        .expect("deployment");
    let names: Vec<_> = runs.iter().map(|r| r.stack().as_str().to_string()).collect();
    assert_eq!(names, vec!["stocks-api", "stocks-integrations"]);

    let reopened = ParameterStore::new(FileBackend::open(&store_path).expect("open"));
    let published = reopened.list("/stocks").expect("list");
    assert_eq!(published.len(), 4);
    assert!(published.iter().all(|p| p.producing_stack.as_str() == "stocks-api"));
}

#[test]
fn cancellation_between_stacks_stops_the_deployment() {
    let token = CancellationToken::new();
    let composer = Composer::new(ParameterStore::memory()).with_cancellation(token.clone());
    let cancel_after_api = SectionedBlueprint::new("tripwire").section(section("cancel", move |_| {
        token.cancel();
        Ok(())
    }));

    let mut run = Composition::new(StackId::new("tripwire"));
    let err = composer
        .compose(&mut run, &Variables::new(), &cancel_after_api)
        .unwrap_err();
    assert!(
        matches!(&err, StackwireError::Cancelled { phase, .. } if phase == "section \"cancel\""),
        "got: {err}"
    );
    assert_eq!(run.state(), CompositionState::Building);
    assert!(run.graph().is_none());

    let err = composer
        .run(StackId::new("api"), &stocks_variables(), &blueprints::api::blueprint())
        .unwrap_err();
    assert!(matches!(err, StackwireError::Cancelled { .. }));
    assert!(composer.store().list("/").expect("list").is_empty());
}

#[test]
fn independent_stacks_compose_concurrently() {
    let composer = Composer::new(ParameterStore::memory());
    thread::scope(|s| {
        for n in 0..6 {
            let composer = &composer;
            let _ = s.spawn(move || {
                let blueprint = SectionedBlueprint::new("tenant").section(section(
                    "api",
                    move |ctx| {
                        let api = ctx.add(catalog::rest_api("Api", format!("tenant-{n}")))?;
                        let key = ParameterKey::parse(format!("/tenants/{n}/api/id"))?;
                        ctx.add_output(Output::reference("ApiId", &api).publish_as(key))
                    },
                ));
                let run = composer
                    .run(StackId::new(format!("tenant-{n}")), &Variables::new(), &blueprint)
                    .expect("compose");
                assert_eq!(run.state(), CompositionState::Published);
            });
        }
    });
    assert_eq!(composer.store().list("/tenants").expect("list").len(), 6);
}

#[test]
fn demo_deployment_composes_end_to_end() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/stocks.yaml");
    let config = DeploymentConfig::load(&path).expect("demo deployment");
    let composer = Composer::new(ParameterStore::memory());

    let runs = composer
        .run_deployment(&config, &BlueprintRegistry::with_builtins(), None)
        .expect("deployment");
    assert_eq!(runs.len(), 4);
    for run in &runs {
        let json = run.template().expect("template").to_json_pretty().expect("json");
        assert!(!json.contains("Stackwire::Deferred"), "{}: {json}", run.stack());
    }
}
