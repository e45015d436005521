//! Composer that drives one stack through its lifecycle.
//!
//! A run validates the stack's variables, lets every blueprint section
//! contribute to a fresh [`GraphBuilder`], finalizes the graph, replaces
//! deferred references with stored values, and finally writes every
//! publish-marked output to the parameter store.

use std::sync::Arc;

use stackwire_common::config::{DeploymentConfig, Variables};
use stackwire_common::constants::APP_NAME;
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{ParameterKey, RunId, StackId};
use stackwire_graph::render::RenderedTemplate;
use stackwire_graph::{GraphBuilder, StackGraph};
use stackwire_store::{ParameterStore, PublishedParameter};

use crate::blueprint::{Blueprint, BlueprintRegistry};
use crate::identity::{self, DeterministicIds, IdentityResolver};
use crate::section::SectionContext;
use crate::state::{CancellationToken, CompositionState};

/// Record of one stack's composition run.
#[derive(Debug, Clone)]
pub struct Composition {
    run_id: RunId,
    stack: StackId,
    state: CompositionState,
    graph: Option<StackGraph>,
    resolved: Option<StackGraph>,
    published: Vec<PublishedParameter>,
}

impl Composition {
    /// A fresh run in the `Empty` state.
    #[must_use]
    pub fn new(stack: StackId) -> Self {
        Self {
            run_id: RunId::generate(),
            stack,
            state: CompositionState::Empty,
            graph: None,
            resolved: None,
            published: Vec::new(),
        }
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The stack being composed.
    #[must_use]
    pub const fn stack(&self) -> &StackId {
        &self.stack
    }

    /// Last state the run completed.
    #[must_use]
    pub const fn state(&self) -> CompositionState {
        self.state
    }

    /// The finalized graph, with deferred references still in place.
    #[must_use]
    pub const fn graph(&self) -> Option<&StackGraph> {
        self.graph.as_ref()
    }

    /// The graph with every deferred reference replaced.
    #[must_use]
    pub const fn resolved(&self) -> Option<&StackGraph> {
        self.resolved.as_ref()
    }

    /// Parameters written by the publish stage.
    #[must_use]
    pub fn published(&self) -> &[PublishedParameter] {
        &self.published
    }

    /// Renders the resolved graph for the provisioning engine.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the run never reached `Resolved`.
    pub fn template(&self) -> Result<RenderedTemplate> {
        let graph = self.resolved.as_ref().ok_or_else(|| StackwireError::Config {
            message: format!(
                "stack {} has no resolved graph (state: {})",
                self.stack, self.state
            ),
        })?;
        RenderedTemplate::render(graph)
    }

    fn advance(&mut self, to: CompositionState) {
        debug_assert_eq!(self.state.next(), Some(to));
        tracing::info!(stack = %self.stack, from = %self.state, to = %to, "stage complete");
        self.state = to;
    }
}

/// Drives compositions against a shared parameter store.
///
/// A composer is `Send + Sync`; independent stacks may be composed from
/// separate threads through the same instance.
#[derive(Clone)]
pub struct Composer {
    store: ParameterStore,
    identity: Arc<dyn IdentityResolver>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("store", &self.store.describe())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Composer {
    /// Creates a composer publishing to `store`, with deterministic ids in
    /// the default namespace.
    #[must_use]
    pub fn new(store: ParameterStore) -> Self {
        Self {
            store,
            identity: Arc::new(DeterministicIds::new(APP_NAME)),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the resolver used to evaluate published outputs.
    #[must_use]
    pub fn with_identity(mut self, identity: impl IdentityResolver + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Shares `token` with the caller so it can abort runs.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The parameter store this composer reads and publishes to.
    #[must_use]
    pub const fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// The token checked between sections and stages.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Composes a fresh run of `blueprint` for `stack`.
    ///
    /// # Errors
    ///
    /// As [`Self::compose`].
    pub fn run(
        &self,
        stack: StackId,
        variables: &Variables,
        blueprint: &dyn Blueprint,
    ) -> Result<Composition> {
        let mut composition = Composition::new(stack);
        self.compose(&mut composition, variables, blueprint)?;
        Ok(composition)
    }

    /// Advances `composition` from `Empty` to `Published`.
    ///
    /// On failure the composition keeps the last state it completed and
    /// nothing after that state is recorded. Nothing is published unless
    /// every earlier stage succeeded, and a failed publish leaves the store
    /// as it was before the stage began.
    ///
    /// # Errors
    ///
    /// - `Config` if `composition` is not `Empty`.
    /// - `MissingVariable` before any section runs.
    /// - `Section` wrapping whatever a section raised.
    /// - Finalization errors (`UnknownResource`, `DependencyCycle`, ...).
    /// - `UnresolvedCrossStackReference` or `TypeMismatch` from resolution.
    /// - `StoreUnavailable` from the store.
    /// - `Cancelled` if the token fires between sections or stages.
    pub fn compose(
        &self,
        composition: &mut Composition,
        variables: &Variables,
        blueprint: &dyn Blueprint,
    ) -> Result<()> {
        let span = tracing::info_span!(
            "compose",
            stack = %composition.stack,
            run_id = %composition.run_id,
            blueprint = blueprint.name(),
        );
        let _enter = span.enter();

        if composition.state != CompositionState::Empty {
            return Err(StackwireError::Config {
                message: format!(
                    "stack {} was already composed (state: {})",
                    composition.stack, composition.state
                ),
            });
        }
        let stack = composition.stack.clone();

        variables.validate_required(&stack, blueprint.required_variables())?;
        composition.advance(CompositionState::Building);
        let builder = build(&stack, variables, blueprint, Some(&self.cancel))?;

        let graph = builder.finalize()?;
        composition.advance(CompositionState::Finalized);
        let graph = &*composition.graph.insert(graph);
        self.check_cancelled(&stack, CompositionState::Finalized)?;

        let resolved = self.store.resolve_all(graph)?;
        composition.advance(CompositionState::Resolved);
        let resolved = &*composition.resolved.insert(resolved);
        self.check_cancelled(&stack, CompositionState::Resolved)?;

        let values = self.render_published(resolved)?;
        let published = self.store.put_all(values, &stack)?;
        for record in &published {
            tracing::info!(key = %record.key, "published");
        }
        composition.published = published;
        composition.advance(CompositionState::Published);
        Ok(())
    }

    /// Composes the stacks of a deployment file in file order.
    ///
    /// With `only`, composes that single stack and expects the stacks it
    /// depends on to have published already.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an unknown stack or blueprint name, otherwise
    /// the first composition error; earlier stacks stay published.
    pub fn run_deployment(
        &self,
        config: &DeploymentConfig,
        registry: &BlueprintRegistry,
        only: Option<&str>,
    ) -> Result<Vec<Composition>> {
        let mut compositions = Vec::new();
        let _ = self.run_deployment_with(config, registry, only, |composition| {
            compositions.push(composition);
            Ok::<_, StackwireError>(())
        })?;
        Ok(compositions)
    }

    /// Like [`Self::run_deployment`], but hands each composition to
    /// `on_published` as soon as it reaches `Published`, before the next
    /// stack starts. Returns the number of stacks composed.
    ///
    /// # Errors
    ///
    /// As [`Self::run_deployment`], or the first error `on_published`
    /// returns, which also stops the deployment.
    pub fn run_deployment_with<E, F>(
        &self,
        config: &DeploymentConfig,
        registry: &BlueprintRegistry,
        only: Option<&str>,
        mut on_published: F,
    ) -> std::result::Result<usize, E>
    where
        E: From<StackwireError>,
        F: FnMut(Composition) -> std::result::Result<(), E>,
    {
        if let Some(name) = only {
            if config.stack(name).is_none() {
                return Err(StackwireError::Config {
                    message: format!("deployment has no stack named \"{name}\""),
                }
                .into());
            }
        }
        let mut composed = 0;
        for stack in &config.stacks {
            if only.is_some_and(|name| name != stack.name.as_str()) {
                continue;
            }
            let blueprint = registry.get(&stack.blueprint)?;
            let composition = self.run(stack.name.clone(), &stack.variables, blueprint.as_ref())?;
            composed += 1;
            on_published(composition)?;
        }
        tracing::info!(
            namespace = %config.namespace,
            stacks = composed,
            "deployment composed"
        );
        Ok(composed)
    }

    fn render_published(
        &self,
        graph: &StackGraph,
    ) -> Result<Vec<(ParameterKey, String)>> {
        graph
            .published_outputs()
            .filter_map(|output| output.publish.clone().map(|key| (key, output)))
            .map(|(key, output)| {
                let value = identity::render_output(self.identity.as_ref(), graph, output)?;
                Ok((key, value))
            })
            .collect()
    }

    fn check_cancelled(&self, stack: &StackId, phase: CompositionState) -> Result<()> {
        cancelled(Some(&self.cancel), stack, || phase.to_string())
    }
}

/// Builds and finalizes `blueprint` for `stack` without touching any store.
///
/// # Errors
///
/// Returns `MissingVariable`, a `Section`-wrapped section error, or a
/// finalization error.
pub fn plan(
    stack: &StackId,
    variables: &Variables,
    blueprint: &dyn Blueprint,
) -> Result<StackGraph> {
    variables.validate_required(stack, blueprint.required_variables())?;
    build(stack, variables, blueprint, None)?.finalize()
}

fn build(
    stack: &StackId,
    variables: &Variables,
    blueprint: &dyn Blueprint,
    cancel: Option<&CancellationToken>,
) -> Result<GraphBuilder> {
    let mut builder = GraphBuilder::new(stack.clone());
    let mut last = String::from("validation");
    for section in blueprint.sections() {
        cancelled(cancel, stack, || last.clone())?;
        tracing::debug!(section = section.name(), "running section");
        let mut ctx = SectionContext::new(stack, variables, &mut builder);
        section
            .contribute(&mut ctx)
            .map_err(|source| StackwireError::Section {
                stack: stack.clone(),
                section: section.name().to_string(),
                source: Box::new(source),
            })?;
        last = format!("section \"{}\"", section.name());
    }
    cancelled(cancel, stack, || last.clone())?;
    tracing::debug!(resources = builder.len(), "sections complete");
    Ok(builder)
}

fn cancelled(
    token: Option<&CancellationToken>,
    stack: &StackId,
    phase: impl FnOnce() -> String,
) -> Result<()> {
    match token {
        Some(token) if token.is_cancelled() => {
            let phase = phase();
            tracing::warn!(stack = %stack, phase = %phase, "composition cancelled");
            Err(StackwireError::Cancelled {
                stack: stack.clone(),
                phase,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use stackwire_graph::kinds::RestApi;
    use stackwire_graph::{InputVariable, Output, PropertyValue};
    use stackwire_store::{MemoryBackend, ParameterBackend};

    use super::*;
    use crate::blueprint::SectionedBlueprint;
    use crate::blueprints::test_support::stocks_variables;
    use crate::blueprints::{self, API_ID_KEY};
    use crate::catalog;
    use crate::section::section;

    /// Memory backend whose `fail_on`-th `put` (1-based) fails.
    #[derive(Debug)]
    struct FailingPut {
        inner: MemoryBackend,
        puts: AtomicUsize,
        fail_on: usize,
    }

    impl ParameterBackend for FailingPut {
        fn put(&self, record: PublishedParameter) -> Result<Option<PublishedParameter>> {
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StackwireError::StoreUnavailable {
                    message: "down".into(),
                });
            }
            self.inner.put(record)
        }

        fn get(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
            self.inner.get(key)
        }

        fn remove(&self, key: &ParameterKey) -> Result<Option<PublishedParameter>> {
            self.inner.remove(key)
        }

        fn list(&self, prefix: &str) -> Result<Vec<PublishedParameter>> {
            self.inner.list(prefix)
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn publisher() -> SectionedBlueprint {
        SectionedBlueprint::new("publisher")
            .require(&["Name"])
            .section(section("api", |ctx| {
                let name = ctx.var("Name")?;
                let api = ctx.add(catalog::rest_api("Api", name))?;
                let key = ParameterKey::parse("/api/id")?;
                ctx.add_output(Output::reference("ApiId", &api).publish_as(key))
            }))
    }

    fn variables() -> Variables {
        Variables::new().with("Name", "stocks")
    }

    #[test]
    fn run_reaches_published() {
        let composer = Composer::new(ParameterStore::memory());
        let composition = composer
            .run(StackId::new("api"), &variables(), &publisher())
            .expect("run");
        assert_eq!(composition.state(), CompositionState::Published);
        assert_eq!(composition.published().len(), 1);
        let stored = composer
            .store()
            .get_value(&composition.published()[0].key)
            .expect("stored");
        assert_eq!(stored, composition.published()[0].value);
        assert!(composition.template().is_ok());
    }

    #[test]
    fn missing_variable_leaves_run_empty() {
        let composer = Composer::new(ParameterStore::memory());
        let mut composition = Composition::new(StackId::new("api"));
        let err = composer
            .compose(&mut composition, &Variables::new(), &publisher())
            .unwrap_err();
        assert!(matches!(err, StackwireError::MissingVariable { ref key, .. } if key == "Name"));
        assert_eq!(composition.state(), CompositionState::Empty);
        assert!(composition.graph().is_none());
    }

    #[test]
    fn section_errors_name_the_section() {
        let blueprint = SectionedBlueprint::new("broken")
            .section(section("gateway", |ctx| {
                let _ = ctx.add(catalog::rest_api("Api", "a"))?;
                Ok(())
            }))
            .section(section("again", |ctx| {
                let _ = ctx.add(catalog::rest_api("Api", "b"))?;
                Ok(())
            }));
        let composer = Composer::new(ParameterStore::memory());
        let mut composition = Composition::new(StackId::new("api"));
        let err = composer
            .compose(&mut composition, &Variables::new(), &blueprint)
            .unwrap_err();
        assert_eq!(err.section(), Some("again"));
        assert!(matches!(err.root(), StackwireError::DuplicateLogicalId { .. }));
        assert_eq!(composition.state(), CompositionState::Building);
    }

    #[test]
    fn later_sections_see_earlier_descriptors() {
        let blueprint = SectionedBlueprint::new("two-pass")
            .section(section("gateway", |ctx| {
                let _ = ctx.add(catalog::rest_api("Api", "a"))?;
                Ok(())
            }))
            .section(section("outputs", |ctx| {
                let api = ctx.handle::<RestApi>("Api")?;
                ctx.add_output(Output::reference("ApiId", &api))
            }));
        let graph = plan(&StackId::new("api"), &Variables::new(), &blueprint).expect("plan");
        assert_eq!(graph.outputs().len(), 1);
    }

    #[test]
    fn composing_twice_is_rejected() {
        let composer = Composer::new(ParameterStore::memory());
        let mut composition = Composition::new(StackId::new("api"));
        composer
            .compose(&mut composition, &variables(), &publisher())
            .expect("first");
        let err = composer
            .compose(&mut composition, &variables(), &publisher())
            .unwrap_err();
        assert!(matches!(err, StackwireError::Config { .. }));
        assert_eq!(composition.state(), CompositionState::Published);
    }

    #[test]
    fn failed_publish_leaves_store_untouched() {
        // Put 1 seeds the store; the api stack's third key is put 4.
        let store = ParameterStore::new(FailingPut {
            inner: MemoryBackend::new(),
            puts: AtomicUsize::new(0),
            fail_on: 4,
        });
        let api_id = ParameterKey::parse(API_ID_KEY).expect("key");
        let _ = store.put(&api_id, "previous", &StackId::new("old-api")).expect("seed");
        let before = store.list("/").expect("list");

        let composer = Composer::new(store);
        let mut composition = Composition::new(StackId::new("api"));
        let err = composer
            .compose(&mut composition, &stocks_variables(), &blueprints::api::blueprint())
            .unwrap_err();

        assert!(matches!(err, StackwireError::StoreUnavailable { .. }), "got: {err}");
        assert_eq!(composition.state(), CompositionState::Resolved);
        assert!(composition.published().is_empty());
        assert_eq!(composer.store().list("/").expect("list"), before);
        let restored = composer.store().get(&api_id).expect("restored");
        assert_eq!(restored.producing_stack.as_str(), "old-api");
    }

    #[test]
    fn unrenderable_output_publishes_nothing() {
        let blueprint = SectionedBlueprint::new("inputs").section(section("outputs", |ctx| {
            let api = ctx.add(catalog::rest_api("Api", "stocks"))?;
            ctx.add_output(
                Output::reference("ApiId", &api).publish_as(ParameterKey::parse("/api/id")?),
            )?;
            let bucket = ctx.add_input(InputVariable::string("Bucket"))?;
            let location =
                PropertyValue::sub("${Api}/${Bucket}", [("Api", api.to_ref()), ("Bucket", bucket)]);
            ctx.add_output(
                Output::value("Location", location)
                    .publish_as(ParameterKey::parse("/api/location")?),
            )
        }));
        let composer = Composer::new(ParameterStore::memory());
        let mut composition = Composition::new(StackId::new("api"));
        let err = composer
            .compose(&mut composition, &Variables::new(), &blueprint)
            .unwrap_err();

        assert!(matches!(err, StackwireError::Config { .. }), "got: {err}");
        assert_eq!(composition.state(), CompositionState::Resolved);
        assert!(composition.published().is_empty());
        assert!(composer.store().list("/").expect("list").is_empty());
    }

    #[test]
    fn cancelled_token_stops_before_first_section() {
        let token = CancellationToken::new();
        token.cancel();
        let composer = Composer::new(ParameterStore::memory()).with_cancellation(token);
        let mut composition = Composition::new(StackId::new("api"));
        let err = composer
            .compose(&mut composition, &variables(), &publisher())
            .unwrap_err();
        assert!(
            matches!(err, StackwireError::Cancelled { ref phase, .. } if phase == "validation"),
            "got: {err}"
        );
        assert!(composition.graph().is_none());
        assert!(composer.store().list("/").expect("list").is_empty());
    }

    #[test]
    fn deployment_hands_over_each_stack_before_the_next_fails() {
        let config = DeploymentConfig::from_yaml_str(
            "namespace: test
store:
  backend: memory
stacks:
  - name: stocks-api
    blueprint: api
    variables:
      env-dict:
        ApiName: stocks-api
  - name: stocks-lambdas
    blueprint: lambdas
",
        )
        .expect("config");
        let composer = Composer::new(ParameterStore::memory());
        let mut handed_over = Vec::new();
        let err = composer
            .run_deployment_with(&config, &BlueprintRegistry::with_builtins(), None, |c| {
                handed_over.push(c.stack().to_string());
                Ok::<_, StackwireError>(())
            })
            .unwrap_err();
        assert!(matches!(err, StackwireError::MissingVariable { .. }), "got: {err}");
        assert_eq!(handed_over, vec!["stocks-api"]);
        assert_eq!(composer.store().list("/stocks").expect("list").len(), 4);
    }

    #[test]
    fn unknown_stack_in_deployment_is_rejected() {
        let config = DeploymentConfig::from_yaml_str(
            "namespace: test\nstore:\n  backend: memory\nstacks: []\n",
        )
        .expect("config");
        let composer = Composer::new(ParameterStore::memory());
        let err = composer
            .run_deployment(&config, &BlueprintRegistry::with_builtins(), Some("api"))
            .unwrap_err();
        assert!(err.to_string().contains("no stack named"), "got: {err}");
    }
}
