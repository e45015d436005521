//! `stw plan` — Show a stack's realization order before composing it.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stackwire_common::constants::DEFAULT_DEPLOYMENT_FILE;
use stackwire_compose::BlueprintRegistry;
use stackwire_graph::StackGraph;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the deployment file.
    #[arg(default_value = DEFAULT_DEPLOYMENT_FILE)]
    pub file: PathBuf,

    /// Stack to plan.
    #[arg(long)]
    pub stack: String,
}

/// Executes the `plan` command.
///
/// Runs the stack's blueprint and finalizes the graph. The parameter store
/// is never opened, so deferred references are listed rather than resolved.
///
/// # Errors
///
/// Returns an error if the stack or its blueprint is unknown, or if the
/// graph fails validation.
pub fn execute(args: &PlanArgs) -> anyhow::Result<()> {
    let config = super::load_deployment(&args.file)?;
    let stack = config.stack(&args.stack).with_context(|| {
        format!("{} has no stack named \"{}\"", args.file.display(), args.stack)
    })?;
    let blueprint = BlueprintRegistry::with_builtins().get(&stack.blueprint)?;
    let graph = stackwire_compose::composer::plan(&stack.name, &stack.variables, blueprint.as_ref())
        .with_context(|| format!("failed to plan stack {}", stack.name))?;

    println!("Deployment Plan for: {} ({})", stack.name, stack.blueprint);
    println!("{}", output::rule(40));
    println!();
    print_graph(&graph);
    Ok(())
}

fn print_graph(graph: &StackGraph) {
    for descriptor in graph.resources() {
        println!("  + {} [{}]", descriptor.logical_id(), descriptor.kind());
        let deps = graph
            .dependencies_of(descriptor.logical_id())
            .filter(|deps| !deps.is_empty());
        if let Some(deps) = deps {
            println!("      after: {}", output::join_ids(deps));
        }
    }
    println!();
    println!("  {} resource(s) will be realized.", graph.resources().len());

    let reads = graph.deferred_keys();
    if !reads.is_empty() {
        println!();
        println!("  Reads from parameter store:");
        for key in reads {
            println!("    < {key}");
        }
    }

    let publishes: Vec<_> = graph.published_outputs().collect();
    if !publishes.is_empty() {
        println!();
        println!("  Publishes:");
        for output in publishes {
            if let Some(key) = &output.publish {
                println!("    > {key} ({})", output.name);
            }
        }
    }
}
