//! `stw render` — Compose stacks and write their templates.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use stackwire_common::constants::DEFAULT_DEPLOYMENT_FILE;
use stackwire_compose::identity::DeterministicIds;
use stackwire_compose::{BlueprintRegistry, CancellationToken, Composer, Composition};
use stackwire_store::ParameterStore;

use crate::output;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the deployment file.
    #[arg(default_value = DEFAULT_DEPLOYMENT_FILE)]
    pub file: PathBuf,

    /// Compose only this stack; the stacks it reads from must have published.
    #[arg(long)]
    pub stack: Option<String>,

    /// Directory receiving one `<stack>.json` per stack (stdout when absent).
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Executes the `render` command.
///
/// Stacks are composed in file order, each publishing into the configured
/// store before the next one resolves against it. A stack's template is
/// written as soon as it publishes, so a later failure keeps the templates
/// of the stacks already in the store. Ctrl-C aborts at the next section or
/// stage boundary.
///
/// # Errors
///
/// Returns an error if the deployment file cannot be loaded, any stack fails
/// to compose, or a template cannot be written.
pub fn execute(args: &RenderArgs) -> anyhow::Result<()> {
    let config = super::load_deployment(&args.file)?;
    let store = ParameterStore::from_config(&config.store)
        .context("failed to open parameter store")?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("failed to set Ctrl+C handler")?;

    let composer = Composer::new(store)
        .with_identity(DeterministicIds::new(config.namespace.clone()))
        .with_cancellation(token);
    tracing::info!(store = %composer.store().describe(), file = %args.file.display(), "rendering");

    if let Some(dir) = &args.out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let mut rendered = Vec::new();
    let result = composer.run_deployment_with(
        &config,
        &BlueprintRegistry::with_builtins(),
        args.stack.as_deref(),
        |composition| {
            write_template(&composition, args.out.as_deref())?;
            rendered.push(composition.stack().to_string());
            Ok::<_, anyhow::Error>(())
        },
    );
    if let Err(err) = result {
        if !rendered.is_empty() {
            eprintln!();
            eprintln!("  Published before the failure: {}", rendered.join(", "));
        }
        return Err(err.context(format!("failed to compose {}", args.file.display())));
    }

    eprintln!();
    eprintln!("  {} stack(s) rendered.", rendered.len());
    Ok(())
}

fn write_template(composition: &Composition, out: Option<&Path>) -> anyhow::Result<()> {
    let json = composition.template()?.to_json_pretty()?;
    match out {
        Some(dir) => {
            let path = dir.join(format!("{}.json", composition.stack()));
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("  + {} -> {}", composition.stack(), path.display());
        }
        None => println!("{json}"),
    }
    for record in composition.published() {
        eprintln!("      > {}", output::format_parameter(record));
    }
    Ok(())
}
