//! `stw params` — Inspect and seed the file-backed parameter store.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use stackwire_common::constants::DEFAULT_STORE_FILE;
use stackwire_common::types::{ParameterKey, StackId};
use stackwire_store::ParameterStore;

use crate::output;

/// Arguments for the `params` command.
#[derive(Args, Debug)]
pub struct ParamsArgs {
    /// Operation to perform.
    #[command(subcommand)]
    pub action: ParamsAction,

    /// Path to the store file.
    #[arg(long, global = true, default_value = DEFAULT_STORE_FILE)]
    pub store: PathBuf,
}

/// Store operations.
#[derive(Subcommand, Debug)]
pub enum ParamsAction {
    /// Print the value stored under a key.
    Get {
        /// Parameter key, e.g. `/stocks/api/id`.
        key: String,
    },
    /// Write a value under a key.
    Put {
        /// Parameter key.
        key: String,
        /// Value to store.
        value: String,
        /// Stack recorded as the producer.
        #[arg(long, default_value = "manual")]
        stack: String,
    },
    /// List every parameter beneath a prefix.
    List {
        /// Key prefix; `/` lists everything.
        #[arg(default_value = "/")]
        prefix: String,
    },
}

/// Executes the `params` command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, a key is malformed, or a
/// requested key does not exist.
pub fn execute(args: &ParamsArgs) -> anyhow::Result<()> {
    let store = ParameterStore::open_file(&args.store)
        .with_context(|| format!("failed to open store {}", args.store.display()))?;
    match &args.action {
        ParamsAction::Get { key } => {
            let value = store.get_value(&ParameterKey::parse(key.as_str())?)?;
            println!("{value}");
        }
        ParamsAction::Put { key, value, stack } => {
            let record = store.put_str(key, value.as_str(), &StackId::new(stack.as_str()))?;
            eprintln!("  > {}", output::format_parameter(&record));
        }
        ParamsAction::List { prefix } => {
            let records = store.list(prefix)?;
            println!("{}", output::parameter_table(&records));
            eprintln!("  {} parameter(s) under {prefix}.", records.len());
        }
    }
    Ok(())
}
