//! CLI command definitions and dispatch.

pub mod params;
pub mod plan;
pub mod render;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use stackwire_common::config::DeploymentConfig;

/// stackwire — compose cross-stack infrastructure templates.
#[derive(Parser, Debug)]
#[command(name = "stw", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Formats accepted by `--log-format`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose the stacks of a deployment file and write their templates.
    Render(render::RenderArgs),
    /// Show one stack's realization order and store reads without composing it.
    Plan(plan::PlanArgs),
    /// Read and write the parameter store directly.
    Params(params::ParamsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Render(args) => render::execute(&args),
        Command::Plan(args) => plan::execute(&args),
        Command::Params(args) => params::execute(&args),
    }
}

/// Loads a deployment file, naming it in the error.
fn load_deployment(path: &Path) -> anyhow::Result<DeploymentConfig> {
    DeploymentConfig::load(path)
        .with_context(|| format!("failed to load deployment file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_defaults_to_stdout_and_all_stacks() {
        let cli = Cli::try_parse_from(["stw", "render", "deploy.yaml"]).expect("parse");
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.file, Path::new("deploy.yaml"));
        assert!(args.stack.is_none());
        assert!(args.out.is_none());
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn plan_requires_a_stack() {
        assert!(Cli::try_parse_from(["stw", "plan", "deploy.yaml"]).is_err());
        let cli = Cli::try_parse_from(["stw", "plan", "deploy.yaml", "--stack", "api"])
            .expect("parse");
        assert!(matches!(cli.command, Command::Plan(ref args) if args.stack == "api"));
    }

    #[test]
    fn log_format_is_global() {
        let cli = Cli::try_parse_from(["stw", "params", "list", "--log-format", "json"])
            .expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn params_store_flag_follows_the_action() {
        let cli = Cli::try_parse_from([
            "stw", "params", "put", "/api/id", "abc123", "--store", "/tmp/p.json",
        ])
        .expect("parse");
        let Command::Params(args) = cli.command else {
            panic!("expected params");
        };
        assert_eq!(args.store, Path::new("/tmp/p.json"));
        assert!(matches!(
            args.action,
            params::ParamsAction::Put { ref key, ref value, .. } if key == "/api/id" && value == "abc123"
        ));
    }
}
