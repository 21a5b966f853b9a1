//! CLI command definitions.
//!
//! Every command reads a deployment configuration, builds the construct tree
//! and works on the resulting cloud assembly.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use orca_core::{Context, CONTEXT_FILE};
use orca_patterns::{Deployment, DeploymentConfig};

pub mod list;
pub mod synth;
pub mod validate;

/// Orca - ECS deployment patterns as CloudFormation
#[derive(Parser)]
#[command(name = "orca")]
#[command(version, about = "Orca - ECS deployment patterns as CloudFormation")]
#[command(long_about = r#"
Orca turns a YAML or TOML deployment description into CloudFormation
templates: a VPC lookup, an ECS compute stack and nested stacks for
load-balanced and non load-balanced services.

COMMANDS:
  synth     → Write the templates and manifest to an output directory
  list      → List the stacks of the deployment
  validate  → Build the deployment and print resource counts

ENVIRONMENT:
  ORCA_ACCOUNT, ORCA_REGION, ORCA_STACK_NAME override the config file.
  RUST_LOG overrides the log level.

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  5 - Synthesis error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize the deployment into a cloud assembly directory
    Synth(synth::SynthArgs),

    /// List the stack artifacts of the deployment
    List(list::ListArgs),

    /// Build the deployment and report resource counts per type
    Validate(validate::ValidateArgs),
}

/// Load a deployment config and apply `ORCA_*` overrides.
pub(crate) fn load_config(path: &Path) -> Result<DeploymentConfig> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let mut config = DeploymentConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load the context store. An explicit path must exist; otherwise
/// `orca.context.json` in the current directory is used when present.
pub(crate) fn load_context(path: Option<&PathBuf>) -> Result<Context> {
    let path = match path {
        Some(path) => path.clone(),
        None => {
            let default = PathBuf::from(CONTEXT_FILE);
            if !default.exists() {
                debug!("No {} found, starting with empty context", CONTEXT_FILE);
                return Ok(Context::new());
            }
            default
        }
    };

    Context::from_file(&path)
        .with_context(|| format!("Failed to read context from {}", path.display()))
}

pub(crate) fn build_deployment(config: &Path, context: Option<&PathBuf>) -> Result<Deployment> {
    let config = load_config(config)?;
    let context = load_context(context)?;
    config
        .synthesize(context)
        .with_context(|| format!("Failed to build deployment {}", config.app.stack_name))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Path::new("does-not-exist.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_explicit_context_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        std::fs::write(&path, r#"{ "some-key": { "a": 1 } }"#).unwrap();

        let context = load_context(Some(&path)).unwrap();
        assert_eq!(context.len(), 1);
        assert!(context.get("some-key").is_some());
    }

    #[test]
    fn test_explicit_context_must_exist() {
        let path = PathBuf::from("no-such-context.json");
        assert!(load_context(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_parses_synth() {
        let cli = Cli::try_parse_from([
            "orca", "synth", "--config", "deploy.yaml", "--output", "out", "--strict",
        ])
        .unwrap();
        match cli.command {
            Commands::Synth(args) => {
                assert_eq!(args.config, PathBuf::from("deploy.yaml"));
                assert_eq!(args.output, PathBuf::from("out"));
                assert!(args.strict);
            }
            _ => panic!("expected synth"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["orca", "-v", "-q", "list", "--config", "d.yaml"]).is_err());
    }
}
