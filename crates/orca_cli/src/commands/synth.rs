//! Synth command - Write the cloud assembly.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::{info, warn};

use orca_patterns::Deployment;

#[derive(Args)]
pub struct SynthArgs {
    /// Deployment configuration (YAML or TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Context store with lookup values (defaults to orca.context.json)
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Output directory for templates and manifest
    #[arg(short, long, default_value = "orca.out")]
    pub output: PathBuf,

    /// Fail when lookups are missing from the context store
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    info!("Synthesizing {}", args.config.display());

    let Deployment { app, .. } = super::build_deployment(&args.config, args.context.as_ref())?;
    let assembly = app.synth().context("Failed to synthesize templates")?;

    if assembly.has_missing_context() {
        for missing in &assembly.missing {
            warn!("Missing context {} ({})", missing.key, missing.provider);
        }
        if args.strict {
            anyhow::bail!(
                "{} missing context value(s); add them to the context store and run again",
                assembly.missing.len()
            );
        }
    }

    let written = assembly
        .write_to(&args.output)
        .with_context(|| format!("Failed to write assembly to {}", args.output.display()))?;

    println!(
        "Synthesized {} template(s) into {}",
        written.len() - 1,
        args.output.display()
    );
    Ok(())
}
