//! List command - Print the stack artifacts.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

#[derive(Args)]
pub struct ListArgs {
    /// Deployment configuration (YAML or TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Context store with lookup values (defaults to orca.context.json)
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Print the artifacts as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let deployment = super::build_deployment(&args.config, args.context.as_ref())?;
    let assembly = deployment.app.synth().context("Failed to synthesize templates")?;

    if args.json {
        let artifacts: Vec<_> = assembly
            .artifacts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "parent": a.parent,
                    "templateFile": a.template_file,
                    "resources": a.resource_count(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    for artifact in &assembly.artifacts {
        match &artifact.parent {
            Some(parent) => println!(
                "  {} (nested in {}, {} resources)",
                artifact.id,
                parent,
                artifact.resource_count()
            ),
            None => println!("{} ({} resources)", artifact.id, artifact.resource_count()),
        }
    }
    Ok(())
}
