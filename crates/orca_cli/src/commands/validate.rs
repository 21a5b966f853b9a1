//! Validate command - Build the deployment and report what it contains.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

#[derive(Args)]
pub struct ValidateArgs {
    /// Deployment configuration (YAML or TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Context store with lookup values (defaults to orca.context.json)
    #[arg(long)]
    pub context: Option<PathBuf>,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("Validating {}", args.config.display());

    let deployment = super::build_deployment(&args.config, args.context.as_ref())?;
    let assembly = deployment.app.synth().context("Failed to synthesize templates")?;

    for artifact in &assembly.artifacts {
        println!("{}", artifact.id);
        for (resource_type, count) in count_resource_types(&artifact.template) {
            println!("   {:<50} {}", resource_type, count);
        }
    }

    println!();
    if assembly.has_missing_context() {
        println!(
            "Configuration is valid; {} lookup(s) used placeholder values:",
            assembly.missing.len()
        );
        for missing in &assembly.missing {
            println!("   - {}", missing.key);
        }
    } else {
        println!("Configuration is valid");
    }
    Ok(())
}

/// Count resources of a template by CloudFormation type.
fn count_resource_types(template: &Value) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    if let Some(resources) = template["Resources"].as_object() {
        for resource in resources.values() {
            if let Some(resource_type) = resource["Type"].as_str() {
                *counts.entry(resource_type.to_string()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::demo_config_path;
    use serde_json::json;

    #[test]
    fn test_count_resource_types() {
        let template = json!({
            "Resources": {
                "A": { "Type": "AWS::IAM::Role" },
                "B": { "Type": "AWS::IAM::Role" },
                "C": { "Type": "AWS::ECS::Cluster" }
            }
        });
        let counts = count_resource_types(&template);
        assert_eq!(counts["AWS::IAM::Role"], 2);
        assert_eq!(counts["AWS::ECS::Cluster"], 1);
        assert!(count_resource_types(&json!({})).is_empty());
    }

    #[test]
    fn test_validate_demo() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("ctx.json");
        std::fs::write(&context, "{}").unwrap();

        execute(ValidateArgs {
            config: demo_config_path(),
            context: Some(context),
        })
        .unwrap();
    }
}
