//! Deployment configuration files.
//!
//! A deployment is described in YAML or TOML and turned into an [`App`] with
//! one stack holding an [`EcsProject`]. Account, region and stack name can be
//! overridden from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use orca_core::{App, AppProps, Context, Environment, NodeId, StackProps};

use crate::error::{PatternError, PatternResult};
use crate::project::{EcsProject, EcsProjectProps};

pub const ENV_ACCOUNT: &str = "ORCA_ACCOUNT";
pub const ENV_REGION: &str = "ORCA_REGION";
pub const ENV_STACK_NAME: &str = "ORCA_STACK_NAME";

/// Construct id of the project inside the deployment stack.
pub const PROJECT_ID: &str = "EcsProject";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub stack_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    pub description: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            stack_name: "OrcaEcsProject".to_string(),
            account: None,
            region: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub app: AppSettings,
    pub project: EcsProjectProps,
}

/// Result of [`DeploymentConfig::synthesize`].
#[derive(Debug)]
pub struct Deployment {
    pub app: App,
    pub stack: NodeId,
    pub project: EcsProject,
}

impl DeploymentConfig {
    /// Load a configuration file. The format follows the extension:
    /// `.yaml`/`.yml` or `.toml`.
    pub fn from_file(path: &Path) -> PatternResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        debug!("Loading deployment config from {}", path.display());
        match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(PatternError::InvalidConfig(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    pub fn from_yaml(yaml: &str) -> PatternResult<Self> {
        serde_yaml::from_str(yaml).map_err(PatternError::from)
    }

    pub fn from_toml(content: &str) -> PatternResult<Self> {
        toml::from_str(content).map_err(PatternError::from)
    }

    pub fn to_yaml(&self) -> PatternResult<String> {
        serde_yaml::to_string(self).map_err(PatternError::from)
    }

    /// Apply overrides from a variable lookup. Set values win over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(account) = lookup(ENV_ACCOUNT) {
            self.app.account = Some(account);
        }
        if let Some(region) = lookup(ENV_REGION) {
            self.app.region = Some(region);
        }
        if let Some(stack_name) = lookup(ENV_STACK_NAME) {
            self.app.stack_name = stack_name;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    pub fn environment(&self) -> Option<Environment> {
        match (&self.app.account, &self.app.region) {
            (Some(account), Some(region)) => Some(Environment::new(account, region)),
            _ => None,
        }
    }

    pub fn validate(&self) -> PatternResult<()> {
        if self.app.stack_name.trim().is_empty() {
            return Err(PatternError::InvalidConfig(
                "app.stack_name must not be empty".to_string(),
            ));
        }
        if self.environment().is_none() {
            return Err(PatternError::InvalidConfig(format!(
                "app.account and app.region are required for the VPC lookup (or set {} and {})",
                ENV_ACCOUNT, ENV_REGION
            )));
        }
        self.project.validate()
    }

    /// Build the construct tree for this deployment.
    pub fn synthesize(&self, context: Context) -> PatternResult<Deployment> {
        self.validate()?;

        let mut app = App::new(AppProps { context });
        let stack = app.add_stack(
            &self.app.stack_name,
            StackProps {
                env: self.environment(),
                description: self.app.description.clone(),
                stack_name: Some(self.app.stack_name.clone()),
            },
        )?;
        let project = EcsProject::build(&mut app, stack, PROJECT_ID, &self.project)?;
        info!(
            "Built deployment {} with {} service(s)",
            self.app.stack_name,
            project.non_load_balanced_services.len() + project.load_balanced_services.len()
        );

        Ok(Deployment {
            app,
            stack,
            project,
        })
    }
}
