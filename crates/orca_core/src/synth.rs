//! Synthesis of a construct tree into a cloud assembly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::app::{App, Environment, NodeId, NodeKind};
use crate::context::MissingContext;
use crate::error::CoreResult;
use crate::logical_id::sanitize;
use crate::resource::RemovalPolicy;

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: &str = "1.0.0";

/// One synthesized template.
#[derive(Debug, Clone, Serialize)]
pub struct StackArtifact {
    #[serde(skip)]
    pub node: NodeId,
    pub id: String,
    pub stack_name: Option<String>,
    pub template_file: String,
    pub template: Value,
    pub parent: Option<String>,
    pub dependencies: Vec<String>,
    pub environment: Option<Environment>,
}

impl StackArtifact {
    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    pub fn resource_count(&self) -> usize {
        self.template["Resources"]
            .as_object()
            .map(|r| r.len())
            .unwrap_or(0)
    }

    fn manifest_entry(&self) -> Value {
        let environment = match &self.environment {
            Some(env) => format!("aws://{}/{}", env.account, env.region),
            None => "aws://unknown-account/unknown-region".to_string(),
        };

        let mut entry = Map::new();
        if self.is_nested() {
            entry.insert("type".into(), json!("orca:nested-stack"));
            entry.insert("parent".into(), json!(self.parent));
        } else {
            entry.insert("type".into(), json!("aws:cloudformation:stack"));
        }
        entry.insert("environment".into(), json!(environment));

        let mut properties = Map::new();
        properties.insert("templateFile".into(), json!(self.template_file));
        if let Some(name) = &self.stack_name {
            properties.insert("stackName".into(), json!(name));
        }
        entry.insert("properties".into(), Value::Object(properties));

        if !self.dependencies.is_empty() {
            entry.insert("dependencies".into(), json!(self.dependencies));
        }
        Value::Object(entry)
    }
}

/// Every template of an app plus the context it still needs.
#[derive(Debug, Clone, Serialize)]
pub struct CloudAssembly {
    pub artifacts: Vec<StackArtifact>,
    pub missing: Vec<MissingContext>,
}

impl CloudAssembly {
    pub fn artifact(&self, id: &str) -> Option<&StackArtifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub fn artifact_for(&self, node: NodeId) -> Option<&StackArtifact> {
        self.artifacts.iter().find(|a| a.node == node)
    }

    /// Top-level stacks only.
    pub fn stacks(&self) -> impl Iterator<Item = &StackArtifact> {
        self.artifacts.iter().filter(|a| !a.is_nested())
    }

    pub fn has_missing_context(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn manifest(&self) -> Value {
        let artifacts: Map<String, Value> = self
            .artifacts
            .iter()
            .map(|a| (a.id.clone(), a.manifest_entry()))
            .collect();

        let mut manifest = json!({
            "version": MANIFEST_VERSION,
            "artifacts": artifacts,
        });
        if !self.missing.is_empty() {
            manifest["missing"] = json!(self.missing);
        }
        manifest
    }

    /// Write every template and the manifest into `dir`.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> CoreResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.artifacts.len() + 1);
        for artifact in &self.artifacts {
            let path = dir.join(&artifact.template_file);
            fs::write(&path, serde_json::to_string_pretty(&artifact.template)?)?;
            debug!("Wrote {:?}", path);
            written.push(path);
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&self.manifest())?)?;
        written.push(manifest_path);

        info!("Wrote cloud assembly to {:?}", dir);
        Ok(written)
    }
}

impl App {
    /// Artifact id of a stack: sanitized id for top-level stacks, parent id
    /// plus the nested stack resource logical id for nested ones.
    pub fn artifact_id(&self, stack: NodeId) -> CoreResult<String> {
        let node = self.stack_node(stack)?;
        match &node.nested {
            Some(nested) => Ok(format!(
                "{}{}",
                self.artifact_id(nested.parent_stack)?,
                nested.logical_id
            )),
            None => Ok(sanitize(self.node_id(stack)?)),
        }
    }

    pub fn template_file(&self, stack: NodeId) -> CoreResult<String> {
        let id = self.artifact_id(stack)?;
        Ok(if self.is_nested_stack(stack) {
            format!("{}.nested.template.json", id)
        } else {
            format!("{}.template.json", id)
        })
    }

    /// Render the CloudFormation template of one stack.
    pub fn stack_template(&self, stack: NodeId) -> CoreResult<Value> {
        let node = self.stack_node(stack)?;
        let mut template = Map::new();

        if let Some(description) = &node.description {
            template.insert("Description".into(), json!(description));
        }
        if !node.parameters.is_empty() {
            template.insert("Parameters".into(), json!(node.parameters));
        }

        let mut resources = Map::new();
        for child in self.children(stack)? {
            self.collect_resources(*child, &mut resources)?;
        }
        template.insert("Resources".into(), Value::Object(resources));

        Ok(Value::Object(template))
    }

    fn collect_resources(&self, node_id: NodeId, out: &mut Map<String, Value>) -> CoreResult<()> {
        let node = self.node(node_id)?;
        match &node.kind {
            NodeKind::Resource(resource) => {
                out.insert(
                    resource.logical_id.clone(),
                    resource.to_template(&self.path(node_id)),
                );
            }
            NodeKind::Stack(stack) => {
                if let Some(nested) = &stack.nested {
                    out.insert(nested.logical_id.clone(), self.nested_stack_entry(node_id)?);
                }
                return Ok(());
            }
            NodeKind::Construct | NodeKind::Root => {}
        }

        for child in &node.children {
            self.collect_resources(*child, out)?;
        }
        Ok(())
    }

    fn nested_stack_entry(&self, stack: NodeId) -> CoreResult<Value> {
        let node = self.stack_node(stack)?;
        let mut properties = Map::new();
        properties.insert("TemplateURL".into(), json!(self.template_file(stack)?));

        let mut entry = Map::new();
        entry.insert("Type".into(), json!("AWS::CloudFormation::Stack"));

        if let Some(nested) = &node.nested {
            if !nested.parameters.is_empty() {
                properties.insert("Parameters".into(), json!(nested.parameters));
            }
            entry.insert("Properties".into(), Value::Object(properties));
            if !nested.depends_on.is_empty() {
                entry.insert("DependsOn".into(), json!(nested.depends_on));
            }
        } else {
            entry.insert("Properties".into(), Value::Object(properties));
        }

        let policy = RemovalPolicy::Destroy.as_cfn();
        entry.insert("UpdateReplacePolicy".into(), json!(policy));
        entry.insert("DeletionPolicy".into(), json!(policy));
        entry.insert("Metadata".into(), json!({ "orca:path": self.path(stack) }));
        Ok(Value::Object(entry))
    }

    /// Synthesize every stack in the tree.
    pub fn synth(&self) -> CoreResult<CloudAssembly> {
        let mut artifacts = Vec::new();
        for stack in self.stacks() {
            let node = self.stack_node(stack)?;
            let parent = match &node.nested {
                Some(nested) => Some(self.artifact_id(nested.parent_stack)?),
                None => None,
            };
            let dependencies = node
                .dependencies
                .iter()
                .map(|d| self.artifact_id(*d))
                .collect::<CoreResult<Vec<_>>>()?;

            artifacts.push(StackArtifact {
                node: stack,
                id: self.artifact_id(stack)?,
                stack_name: node.stack_name.clone(),
                template_file: self.template_file(stack)?,
                template: self.stack_template(stack)?,
                parent,
                dependencies,
                environment: node.env.clone(),
            });
        }

        info!(
            "Synthesized {} template(s), {} missing context key(s)",
            artifacts.len(),
            self.missing_context().len()
        );
        Ok(CloudAssembly {
            artifacts,
            missing: self.missing_context().to_vec(),
        })
    }
}
