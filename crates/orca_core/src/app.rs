//! The construct tree.
//!
//! An [`App`] owns every node. Nodes are addressed by [`NodeId`] and form a
//! tree rooted at the app: stacks, nested stacks, grouping constructs and
//! resources. Builders take `&mut App` plus a scope id and return handles,
//! so no construct holds a reference into the tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::context::{context_key, Context, MissingContext};
use crate::error::{CoreError, CoreResult};
use crate::intrinsics::{self, Aws};
use crate::logical_id::make_logical_id;
use crate::resource::{CfnResource, Reference, ResourceHandle};

/// Identifier of a node in the construct tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Target account and region of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppProps {
    pub context: Context,
}

#[derive(Debug, Clone, Default)]
pub struct StackProps {
    pub env: Option<Environment>,
    pub description: Option<String>,
    pub stack_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NestedStackProps {
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct NestedInfo {
    pub(crate) parent_stack: NodeId,
    pub(crate) logical_id: String,
    pub(crate) parameters: BTreeMap<String, Value>,
    pub(crate) depends_on: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StackNode {
    pub(crate) env: Option<Environment>,
    pub(crate) description: Option<String>,
    pub(crate) stack_name: Option<String>,
    pub(crate) nested: Option<NestedInfo>,
    pub(crate) parameters: BTreeMap<String, Value>,
    pub(crate) logical_ids: BTreeSet<String>,
    pub(crate) dependencies: BTreeSet<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Root,
    Stack(Box<StackNode>),
    Construct,
    Resource(CfnResource),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) id: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
}

/// Where a node shows up in a template: a resource entry or a whole stack.
enum TemplateElement {
    Entry { stack: NodeId, logical_id: String },
    TopLevelStack(NodeId),
}

/// Root of a construct tree.
#[derive(Debug, Clone)]
pub struct App {
    pub(crate) nodes: Vec<Node>,
    context: Context,
    missing: Vec<MissingContext>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppProps::default())
    }
}

impl App {
    pub fn new(props: AppProps) -> Self {
        Self {
            nodes: vec![Node {
                id: String::new(),
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Root,
            }],
            context: props.context,
            missing: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Context keys that lookups asked for but could not find.
    pub fn missing_context(&self) -> &[MissingContext] {
        &self.missing
    }

    pub(crate) fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.nodes.get(id.0).ok_or(CoreError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> CoreResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(CoreError::UnknownNode(id.0))
    }

    pub(crate) fn stack_node(&self, id: NodeId) -> CoreResult<&StackNode> {
        match &self.node(id)?.kind {
            NodeKind::Stack(stack) => Ok(stack),
            _ => Err(CoreError::NotAStack(self.path(id))),
        }
    }

    fn stack_node_mut(&mut self, id: NodeId) -> CoreResult<&mut StackNode> {
        let path = self.path(id);
        match &mut self.node_mut(id)?.kind {
            NodeKind::Stack(stack) => Ok(stack),
            _ => Err(CoreError::NotAStack(path)),
        }
    }

    /// Construct id of a node (the last path component).
    pub fn node_id(&self, node: NodeId) -> CoreResult<&str> {
        Ok(self.node(node)?.id.as_str())
    }

    pub fn children(&self, node: NodeId) -> CoreResult<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    /// Full construct path, `/` separated, without the root.
    pub fn path(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            match self.nodes.get(id.0) {
                Some(n) if n.parent.is_some() => {
                    parts.push(n.id.as_str());
                    current = n.parent;
                }
                _ => break,
            }
        }
        parts.reverse();
        parts.join("/")
    }

    pub fn is_stack(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.get(node.0).map(|n| &n.kind),
            Some(NodeKind::Stack(_))
        )
    }

    pub fn is_nested_stack(&self, node: NodeId) -> bool {
        self.stack_node(node)
            .map(|s| s.nested.is_some())
            .unwrap_or(false)
    }

    /// Every stack in tree order, top-level and nested.
    pub fn stacks(&self) -> Vec<NodeId> {
        let mut stacks = Vec::new();
        self.walk(NodeId::ROOT, &mut |id, node| {
            if matches!(node.kind, NodeKind::Stack(_)) {
                stacks.push(id);
            }
        });
        stacks
    }

    fn walk(&self, from: NodeId, visit: &mut dyn FnMut(NodeId, &Node)) {
        if let Some(node) = self.nodes.get(from.0) {
            visit(from, node);
            for child in &node.children {
                self.walk(*child, visit);
            }
        }
    }

    fn check_child_id(&self, scope: NodeId, id: &str) -> CoreResult<()> {
        validate_id(id)?;
        let parent = self.node(scope)?;
        if parent.children.iter().any(|c| self.nodes[c.0].id == id) {
            return Err(CoreError::DuplicateId {
                id: id.to_string(),
                scope: self.path(scope),
            });
        }
        Ok(())
    }

    fn add_node(&mut self, scope: NodeId, id: &str, kind: NodeKind) -> CoreResult<NodeId> {
        self.check_child_id(scope, id)?;
        let node_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id: id.to_string(),
            parent: Some(scope),
            children: Vec::new(),
            kind,
        });
        self.node_mut(scope)?.children.push(node_id);
        Ok(node_id)
    }

    /// Add a top-level stack.
    pub fn add_stack(&mut self, id: &str, props: StackProps) -> CoreResult<NodeId> {
        let stack = StackNode {
            env: props.env,
            description: props.description,
            stack_name: Some(props.stack_name.unwrap_or_else(|| id.to_string())),
            nested: None,
            parameters: BTreeMap::new(),
            logical_ids: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        };
        let node = self.add_node(NodeId::ROOT, id, NodeKind::Stack(Box::new(stack)))?;
        debug!("Added stack {}", id);
        Ok(node)
    }

    /// Add a nested stack inside the stack that owns `scope`.
    pub fn add_nested_stack(
        &mut self,
        scope: NodeId,
        id: &str,
        props: NestedStackProps,
    ) -> CoreResult<NodeId> {
        let parent_stack = self.stack_of(scope)?;
        self.check_child_id(scope, id)?;
        let env = self.stack_node(parent_stack)?.env.clone();

        let mut components = self.components_between(parent_stack, scope)?;
        components.push(id.to_string());
        components.push("NestedStackResource".to_string());
        let refs: Vec<&str> = components.iter().map(String::as_str).collect();
        let logical_id = make_logical_id(&refs);

        let stack = StackNode {
            env,
            description: props.description,
            stack_name: None,
            nested: Some(NestedInfo {
                parent_stack,
                logical_id: logical_id.clone(),
                parameters: BTreeMap::new(),
                depends_on: BTreeSet::new(),
            }),
            parameters: BTreeMap::new(),
            logical_ids: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        };
        self.reserve_logical_id(parent_stack, &logical_id)?;
        let node = self.add_node(scope, id, NodeKind::Stack(Box::new(stack)))?;
        debug!("Added nested stack {} ({})", self.path(node), logical_id);
        Ok(node)
    }

    /// Add a grouping construct. It has no template output of its own.
    pub fn add_construct(&mut self, scope: NodeId, id: &str) -> CoreResult<NodeId> {
        self.stack_of(scope)?;
        self.add_node(scope, id, NodeKind::Construct)
    }

    /// Add a resource under `scope`.
    pub fn add_resource(
        &mut self,
        scope: NodeId,
        id: &str,
        resource_type: &str,
        properties: Value,
    ) -> CoreResult<ResourceHandle> {
        let stack = self.stack_of(scope)?;
        self.check_child_id(scope, id)?;

        let mut components = self.components_between(stack, scope)?;
        components.push(id.to_string());
        let refs: Vec<&str> = components.iter().map(String::as_str).collect();
        let logical_id = make_logical_id(&refs);

        self.reserve_logical_id(stack, &logical_id)?;
        let resource = CfnResource::new(resource_type, logical_id.clone(), properties);
        let node = self.add_node(scope, id, NodeKind::Resource(resource))?;

        debug!("Added {} {}", resource_type, logical_id);
        Ok(ResourceHandle {
            node,
            stack,
            logical_id,
        })
    }

    fn reserve_logical_id(&mut self, stack: NodeId, logical_id: &str) -> CoreResult<()> {
        let stack_path = self.path(stack);
        let node = self.stack_node_mut(stack)?;
        if !node.logical_ids.insert(logical_id.to_string()) {
            return Err(CoreError::DuplicateLogicalId {
                logical_id: logical_id.to_string(),
                stack: stack_path,
            });
        }
        Ok(())
    }

    /// Path components strictly below `stack` down to and including `scope`.
    fn components_between(&self, stack: NodeId, scope: NodeId) -> CoreResult<Vec<String>> {
        let mut components = Vec::new();
        let mut current = scope;
        while current != stack {
            let node = self.node(current)?;
            components.push(node.id.clone());
            current = node
                .parent
                .ok_or_else(|| CoreError::NotInStack(self.path(scope)))?;
        }
        components.reverse();
        Ok(components)
    }

    /// Direct child of `scope` with the given construct id.
    pub fn find_child(&self, scope: NodeId, id: &str) -> Option<NodeId> {
        self.nodes
            .get(scope.0)?
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].id == id)
    }

    /// Rebuild the handle of an existing resource node.
    pub fn resource_handle(&self, node: NodeId) -> CoreResult<ResourceHandle> {
        match &self.node(node)?.kind {
            NodeKind::Resource(resource) => Ok(ResourceHandle {
                node,
                stack: self.stack_of(node)?,
                logical_id: resource.logical_id.clone(),
            }),
            _ => Err(CoreError::NotAResource(self.path(node))),
        }
    }

    pub fn resource(&self, handle: &ResourceHandle) -> CoreResult<&CfnResource> {
        match &self.node(handle.node)?.kind {
            NodeKind::Resource(resource) => Ok(resource),
            _ => Err(CoreError::NotAResource(self.path(handle.node))),
        }
    }

    pub fn resource_mut(&mut self, handle: &ResourceHandle) -> CoreResult<&mut CfnResource> {
        let path = self.path(handle.node);
        match &mut self.node_mut(handle.node)?.kind {
            NodeKind::Resource(resource) => Ok(resource),
            _ => Err(CoreError::NotAResource(path)),
        }
    }

    /// The closest stack containing `scope` (or `scope` itself).
    pub fn stack_of(&self, scope: NodeId) -> CoreResult<NodeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let node = self.node(id)?;
            if matches!(node.kind, NodeKind::Stack(_)) {
                return Ok(id);
            }
            current = node.parent;
        }
        Err(CoreError::NotInStack(self.path(scope)))
    }

    /// The stack whose template holds the nested stack resource.
    pub fn parent_stack(&self, stack: NodeId) -> CoreResult<Option<NodeId>> {
        Ok(self
            .stack_node(stack)?
            .nested
            .as_ref()
            .map(|n| n.parent_stack))
    }

    /// Logical id of the `AWS::CloudFormation::Stack` resource of a nested stack.
    pub fn nested_stack_logical_id(&self, stack: NodeId) -> CoreResult<Option<&str>> {
        Ok(self
            .stack_node(stack)?
            .nested
            .as_ref()
            .map(|n| n.logical_id.as_str()))
    }

    pub fn environment(&self, scope: NodeId) -> CoreResult<Option<&Environment>> {
        let stack = self.stack_of(scope)?;
        Ok(self.stack_node(stack)?.env.as_ref())
    }

    /// Region of the stack owning `scope`: a literal when known.
    pub fn region(&self, scope: NodeId) -> CoreResult<Value> {
        Ok(match self.environment(scope)? {
            Some(env) => json!(env.region),
            None => Aws::region(),
        })
    }

    /// Account of the stack owning `scope`: a literal when known.
    pub fn account(&self, scope: NodeId) -> CoreResult<Value> {
        Ok(match self.environment(scope)? {
            Some(env) => json!(env.account),
            None => Aws::account_id(),
        })
    }

    /// Declare a template parameter on a stack.
    pub fn add_parameter(&mut self, stack: NodeId, name: &str, definition: Value) -> CoreResult<()> {
        self.stack_node_mut(stack)?
            .parameters
            .insert(name.to_string(), definition);
        Ok(())
    }

    /// Declare a parameter supplied at deploy time and return a `Ref` to it
    /// usable in `stack`.
    ///
    /// The parameter is declared on the top-level stack. Each nested stack
    /// between it and `stack` declares it too and receives the value from
    /// its parent's `AWS::CloudFormation::Stack` resource.
    pub fn add_deploy_parameter(
        &mut self,
        stack: NodeId,
        name: &str,
        definition: Value,
    ) -> CoreResult<Value> {
        let mut chain = Vec::new();
        let mut current = self.stack_of(stack)?;
        while let Some(parent) = self.parent_stack(current)? {
            chain.push(current);
            current = parent;
        }

        self.add_parameter(current, name, definition.clone())?;
        for nested in chain.into_iter().rev() {
            let node = self.stack_node_mut(nested)?;
            node.parameters.insert(name.to_string(), definition.clone());
            if let Some(info) = node.nested.as_mut() {
                info.parameters
                    .insert(name.to_string(), intrinsics::reference(name));
            }
        }
        Ok(intrinsics::reference(name))
    }

    /// Answer a context lookup for the stack owning `scope`.
    ///
    /// Returns `Ok(None)` when the key is missing; the key is then recorded
    /// and the caller is expected to fall back to a dummy value.
    pub fn lookup_context(
        &mut self,
        scope: NodeId,
        provider: &str,
        filters: &BTreeMap<String, String>,
        props: Value,
    ) -> CoreResult<Option<Value>> {
        let stack = self.stack_of(scope)?;
        let env = self
            .stack_node(stack)?
            .env
            .clone()
            .ok_or_else(|| CoreError::EnvironmentAgnostic {
                provider: provider.to_string(),
                stack: self.path(stack),
            })?;

        let key = context_key(provider, &env.account, &env.region, filters);
        if let Some(value) = self.context.get(&key) {
            debug!("Context hit for {}", key);
            return Ok(Some(value.clone()));
        }

        warn!("Missing context for {}, using dummy value", key);
        if !self.missing.iter().any(|m| m.key == key) {
            self.missing.push(MissingContext {
                key,
                provider: provider.to_string(),
                props,
            });
        }
        Ok(None)
    }

    fn template_element(&self, node: NodeId) -> CoreResult<TemplateElement> {
        match &self.node(node)?.kind {
            NodeKind::Resource(resource) => Ok(TemplateElement::Entry {
                stack: self.stack_of(node)?,
                logical_id: resource.logical_id.clone(),
            }),
            NodeKind::Stack(stack) => Ok(match &stack.nested {
                Some(nested) => TemplateElement::Entry {
                    stack: nested.parent_stack,
                    logical_id: nested.logical_id.clone(),
                },
                None => TemplateElement::TopLevelStack(node),
            }),
            _ => Err(CoreError::NotAResource(self.path(node))),
        }
    }

    /// Make `dependent` wait for `dependency`.
    ///
    /// Both must be resources or stacks. Inside one template this becomes a
    /// `DependsOn`; between top-level stacks it is a deployment-order edge.
    pub fn add_dependency(&mut self, dependent: NodeId, dependency: NodeId) -> CoreResult<()> {
        let from = self.template_element(dependent)?;
        let to = self.template_element(dependency)?;

        match (from, to) {
            (
                TemplateElement::Entry { stack: a, .. },
                TemplateElement::Entry {
                    stack: b,
                    logical_id,
                },
            ) if a == b => {
                match &mut self.node_mut(dependent)?.kind {
                    NodeKind::Resource(resource) => resource.add_depends_on(logical_id),
                    NodeKind::Stack(stack) => {
                        if let Some(nested) = stack.nested.as_mut() {
                            nested.depends_on.insert(logical_id);
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
            (TemplateElement::TopLevelStack(a), TemplateElement::TopLevelStack(b)) => {
                if a != b {
                    self.stack_node_mut(a)?.dependencies.insert(b);
                }
                Ok(())
            }
            _ => Err(CoreError::CrossStackDependency {
                dependent: self.path(dependent),
                dependency: self.path(dependency),
            }),
        }
    }

    /// Turn a reference into a value usable from `consumer`.
    ///
    /// References into an enclosing stack are passed down as parameters of
    /// every nested stack in between.
    pub fn resolve(&mut self, consumer: NodeId, reference: &Reference) -> CoreResult<Value> {
        let consumer_stack = self.stack_of(consumer)?;
        if consumer_stack == reference.stack {
            return Ok(reference.to_value());
        }

        let mut chain = Vec::new();
        let mut current = consumer_stack;
        while current != reference.stack {
            match self.parent_stack(current)? {
                Some(parent) => {
                    chain.push(current);
                    current = parent;
                }
                None => {
                    return Err(CoreError::CrossStackReference {
                        logical_id: reference.logical_id.clone(),
                        producer: self.path(reference.stack),
                        consumer: self.path(consumer_stack),
                    })
                }
            }
        }

        let name = reference.parameter_name();
        let mut value = reference.to_value();
        for stack in chain.into_iter().rev() {
            let node = self.stack_node_mut(stack)?;
            node.parameters
                .insert(name.clone(), json!({ "Type": "String" }));
            if let Some(nested) = node.nested.as_mut() {
                nested.parameters.insert(name.clone(), value);
            }
            value = intrinsics::reference(&name);
        }
        debug!("Resolved {} through parameter {}", reference.logical_id, name);
        Ok(value)
    }
}

fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::InvalidId {
            id: id.to_string(),
            reason: "id must not be empty".to_string(),
        });
    }
    if id.contains('/') {
        return Err(CoreError::InvalidId {
            id: id.to_string(),
            reason: "id must not contain '/'".to_string(),
        });
    }
    Ok(())
}
