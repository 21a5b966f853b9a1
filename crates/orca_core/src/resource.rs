//! Resource nodes and references to them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::app::NodeId;
use crate::intrinsics;

/// What happens to a resource when it is removed from the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Retain,
    Destroy,
    Snapshot,
}

impl RemovalPolicy {
    /// Value used for both `DeletionPolicy` and `UpdateReplacePolicy`.
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

/// A raw CloudFormation resource.
#[derive(Debug, Clone)]
pub struct CfnResource {
    pub resource_type: String,
    pub logical_id: String,
    pub properties: Value,
    pub depends_on: Vec<String>,
    pub removal_policy: Option<RemovalPolicy>,
}

impl CfnResource {
    pub fn new(resource_type: impl Into<String>, logical_id: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            logical_id: logical_id.into(),
            properties,
            depends_on: Vec::new(),
            removal_policy: None,
        }
    }

    pub fn apply_removal_policy(&mut self, policy: RemovalPolicy) {
        self.removal_policy = Some(policy);
    }

    pub fn add_depends_on(&mut self, logical_id: impl Into<String>) {
        let logical_id = logical_id.into();
        if logical_id != self.logical_id && !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
    }

    /// Mutable access to one top-level property, creating it when absent.
    pub fn property_mut(&mut self, name: &str) -> &mut Value {
        if !self.properties.is_object() {
            self.properties = Value::Object(Map::new());
        }
        let Value::Object(map) = &mut self.properties else {
            unreachable!("properties were just made an object");
        };
        map.entry(name.to_string()).or_insert(Value::Null)
    }

    /// Render the template entry for this resource.
    pub fn to_template(&self, path: &str) -> Value {
        let mut entry = Map::new();
        entry.insert("Type".into(), json!(self.resource_type));

        let has_properties = match &self.properties {
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        };
        if has_properties {
            entry.insert("Properties".into(), strip_nulls(&self.properties));
        }

        if !self.depends_on.is_empty() {
            let mut depends_on = self.depends_on.clone();
            depends_on.sort();
            entry.insert("DependsOn".into(), json!(depends_on));
        }

        if let Some(policy) = self.removal_policy {
            entry.insert("UpdateReplacePolicy".into(), json!(policy.as_cfn()));
            entry.insert("DeletionPolicy".into(), json!(policy.as_cfn()));
        }

        entry.insert("Metadata".into(), json!({ "orca:path": path }));
        Value::Object(entry)
    }
}

/// Drop `null` members so optional properties can be written inline.
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Handle returned when a resource is added to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub node: NodeId,
    pub stack: NodeId,
    pub logical_id: String,
}

impl ResourceHandle {
    /// Reference to the resource's `Ref` value, resolvable from other stacks.
    pub fn reference(&self) -> Reference {
        Reference {
            stack: self.stack,
            logical_id: self.logical_id.clone(),
            attribute: None,
        }
    }

    /// Reference to one of the resource's attributes.
    pub fn attribute(&self, attribute: &str) -> Reference {
        Reference {
            stack: self.stack,
            logical_id: self.logical_id.clone(),
            attribute: Some(attribute.to_string()),
        }
    }

    /// `Ref` usable inside the same stack.
    pub fn ref_value(&self) -> Value {
        intrinsics::reference(&self.logical_id)
    }

    /// `Fn::GetAtt` usable inside the same stack.
    pub fn get_att(&self, attribute: &str) -> Value {
        intrinsics::get_att(&self.logical_id, attribute)
    }
}

/// A value produced by a resource in a specific stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub stack: NodeId,
    pub logical_id: String,
    pub attribute: Option<String>,
}

impl Reference {
    /// The intrinsic as seen from the producing stack.
    pub fn to_value(&self) -> Value {
        match &self.attribute {
            Some(attr) => intrinsics::get_att(&self.logical_id, attr),
            None => intrinsics::reference(&self.logical_id),
        }
    }

    /// Name of the parameter that carries this value into a nested stack.
    pub fn parameter_name(&self) -> String {
        let suffix = match &self.attribute {
            Some(attr) => attr.replace('.', ""),
            None => "Ref".to_string(),
        };
        format!("referenceto{}{}", self.logical_id, suffix)
    }
}
