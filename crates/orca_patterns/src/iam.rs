//! IAM policy documents and roles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use orca_core::intrinsics::{self, Aws};
use orca_core::{App, NodeId, ResourceHandle};

use crate::error::PatternResult;

const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub principal: Option<Value>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<Value>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
            principal: None,
            condition: None,
        }
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut statement = Map::new();
        statement.insert("Action".into(), single_or_list(self.actions.iter().map(|a| json!(a)).collect()));
        if let Some(condition) = &self.condition {
            statement.insert("Condition".into(), condition.clone());
        }
        statement.insert("Effect".into(), json!(self.effect.as_str()));
        if let Some(principal) = &self.principal {
            statement.insert("Principal".into(), principal.clone());
        }
        if !self.resources.is_empty() {
            statement.insert("Resource".into(), single_or_list(self.resources.clone()));
        }
        Value::Object(statement)
    }
}

fn single_or_list(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn add_statement(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
            "Version": POLICY_VERSION,
        })
    }
}

/// ARN of an AWS managed policy.
pub fn managed_policy_arn(name: &str) -> Value {
    intrinsics::join(
        "",
        vec![
            json!("arn:"),
            Aws::partition(),
            json!(format!(":iam::aws:policy/{}", name)),
        ],
    )
}

#[derive(Debug, Clone, Default)]
pub struct RoleProps {
    /// Service principal, e.g. `ecs-tasks.amazonaws.com`.
    pub assumed_by: String,
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub inline_policies: BTreeMap<String, PolicyDocument>,
    pub managed_policy_arns: Vec<Value>,
}

pub fn create_role(
    app: &mut App,
    scope: NodeId,
    id: &str,
    props: &RoleProps,
) -> PatternResult<ResourceHandle> {
    let mut properties = json!({
        "AssumeRolePolicyDocument": {
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": props.assumed_by },
            }],
            "Version": POLICY_VERSION,
        },
    });
    if let Some(name) = &props.role_name {
        properties["RoleName"] = json!(name);
    }
    if let Some(description) = &props.description {
        properties["Description"] = json!(description);
    }
    if !props.inline_policies.is_empty() {
        properties["Policies"] = props
            .inline_policies
            .iter()
            .map(|(name, document)| {
                json!({ "PolicyDocument": document.to_json(), "PolicyName": name })
            })
            .collect();
    }
    if !props.managed_policy_arns.is_empty() {
        properties["ManagedPolicyArns"] = json!(props.managed_policy_arns);
    }

    Ok(app.add_resource(scope, id, "AWS::IAM::Role", properties)?)
}

/// Attach a standalone `AWS::IAM::Policy` to a role, as a child of the role.
pub fn attach_policy(
    app: &mut App,
    role: &ResourceHandle,
    document: &PolicyDocument,
) -> PatternResult<ResourceHandle> {
    let policy_name = format!("{}DefaultPolicy", role.logical_id);
    let properties = json!({
        "PolicyDocument": document.to_json(),
        "PolicyName": policy_name,
        "Roles": [role.ref_value()],
    });
    Ok(app.add_resource(role.node, "DefaultPolicy", "AWS::IAM::Policy", properties)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_core::assertions::Template;
    use orca_core::StackProps;

    #[test]
    fn test_statement_rendering() {
        let single = PolicyStatement::allow(&["s3:GetObject"], vec![json!("arn:aws:s3:::b/k")]);
        assert_eq!(
            single.to_json(),
            json!({ "Action": "s3:GetObject", "Effect": "Allow", "Resource": "arn:aws:s3:::b/k" })
        );

        let many = PolicyStatement::allow(&["a:One", "a:Two"], vec![json!("*")])
            .with_condition(json!({ "ArnEquals": { "ecs:cluster": "arn" } }));
        assert_eq!(many.to_json()["Action"], json!(["a:One", "a:Two"]));
        assert_eq!(many.to_json()["Condition"]["ArnEquals"]["ecs:cluster"], "arn");
    }

    #[test]
    fn test_document_deduplicates_statements() {
        let mut document = PolicyDocument::default();
        let statement = PolicyStatement::allow(&["xray:PutTraceSegments"], vec![json!("*")]);
        document.add_statement(statement.clone());
        document.add_statement(statement);
        assert_eq!(document.statements.len(), 1);
        assert_eq!(document.to_json()["Version"], "2012-10-17");
    }

    #[test]
    fn test_role_with_inline_and_managed_policies() {
        let mut app = App::default();
        let stack = app.add_stack("Stack", StackProps::default()).unwrap();

        let mut inline_policies = BTreeMap::new();
        inline_policies.insert(
            "Ec2VolumeAccess".to_string(),
            PolicyDocument::new(vec![PolicyStatement::allow(&["ec2:CreateVolume"], vec![json!("*")])]),
        );
        let role = create_role(
            &mut app,
            stack,
            "Role",
            &RoleProps {
                assumed_by: "ec2.amazonaws.com".to_string(),
                role_name: Some("AsgInstanceProfileRole".to_string()),
                inline_policies,
                managed_policy_arns: vec![managed_policy_arn("AmazonSSMManagedInstanceCore")],
                ..Default::default()
            },
        )
        .unwrap();
        let policy = attach_policy(
            &mut app,
            &role,
            &PolicyDocument::new(vec![PolicyStatement::allow(&["ecs:Poll"], vec![json!("*")])]),
        )
        .unwrap();
        assert!(policy.logical_id.starts_with("RoleDefaultPolicy"));

        let template = Template::from_stack(&app, stack).unwrap();
        template.has_resource_properties(
            "AWS::IAM::Role",
            &json!({
                "RoleName": "AsgInstanceProfileRole",
                "AssumeRolePolicyDocument": {
                    "Statement": [{ "Principal": { "Service": "ec2.amazonaws.com" } }]
                },
                "Policies": [{ "PolicyName": "Ec2VolumeAccess" }],
                "ManagedPolicyArns": [{
                    "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":iam::aws:policy/AmazonSSMManagedInstanceCore"]]
                }]
            }),
        );
        template.has_resource_properties(
            "AWS::IAM::Policy",
            &json!({ "PolicyName": "RoleDefaultPolicy", "Roles": [{ "Ref": "Role" }] }),
        );
    }
}
