//! Security groups and ingress rules.

use serde_json::{json, Value};
use tracing::debug;

use orca_core::{App, NodeId, Reference, ResourceHandle};

use crate::error::{NetworkError, NetworkResult};
use crate::vpc::Vpc;

const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Default)]
pub struct SecurityGroupProps {
    pub name: Option<String>,
    pub description: Option<String>,
    pub allow_all_outbound: bool,
}

/// A security group created in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub resource: ResourceHandle,
}

impl SecurityGroup {
    pub fn group_id(&self) -> Reference {
        self.resource.attribute("GroupId")
    }
}

/// Source of an ingress rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    AnyIpv4,
    /// Another security group, by id value.
    SecurityGroup(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Tcp(u16),
    TcpRange(u16, u16),
    Udp(u16),
    AllTraffic,
}

impl Port {
    fn rule(&self) -> NetworkResult<(&'static str, i64, i64)> {
        Ok(match *self {
            Port::Tcp(port) => ("tcp", port.into(), port.into()),
            Port::TcpRange(from, to) if from > to => {
                return Err(NetworkError::InvalidPortRange { from, to })
            }
            Port::TcpRange(from, to) => ("tcp", from.into(), to.into()),
            Port::Udp(port) => ("udp", port.into(), port.into()),
            Port::AllTraffic => ("-1", -1, -1),
        })
    }

    pub fn label(&self) -> String {
        match self {
            Port::Tcp(port) => port.to_string(),
            Port::TcpRange(from, to) => format!("{}-{}", from, to),
            Port::Udp(port) => format!("UDP {}", port),
            Port::AllTraffic => "ALL TRAFFIC".to_string(),
        }
    }
}

fn rule_body(peer: &Peer, port: Port, description: &str) -> NetworkResult<Value> {
    let (protocol, from, to) = port.rule()?;
    let mut rule = json!({
        "IpProtocol": protocol,
        "Description": description,
    });
    if protocol != "-1" {
        rule["FromPort"] = json!(from);
        rule["ToPort"] = json!(to);
    }
    match peer {
        Peer::AnyIpv4 => rule["CidrIp"] = json!(ANY_IPV4),
        Peer::SecurityGroup(group_id) => rule["SourceSecurityGroupId"] = group_id.clone(),
    }
    Ok(rule)
}

/// Create a security group in `vpc`.
pub fn create_security_group(
    app: &mut App,
    scope: NodeId,
    id: &str,
    vpc: &Vpc,
    props: &SecurityGroupProps,
) -> NetworkResult<SecurityGroup> {
    let description = match &props.description {
        Some(description) => description.clone(),
        None => {
            let scope_path = app.path(scope);
            format!("{}/{}", scope_path, id)
        }
    };

    let mut properties = json!({
        "GroupDescription": description,
        "VpcId": vpc.vpc_id,
    });
    if let Some(name) = &props.name {
        properties["GroupName"] = json!(name);
    }
    if props.allow_all_outbound {
        properties["SecurityGroupEgress"] = json!([{
            "CidrIp": ANY_IPV4,
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }]);
    }

    let resource = app.add_resource(scope, id, "AWS::EC2::SecurityGroup", properties)?;
    Ok(SecurityGroup { resource })
}

/// Allow traffic into `group`.
///
/// CIDR peers are written inline on the group. Security group peers become
/// a separate `AWS::EC2::SecurityGroupIngress` next to the group, which is
/// returned.
pub fn add_ingress_rule(
    app: &mut App,
    group: &SecurityGroup,
    peer: &Peer,
    port: Port,
    description: &str,
) -> NetworkResult<Option<ResourceHandle>> {
    match peer {
        Peer::AnyIpv4 => {
            let rule = rule_body(peer, port, description)?;
            let resource = app.resource_mut(&group.resource)?;
            let ingress = resource.property_mut("SecurityGroupIngress");
            match ingress {
                Value::Array(rules) => rules.push(rule),
                other => *other = json!([rule]),
            }
            debug!("Inline ingress {} on {}", port.label(), group.resource.logical_id);
            Ok(None)
        }
        Peer::SecurityGroup(_) => {
            let existing = app
                .children(group.resource.node)?
                .iter()
                .filter(|c| app.node_id(**c).map(|id| id.starts_with("Ingress")).unwrap_or(false))
                .count();
            let id = format!("Ingress{}", existing + 1);
            let group_id = group.resource.get_att("GroupId");
            create_ingress(app, group.resource.node, &id, group_id, peer, port, description)
                .map(Some)
        }
    }
}

/// Create a standalone ingress rule for a group id value.
///
/// Used when the group lives in another stack and only its resolved id is
/// available in `scope`.
pub fn create_ingress(
    app: &mut App,
    scope: NodeId,
    id: &str,
    group_id: Value,
    peer: &Peer,
    port: Port,
    description: &str,
) -> NetworkResult<ResourceHandle> {
    let mut properties = rule_body(peer, port, description)?;
    properties["GroupId"] = group_id;
    let handle = app.add_resource(scope, id, "AWS::EC2::SecurityGroupIngress", properties)?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orca_core::assertions::Template;
    use orca_core::StackProps;

    fn vpc() -> Vpc {
        Vpc {
            vpc_id: "vpc-1".to_string(),
            availability_zones: vec!["a".to_string()],
            public_subnet_ids: vec!["s-1".to_string()],
            private_subnet_ids: vec![],
        }
    }

    #[test]
    fn test_security_group_defaults() {
        let mut app = App::default();
        let stack = app.add_stack("Stack", StackProps::default()).unwrap();
        let group = create_security_group(
            &mut app,
            stack,
            "WebSecurityGroup",
            &vpc(),
            &SecurityGroupProps {
                allow_all_outbound: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(group.group_id().attribute.as_deref(), Some("GroupId"));

        let template = Template::from_stack(&app, stack).unwrap();
        template.has_resource_properties(
            "AWS::EC2::SecurityGroup",
            &json!({
                "GroupDescription": "Stack/WebSecurityGroup",
                "VpcId": "vpc-1",
                "GroupName": null,
                "SecurityGroupEgress": [{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }]
            }),
        );
    }

    #[test]
    fn test_any_ipv4_rules_are_inline() {
        let mut app = App::default();
        let stack = app.add_stack("Stack", StackProps::default()).unwrap();
        let group = create_security_group(
            &mut app,
            stack,
            "LbSecurityGroup",
            &vpc(),
            &SecurityGroupProps {
                name: Some("LbSecurityGroup".to_string()),
                description: Some("Security group for lb".to_string()),
                allow_all_outbound: true,
            },
        )
        .unwrap();

        add_ingress_rule(&mut app, &group, &Peer::AnyIpv4, Port::Tcp(443), "Default HTTPS Port")
            .unwrap();
        add_ingress_rule(&mut app, &group, &Peer::AnyIpv4, Port::Tcp(80), "Default HTTP Port")
            .unwrap();

        let template = Template::from_stack(&app, stack).unwrap();
        template.resource_count_is("AWS::EC2::SecurityGroupIngress", 0);
        template.has_resource_properties(
            "AWS::EC2::SecurityGroup",
            &json!({
                "GroupName": "LbSecurityGroup",
                "SecurityGroupIngress": [
                    { "CidrIp": "0.0.0.0/0", "Description": "Default HTTPS Port", "FromPort": 443, "ToPort": 443, "IpProtocol": "tcp" },
                    { "CidrIp": "0.0.0.0/0", "Description": "Default HTTP Port", "FromPort": 80, "ToPort": 80, "IpProtocol": "tcp" }
                ]
            }),
        );
    }

    #[test]
    fn test_security_group_peers_are_separate_resources() {
        let mut app = App::default();
        let stack = app.add_stack("Stack", StackProps::default()).unwrap();
        let source = create_security_group(&mut app, stack, "Source", &vpc(), &Default::default())
            .unwrap();
        let target = create_security_group(&mut app, stack, "Target", &vpc(), &Default::default())
            .unwrap();

        let peer = Peer::SecurityGroup(source.resource.get_att("GroupId"));
        let first = add_ingress_rule(&mut app, &target, &peer, Port::TcpRange(32768, 65535), "ephemeral")
            .unwrap()
            .unwrap();
        let second = add_ingress_rule(&mut app, &target, &peer, Port::Tcp(8080), "app")
            .unwrap()
            .unwrap();
        assert_ne!(first.logical_id, second.logical_id);

        let template = Template::from_stack(&app, stack).unwrap();
        template.resource_count_is("AWS::EC2::SecurityGroupIngress", 2);
        template.has_resource_properties(
            "AWS::EC2::SecurityGroupIngress",
            &json!({
                "GroupId": { "Fn::GetAtt": ["Target", "GroupId"] },
                "SourceSecurityGroupId": { "Fn::GetAtt": ["Source", "GroupId"] },
                "FromPort": 32768,
                "ToPort": 65535,
                "IpProtocol": "tcp"
            }),
        );
    }

    #[test]
    fn test_invalid_range_is_rejected() {
        let mut app = App::default();
        let stack = app.add_stack("Stack", StackProps::default()).unwrap();
        let result = create_ingress(
            &mut app,
            stack,
            "Bad",
            json!("sg-1"),
            &Peer::AnyIpv4,
            Port::TcpRange(10, 5),
            "bad",
        );
        assert!(matches!(result, Err(NetworkError::InvalidPortRange { .. })));
    }
}
