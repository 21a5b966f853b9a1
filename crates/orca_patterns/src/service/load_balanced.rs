//! Service registered behind the shared application load balancer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use orca_core::{App, NodeId, ResourceHandle};
use orca_network::{add_ingress_rule, create_ingress, Peer, Port};

use super::{
    assemble_task, create_service, NetworkMode, Protocol, ServiceEnvironment, ServiceProps,
    ServiceResources,
};
use crate::error::{PatternError, PatternResult};

const EPHEMERAL_PORT_RANGE: (u16, u16) = (32768, 65535);
const HEALTH_CHECK_INTERVAL_SECONDS: u32 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerRuleOptions {
    pub priority: u32,
    pub host: Option<String>,
    pub path: Option<String>,
}

impl ListenerRuleOptions {
    /// Rule conditions, host header before path pattern. Blank values are
    /// skipped.
    pub fn conditions(&self) -> Vec<Value> {
        let mut conditions = Vec::new();
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            conditions.push(json!({
                "Field": "host-header",
                "HostHeaderConfig": { "Values": [host] },
            }));
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            conditions.push(json!({
                "Field": "path-pattern",
                "PathPatternConfig": { "Values": [path] },
            }));
        }
        conditions
    }
}

/// Container and port the load balancer sends traffic to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerTarget {
    pub container_name: String,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLoadBalancerOptions {
    pub health_check_path: String,
    pub listener_rule: ListenerRuleOptions,
    pub target: LoadBalancerTarget,
}

impl Default for ServiceLoadBalancerOptions {
    fn default() -> Self {
        Self {
            health_check_path: "/".to_string(),
            listener_rule: ListenerRuleOptions::default(),
            target: LoadBalancerTarget::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancedServiceProps {
    #[serde(flatten)]
    pub service: ServiceProps,
    pub load_balancer: ServiceLoadBalancerOptions,
}

#[derive(Debug, Clone)]
pub struct LoadBalancedService {
    pub resources: ServiceResources,
    pub target_group: ResourceHandle,
    pub listener_rule: ResourceHandle,
    pub ingress: Vec<ResourceHandle>,
}

impl LoadBalancedService {
    pub fn build(
        app: &mut App,
        scope: NodeId,
        id: &str,
        props: &LoadBalancedServiceProps,
        env: &ServiceEnvironment,
    ) -> PatternResult<Self> {
        let listener = env
            .listener
            .as_ref()
            .ok_or_else(|| PatternError::MissingListener(format!("{}/{}", app.path(scope), id)))?;

        let this = app.add_construct(scope, id)?;
        info!("Building load-balanced service {}", app.path(this));

        let task = assemble_task(app, this, &props.service, env)?;
        let network_mode = props.service.task_definition.network_mode;
        let options = &props.load_balancer;

        let target_type = match network_mode {
            NetworkMode::Bridge => "instance",
            NetworkMode::AwsVpc => "ip",
        };
        let target_group = app.add_resource(
            this,
            "TargetGroup",
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            json!({
                "HealthCheckEnabled": true,
                "HealthCheckIntervalSeconds": HEALTH_CHECK_INTERVAL_SECONDS,
                "HealthCheckPath": options.health_check_path,
                "Matcher": { "HttpCode": "200" },
                "Port": 80,
                "Protocol": "HTTP",
                "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
                "TargetType": target_type,
                "VpcId": env.vpc.vpc_id,
            }),
        )?;

        let listener_rule = app.add_resource(
            this,
            "ListenerRule",
            "AWS::ElasticLoadBalancingV2::ListenerRule",
            json!({
                "Actions": [{ "TargetGroupArn": target_group.ref_value(), "Type": "forward" }],
                "Conditions": options.listener_rule.conditions(),
                "ListenerArn": listener.listener_arn,
                "Priority": options.listener_rule.priority,
            }),
        )?;

        let peer = Peer::SecurityGroup(listener.security_group_id.clone());
        let mut ingress = Vec::new();
        match network_mode {
            NetworkMode::Bridge => {
                let (from, to) = EPHEMERAL_PORT_RANGE;
                for (index, group_id) in env.cluster_security_group_ids.iter().enumerate() {
                    ingress.push(create_ingress(
                        app,
                        this,
                        &format!("ClusterIngress{}", index),
                        group_id.clone(),
                        &peer,
                        Port::TcpRange(from, to),
                        "Load balancer to dynamic host ports",
                    )?);
                }
            }
            NetworkMode::AwsVpc => {
                if let Some(group) = task.security_group().cloned() {
                    let port = match options.target.protocol {
                        Protocol::Tcp => Port::Tcp(options.target.container_port),
                        Protocol::Udp => Port::Udp(options.target.container_port),
                    };
                    let rule =
                        add_ingress_rule(app, &group, &peer, port, "Load balancer to target")?;
                    ingress.extend(rule);
                }
            }
        }

        let load_balancers = vec![json!({
            "ContainerName": options.target.container_name,
            "ContainerPort": options.target.container_port,
            "TargetGroupArn": target_group.ref_value(),
        })];
        let resources = create_service(app, this, &props.service, env, task, load_balancers)?;
        app.add_dependency(resources.service.node, listener_rule.node)?;

        Ok(Self {
            resources,
            target_group,
            listener_rule,
            ingress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_host_then_path() {
        let rule = ListenerRuleOptions {
            priority: 1,
            host: Some("app.example.com".to_string()),
            path: Some("/api/*".to_string()),
        };
        let conditions = rule.conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0]["Field"], "host-header");
        assert_eq!(conditions[1]["Field"], "path-pattern");
    }

    #[test]
    fn test_blank_conditions_are_skipped() {
        let rule = ListenerRuleOptions {
            priority: 1,
            host: Some(String::new()),
            path: Some("/api/*".to_string()),
        };
        let conditions = rule.conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0]["PathPatternConfig"]["Values"][0], "/api/*");
        assert!(ListenerRuleOptions::default().conditions().is_empty());
    }

    #[test]
    fn test_props_flatten_service_fields() {
        let props: LoadBalancedServiceProps = serde_json::from_value(json!({
            "log_group_name": "web-logs",
            "desired_count": 2,
            "load_balancer": {
                "health_check_path": "/health",
                "listener_rule": { "priority": 10, "host": "app.example.com" },
                "target": { "container_name": "web", "container_port": 8080 }
            }
        }))
        .unwrap();
        assert_eq!(props.service.log_group_name, "web-logs");
        assert_eq!(props.service.desired_count, 2);
        assert_eq!(props.load_balancer.listener_rule.priority, 10);
        assert_eq!(props.load_balancer.target.protocol, Protocol::Tcp);
    }
}
