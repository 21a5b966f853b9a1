//! Integration tests for the load-balanced and non load-balanced services.

use serde_json::{json, Value};

use orca_core::assertions::Template;
use orca_core::{App, Environment, NodeId, StackProps};
use orca_network::Vpc;
use orca_patterns::iam::{PolicyDocument, PolicyStatement};
use orca_patterns::service::{BucketReference, ListenerReference, NamespaceReference};
use orca_patterns::{
    ContainerDefinition, ListenerRuleOptions, LoadBalancedService, LoadBalancedServiceProps,
    LoadBalancerTarget, MountPoint, NetworkMode, NonLoadBalancedService, PatternError,
    PortMapping, RegistryType, ServiceDiscoveryOptions, ServiceEnvironment,
    ServiceLoadBalancerOptions, ServiceProps, TaskDefinitionOptions, Volume,
};

fn stack_app() -> (App, NodeId) {
    let mut app = App::default();
    let stack = app
        .add_stack(
            "ServiceTest",
            StackProps {
                env: Some(Environment::new("123456789012", "us-east-1")),
                ..Default::default()
            },
        )
        .unwrap();
    (app, stack)
}

fn environment(listener: bool, namespace: bool) -> ServiceEnvironment {
    ServiceEnvironment {
        cluster_name: json!("demo-cluster"),
        vpc: Vpc {
            vpc_id: "vpc-0abc".to_string(),
            availability_zones: vec!["us-east-1a".to_string()],
            public_subnet_ids: vec!["subnet-pub1".to_string()],
            private_subnet_ids: vec!["subnet-priv1".to_string()],
        },
        cluster_security_group_ids: vec![json!("sg-cluster1"), json!("sg-cluster2")],
        environment_file_bucket: BucketReference {
            bucket_name: json!("env-bucket"),
            bucket_arn: json!("arn:aws:s3:::env-bucket"),
        },
        namespace: namespace.then(|| NamespaceReference {
            id: json!("ns-123"),
            name: json!("demo.local"),
            arn: json!("arn:aws:servicediscovery:us-east-1:123456789012:namespace/ns-123"),
        }),
        listener: listener.then(|| ListenerReference {
            listener_arn: json!("arn:aws:elasticloadbalancing:listener/app/demo/1/2"),
            security_group_id: json!("sg-alb"),
        }),
    }
}

fn web_container() -> ContainerDefinition {
    ContainerDefinition {
        name: "web".to_string(),
        image: "web".to_string(),
        image_tag: "1.0".to_string(),
        cpu: 512,
        memory: 1024,
        port_mappings: vec![PortMapping {
            container_port: 8080,
            ..Default::default()
        }],
        environment_file_object_key: "web.env".to_string(),
        ..Default::default()
    }
}

fn service_props(network_mode: NetworkMode) -> ServiceProps {
    ServiceProps {
        log_group_name: "web-logs".to_string(),
        task_definition: TaskDefinitionOptions {
            family: Some("web".to_string()),
            network_mode,
            containers: vec![web_container()],
            ..Default::default()
        },
        desired_count: 2,
        capacity_providers: vec!["MainProvider".to_string()],
        ..Default::default()
    }
}

fn load_balanced_props(network_mode: NetworkMode) -> LoadBalancedServiceProps {
    LoadBalancedServiceProps {
        service: service_props(network_mode),
        load_balancer: ServiceLoadBalancerOptions {
            health_check_path: "/health".to_string(),
            listener_rule: ListenerRuleOptions {
                priority: 10,
                host: Some("app.example.com".to_string()),
                path: Some("/api/*".to_string()),
            },
            target: LoadBalancerTarget {
                container_name: "web".to_string(),
                container_port: 8080,
                ..Default::default()
            },
        },
    }
}

fn container_definitions(template: &Template) -> Vec<Value> {
    let definitions = template.find_resources("AWS::ECS::TaskDefinition", &json!({}));
    let (_, task) = definitions.iter().next().unwrap();
    task["Properties"]["ContainerDefinitions"]
        .as_array()
        .unwrap()
        .clone()
}

#[test]
fn test_non_load_balanced_bridge_service() {
    let (mut app, stack) = stack_app();
    let service = NonLoadBalancedService::build(
        &mut app,
        stack,
        "Worker",
        &service_props(NetworkMode::Bridge),
        &environment(false, false),
    )
    .unwrap();
    assert!(service.resources.task_role.is_none());
    assert!(service.resources.security_group.is_none());

    let template = Template::from_stack(&app, stack).unwrap();
    template.resource_count_is("AWS::IAM::Role", 1);
    template.resource_count_is("AWS::ElasticLoadBalancingV2::TargetGroup", 0);
    template.has_resource(
        "AWS::Logs::LogGroup",
        &json!({
            "Properties": { "LogGroupName": "web-logs", "RetentionInDays": 14 },
            "DeletionPolicy": "Delete"
        }),
    );
    template.has_resource_properties(
        "AWS::ECS::TaskDefinition",
        &json!({
            "Family": "web",
            "NetworkMode": "bridge",
            "RequiresCompatibilities": ["EC2"],
            "TaskRoleArn": null
        }),
    );
    template.has_resource_properties(
        "AWS::ECS::Service",
        &json!({
            "Cluster": "demo-cluster",
            "DesiredCount": 2,
            "CapacityProviderStrategy": [{ "CapacityProvider": "MainProvider", "Weight": 1, "Base": 0 }],
            "DeploymentConfiguration": {
                "DeploymentCircuitBreaker": { "Enable": true, "Rollback": true },
                "MaximumPercent": 200,
                "MinimumHealthyPercent": 50
            },
            "PlacementStrategies": [{ "Type": "binpack", "Field": "memory" }],
            "PropagateTags": "SERVICE",
            "EnableECSManagedTags": true,
            "NetworkConfiguration": null,
            "LoadBalancers": null,
            "ServiceRegistries": null
        }),
    );

    let containers = container_definitions(&template);
    assert_eq!(containers.len(), 1);
    let web = &containers[0];
    assert_eq!(web["PortMappings"][0]["HostPort"], 0);
    assert_eq!(web["LogConfiguration"]["Options"]["awslogs-stream-prefix"], "web");
    assert_eq!(web["LogConfiguration"]["Options"]["awslogs-region"], "us-east-1");
    assert_eq!(
        web["EnvironmentFiles"][0]["Value"],
        json!({ "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, ":s3:::env-bucket/web.env"]] })
    );
    assert_eq!(
        web["Image"],
        json!({ "Fn::Join": ["", ["123456789012.dkr.ecr.us-east-1.", { "Ref": "AWS::URLSuffix" }, "/web:1.0"]] })
    );
    assert!(web.get("Links").is_none());
}

#[test]
fn test_execution_role_policies() {
    let (mut app, stack) = stack_app();
    NonLoadBalancedService::build(
        &mut app,
        stack,
        "Worker",
        &service_props(NetworkMode::Bridge),
        &environment(false, false),
    )
    .unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::IAM::Role",
        &json!({
            "AssumeRolePolicyDocument": {
                "Statement": [{ "Principal": { "Service": "ecs-tasks.amazonaws.com" } }]
            },
            "Policies": [{
                "PolicyName": "DefaultPolicy",
                "PolicyDocument": {
                    "Statement": [{ "Action": "s3:GetBucketLocation", "Resource": "arn:aws:s3:::env-bucket" }]
                }
            }]
        }),
    );

    let policies = template.find_resources("AWS::IAM::Policy", &json!({}));
    assert_eq!(policies.len(), 1);
    let (_, policy) = policies.iter().next().unwrap();
    let statements = policy["Properties"]["PolicyDocument"]["Statement"]
        .as_array()
        .unwrap();
    assert_eq!(statements[0]["Action"], "s3:GetObject");
    assert_eq!(statements[0]["Resource"], "arn:aws:s3:::env-bucket/web.env");
    assert!(statements
        .iter()
        .any(|s| s["Action"] == "ecr:GetAuthorizationToken"));
    assert_eq!(
        statements.last().unwrap()["Action"],
        json!(["logs:CreateLogStream", "logs:PutLogEvents"])
    );
}

#[test]
fn test_other_registry_skips_ecr_permissions() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.task_definition.containers[0].registry_type = RegistryType::Others;
    props.task_definition.containers[0].image = "nginx".to_string();
    NonLoadBalancedService::build(&mut app, stack, "Proxy", &props, &environment(false, false))
        .unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    assert_eq!(container_definitions(&template)[0]["Image"], "nginx:1.0");

    let policies = template.find_resources("AWS::IAM::Policy", &json!({}));
    let (_, policy) = policies.iter().next().unwrap();
    let statements = policy["Properties"]["PolicyDocument"]["Statement"]
        .as_array()
        .unwrap();
    assert_eq!(statements.len(), 2);
}

#[test]
fn test_tracing_side_car() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.tracing_enabled = true;
    let service =
        NonLoadBalancedService::build(&mut app, stack, "Traced", &props, &environment(false, false))
            .unwrap();
    assert!(service.resources.task_role.is_some());

    let template = Template::from_stack(&app, stack).unwrap();
    template.resource_count_is("AWS::IAM::Role", 2);
    template.has_resource_properties(
        "AWS::IAM::Role",
        &json!({
            "Policies": [{
                "PolicyName": "DefaultPolicy",
                "PolicyDocument": { "Statement": [{ "Resource": "*", "Effect": "Allow" }] }
            }],
            "AssumeRolePolicyDocument": {
                "Statement": [{ "Principal": { "Service": "ecs-tasks.amazonaws.com" } }]
            }
        }),
    );

    let containers = container_definitions(&template);
    assert_eq!(containers.len(), 2);
    let otel = &containers[0];
    assert_eq!(otel["Name"], "otel-xray");
    assert_eq!(otel["Image"], "amazon/aws-otel-collector:v0.25.0");
    assert_eq!(otel["Cpu"], 256);
    assert_eq!(otel["Memory"], 256);
    assert_eq!(otel["Command"], json!(["--config=/etc/ecs/ecs-default-config.yaml"]));
    assert_eq!(otel["LogConfiguration"]["Options"]["awslogs-stream-prefix"], "otel");
    assert_eq!(
        otel["PortMappings"],
        json!([
            { "ContainerPort": 2000, "HostPort": 0, "Protocol": "udp" },
            { "ContainerPort": 4317, "HostPort": 0, "Protocol": "tcp" },
            { "ContainerPort": 8125, "HostPort": 0, "Protocol": "udp" }
        ])
    );

    let web = &containers[1];
    assert_eq!(web["Links"], json!(["otel-xray:otel-xray"]));
    assert_eq!(
        web["DependsOn"],
        json!([{ "Condition": "START", "ContainerName": "otel-xray" }])
    );
}

#[test]
fn test_task_policy_gets_xray_statement() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.tracing_enabled = true;
    props.task_definition.task_policy = Some(PolicyDocument::new(vec![PolicyStatement::allow(
        &["sqs:SendMessage"],
        vec![json!("arn:aws:sqs:us-east-1:123456789012:jobs")],
    )]));
    NonLoadBalancedService::build(&mut app, stack, "Jobs", &props, &environment(false, false))
        .unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::IAM::Role",
        &json!({
            "Policies": [{
                "PolicyDocument": {
                    "Statement": [
                        { "Action": "sqs:SendMessage" },
                        { "Action": [
                            "xray:GetSamplingRules",
                            "xray:GetSamplingStatisticSummaries",
                            "xray:GetSamplingTargets",
                            "xray:PutTelemetryRecords",
                            "xray:PutTraceSegments"
                        ] }
                    ]
                }
            }]
        }),
    );
}

#[test]
fn test_volumes_and_mount_points() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.task_definition.volumes = vec![Volume {
        name: "data".to_string(),
        size: 10,
    }];
    props.task_definition.containers[0].mount_points = vec![MountPoint {
        source_volume: "data".to_string(),
        container_path: "/var/lib/data".to_string(),
        read_only: false,
    }];
    NonLoadBalancedService::build(&mut app, stack, "Db", &props, &environment(false, false))
        .unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::ECS::TaskDefinition",
        &json!({
            "Volumes": [{
                "Name": "data",
                "DockerVolumeConfiguration": {
                    "Autoprovision": true,
                    "Driver": "rexray/ebs",
                    "DriverOpts": { "size": "10", "volumetype": "gp2" },
                    "Scope": "shared"
                }
            }]
        }),
    );
    assert_eq!(
        container_definitions(&template)[0]["MountPoints"],
        json!([{ "ContainerPath": "/var/lib/data", "ReadOnly": false, "SourceVolume": "data" }])
    );
}

#[test]
fn test_awsvpc_service_discovery() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::AwsVpc);
    props.service_discovery = Some(ServiceDiscoveryOptions {
        service_name: "web".to_string(),
        service_port: 8080,
    });
    let service =
        NonLoadBalancedService::build(&mut app, stack, "Web", &props, &environment(false, true))
            .unwrap();
    let discovery = service.resources.discovery_service.clone().unwrap();
    let group = service.resources.security_group.clone().unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::ServiceDiscovery::Service",
        &json!({
            "Name": "web",
            "NamespaceId": "ns-123",
            "DnsConfig": {
                "DnsRecords": [{ "Type": "A", "TTL": 60 }],
                "RoutingPolicy": "MULTIVALUE"
            },
            "HealthCheckCustomConfig": { "FailureThreshold": 1 }
        }),
    );
    template.has_resource_properties(
        "AWS::ECS::Service",
        &json!({
            "ServiceRegistries": [{ "RegistryArn": { "Fn::GetAtt": [discovery.logical_id, "Arn"] } }],
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "SecurityGroups": [{ "Fn::GetAtt": [group.resource.logical_id, "GroupId"] }],
                    "Subnets": ["subnet-priv1"]
                }
            }
        }),
    );
    template.has_resource_properties(
        "AWS::EC2::SecurityGroup",
        &json!({ "SecurityGroupIngress": [{ "CidrIp": "0.0.0.0/0", "FromPort": 8080, "ToPort": 8080 }] }),
    );
    assert_eq!(container_definitions(&template)[0]["PortMappings"][0]["HostPort"], 8080);
}

#[test]
fn test_bridge_service_discovery_is_rejected() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.service_discovery = Some(ServiceDiscoveryOptions {
        service_name: "web".to_string(),
        service_port: 8080,
    });
    let result =
        NonLoadBalancedService::build(&mut app, stack, "Web", &props, &environment(false, true));
    assert!(matches!(result, Err(PatternError::InvalidServiceDiscovery { .. })));
}

#[test]
fn test_load_balanced_bridge_service() {
    let (mut app, stack) = stack_app();
    let service = LoadBalancedService::build(
        &mut app,
        stack,
        "Web",
        &load_balanced_props(NetworkMode::Bridge),
        &environment(true, false),
    )
    .unwrap();
    assert_eq!(service.ingress.len(), 2);

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        &json!({
            "HealthCheckEnabled": true,
            "HealthCheckIntervalSeconds": 30,
            "HealthCheckPath": "/health",
            "Matcher": { "HttpCode": "200" },
            "Port": 80,
            "Protocol": "HTTP",
            "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
            "TargetType": "instance",
            "VpcId": "vpc-0abc"
        }),
    );
    template.has_resource_properties(
        "AWS::ElasticLoadBalancingV2::ListenerRule",
        &json!({
            "Priority": 10,
            "ListenerArn": "arn:aws:elasticloadbalancing:listener/app/demo/1/2",
            "Actions": [{ "Type": "forward", "TargetGroupArn": { "Ref": service.target_group.logical_id } }],
            "Conditions": [
                { "Field": "host-header", "HostHeaderConfig": { "Values": ["app.example.com"] } },
                { "Field": "path-pattern", "PathPatternConfig": { "Values": ["/api/*"] } }
            ]
        }),
    );
    template.resource_count_is("AWS::EC2::SecurityGroupIngress", 2);
    template.has_resource_properties(
        "AWS::EC2::SecurityGroupIngress",
        &json!({
            "GroupId": "sg-cluster2",
            "SourceSecurityGroupId": "sg-alb",
            "FromPort": 32768,
            "ToPort": 65535,
            "IpProtocol": "tcp"
        }),
    );
    template.has_resource(
        "AWS::ECS::Service",
        &json!({
            "Properties": {
                "LoadBalancers": [{
                    "ContainerName": "web",
                    "ContainerPort": 8080,
                    "TargetGroupArn": { "Ref": service.target_group.logical_id }
                }]
            },
            "DependsOn": [service.listener_rule.logical_id]
        }),
    );
}

#[test]
fn test_host_only_listener_rule() {
    let (mut app, stack) = stack_app();
    let mut props = load_balanced_props(NetworkMode::Bridge);
    props.load_balancer.listener_rule.path = None;
    LoadBalancedService::build(&mut app, stack, "Web", &props, &environment(true, false)).unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::ElasticLoadBalancingV2::ListenerRule",
        &json!({ "Conditions": [{ "Field": "host-header" }] }),
    );
}

#[test]
fn test_load_balanced_awsvpc_service() {
    let (mut app, stack) = stack_app();
    let service = LoadBalancedService::build(
        &mut app,
        stack,
        "Web",
        &load_balanced_props(NetworkMode::AwsVpc),
        &environment(true, false),
    )
    .unwrap();
    let group = service.resources.security_group.clone().unwrap();

    let template = Template::from_stack(&app, stack).unwrap();
    template.has_resource_properties(
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        &json!({ "TargetType": "ip" }),
    );
    template.resource_count_is("AWS::EC2::SecurityGroupIngress", 1);
    template.has_resource_properties(
        "AWS::EC2::SecurityGroupIngress",
        &json!({
            "GroupId": { "Fn::GetAtt": [group.resource.logical_id, "GroupId"] },
            "SourceSecurityGroupId": "sg-alb",
            "FromPort": 8080,
            "ToPort": 8080
        }),
    );
}

#[test]
fn test_load_balanced_service_needs_listener() {
    let (mut app, stack) = stack_app();
    let result = LoadBalancedService::build(
        &mut app,
        stack,
        "Web",
        &load_balanced_props(NetworkMode::Bridge),
        &environment(false, false),
    );
    assert!(matches!(result, Err(PatternError::MissingListener(_))));
    assert!(app.find_child(stack, "Web").is_none());
}

#[test]
fn test_service_without_containers_is_rejected() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.task_definition.containers.clear();
    let result =
        NonLoadBalancedService::build(&mut app, stack, "Empty", &props, &environment(false, false));
    assert!(matches!(result, Err(PatternError::InvalidConfig(_))));
}

#[test]
fn test_mount_point_without_volume_is_rejected() {
    let (mut app, stack) = stack_app();
    let mut props = service_props(NetworkMode::Bridge);
    props.task_definition.containers[0].mount_points = vec![MountPoint {
        source_volume: "data".to_string(),
        container_path: "/var/lib/data".to_string(),
        read_only: false,
    }];
    let result =
        NonLoadBalancedService::build(&mut app, stack, "Db", &props, &environment(false, false));
    assert!(matches!(result, Err(PatternError::InvalidConfig(_))));

    let template = Template::from_stack(&app, stack).unwrap();
    template.resource_count_is("AWS::ECS::TaskDefinition", 0);
}
