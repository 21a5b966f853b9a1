//! ECS services running on EC2 capacity.
//!
//! Both service flavours share the task assembly in this module: roles, log
//! group, task definition, optional tracing side-car, optional Cloud Map
//! registration and the `AWS::ECS::Service` itself. The load-balanced flavour
//! adds a target group and a listener rule on top.

pub mod load_balanced;
pub mod non_load_balanced;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use orca_core::intrinsics::{self, Aws};
use orca_core::logical_id::sanitize;
use orca_core::{App, NodeId, RemovalPolicy, ResourceHandle};
use orca_network::{
    add_ingress_rule, create_security_group, Peer, Port, SecurityGroup, SecurityGroupProps,
    SubnetType, Vpc,
};

use crate::error::{PatternError, PatternResult};
use crate::iam::{self, PolicyDocument, PolicyStatement, RoleProps};
use crate::user_data::VOLUME_DRIVER;

pub use load_balanced::{
    ListenerRuleOptions, LoadBalancedService, LoadBalancedServiceProps, LoadBalancerTarget,
    ServiceLoadBalancerOptions,
};
pub use non_load_balanced::NonLoadBalancedService;

const LOG_RETENTION_DAYS: u32 = 14;
const VOLUME_TYPE: &str = "gp2";
const TASK_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

pub const OTEL_CONTAINER_NAME: &str = "otel-xray";
pub const OTEL_CONTAINER_IMAGE: &str = "amazon/aws-otel-collector:v0.25.0";

const XRAY_ACTIONS: [&str; 5] = [
    "xray:GetSamplingRules",
    "xray:GetSamplingStatisticSummaries",
    "xray:GetSamplingTargets",
    "xray:PutTelemetryRecords",
    "xray:PutTraceSegments",
];

const ECR_PULL_ACTIONS: [&str; 3] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    #[default]
    #[serde(rename = "bridge")]
    Bridge,
    #[serde(rename = "awsvpc")]
    AwsVpc,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Bridge => "bridge",
            NetworkMode::AwsVpc => "awsvpc",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryType {
    #[default]
    Ecr,
    Others,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountPoint {
    pub source_volume: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefinition {
    pub name: String,
    /// Repository name for ECR images, full image name otherwise.
    pub image: String,
    pub registry_type: RegistryType,
    pub image_tag: String,
    pub essential: bool,
    pub command: Vec<String>,
    pub entry_point: Vec<String>,
    pub cpu: u32,
    /// Hard memory limit in MiB.
    pub memory: u32,
    pub port_mappings: Vec<PortMapping>,
    pub environment_file_object_key: String,
    pub mount_points: Vec<MountPoint>,
}

impl Default for ContainerDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            registry_type: RegistryType::Ecr,
            image_tag: "latest".to_string(),
            essential: true,
            command: Vec::new(),
            entry_point: Vec::new(),
            cpu: 256,
            memory: 512,
            port_mappings: Vec::new(),
            environment_file_object_key: String::new(),
            mount_points: Vec::new(),
        }
    }
}

/// EBS-backed docker volume. `size` is in GiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub name: String,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefinitionOptions {
    pub family: Option<String>,
    pub network_mode: NetworkMode,
    pub task_policy: Option<PolicyDocument>,
    pub containers: Vec<ContainerDefinition>,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDiscoveryOptions {
    pub service_name: String,
    pub service_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProps {
    pub log_group_name: String,
    pub task_definition: TaskDefinitionOptions,
    pub tracing_enabled: bool,
    pub desired_count: u32,
    pub capacity_providers: Vec<String>,
    pub service_discovery: Option<ServiceDiscoveryOptions>,
}

impl Default for ServiceProps {
    fn default() -> Self {
        Self {
            log_group_name: String::new(),
            task_definition: TaskDefinitionOptions::default(),
            tracing_enabled: false,
            desired_count: 1,
            capacity_providers: Vec::new(),
            service_discovery: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketReference {
    pub bucket_name: Value,
    pub bucket_arn: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceReference {
    pub id: Value,
    pub name: Value,
    pub arn: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerReference {
    pub listener_arn: Value,
    pub security_group_id: Value,
}

/// What a service needs from the compute it runs on.
///
/// Members are template values: literals for imported resources, or values
/// already resolved into the stack the service is built in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEnvironment {
    pub cluster_name: Value,
    pub vpc: Vpc,
    pub cluster_security_group_ids: Vec<Value>,
    pub environment_file_bucket: BucketReference,
    pub namespace: Option<NamespaceReference>,
    pub listener: Option<ListenerReference>,
}

/// Resources shared by every service flavour.
#[derive(Debug, Clone)]
pub struct ServiceResources {
    pub scope: NodeId,
    pub execution_role: ResourceHandle,
    pub task_role: Option<ResourceHandle>,
    pub log_group: ResourceHandle,
    pub task_definition: ResourceHandle,
    pub security_group: Option<SecurityGroup>,
    pub discovery_service: Option<ResourceHandle>,
    pub service: ResourceHandle,
}

/// Reject service discovery settings ECS would refuse at deploy time.
pub(crate) fn check_service_discovery(
    service: &str,
    props: &ServiceProps,
    has_namespace: bool,
) -> PatternResult<()> {
    if props.service_discovery.is_none() {
        return Ok(());
    }
    if props.task_definition.network_mode == NetworkMode::Bridge {
        return Err(PatternError::InvalidServiceDiscovery {
            service: service.to_string(),
            reason: "A records require the awsvpc network mode".to_string(),
        });
    }
    if !has_namespace {
        return Err(PatternError::MissingNamespace(service.to_string()));
    }
    Ok(())
}

/// Reject task definitions ECS would refuse at registration.
pub(crate) fn check_task_definition(service: &str, props: &ServiceProps) -> PatternResult<()> {
    let task = &props.task_definition;
    if task.containers.is_empty() {
        return Err(PatternError::InvalidConfig(format!(
            "service {} has no containers",
            service
        )));
    }

    for container in &task.containers {
        for mount in &container.mount_points {
            if !task.volumes.iter().any(|v| v.name == mount.source_volume) {
                return Err(PatternError::InvalidConfig(format!(
                    "container {} of service {} mounts undeclared volume '{}'",
                    container.name, service, mount.source_volume
                )));
            }
        }
    }
    Ok(())
}

/// Task-level resources, before the service is created.
pub(crate) struct TaskAssembly {
    execution_role: ResourceHandle,
    task_role: Option<ResourceHandle>,
    log_group: ResourceHandle,
    task_definition: ResourceHandle,
    security_group: Option<SecurityGroup>,
    discovery_service: Option<ResourceHandle>,
}

impl TaskAssembly {
    pub(crate) fn security_group(&self) -> Option<&SecurityGroup> {
        self.security_group.as_ref()
    }
}

pub(crate) fn assemble_task(
    app: &mut App,
    scope: NodeId,
    props: &ServiceProps,
    env: &ServiceEnvironment,
) -> PatternResult<TaskAssembly> {
    let service_path = app.path(scope);
    check_task_definition(&service_path, props)?;
    check_service_discovery(&service_path, props, env.namespace.is_some())?;

    let network_mode = props.task_definition.network_mode;
    let bucket = &env.environment_file_bucket;

    let mut execution_inline = BTreeMap::new();
    execution_inline.insert(
        "DefaultPolicy".to_string(),
        PolicyDocument::new(vec![PolicyStatement::allow(
            &["s3:GetBucketLocation"],
            vec![bucket.bucket_arn.clone()],
        )]),
    );
    let execution_role = iam::create_role(
        app,
        scope,
        "ExecutionRole",
        &RoleProps {
            assumed_by: TASK_PRINCIPAL.to_string(),
            inline_policies: execution_inline,
            ..Default::default()
        },
    )?;

    let task_role = create_task_role(app, scope, props)?;

    let mut log_properties = json!({ "RetentionInDays": LOG_RETENTION_DAYS });
    if !props.log_group_name.is_empty() {
        log_properties["LogGroupName"] = json!(props.log_group_name);
    }
    let log_group = app.add_resource(scope, "LogGroup", "AWS::Logs::LogGroup", log_properties)?;
    app.resource_mut(&log_group)?
        .apply_removal_policy(RemovalPolicy::Destroy);

    let mut execution_policy = PolicyDocument::default();
    let mut container_definitions = Vec::new();
    if props.tracing_enabled {
        container_definitions.push(otel_container(app, scope, network_mode, &log_group)?);
    }
    for container in &props.task_definition.containers {
        execution_policy.add_statement(PolicyStatement::allow(
            &["s3:GetObject"],
            vec![intrinsics::join(
                "",
                vec![
                    bucket.bucket_arn.clone(),
                    json!(format!("/{}", container.environment_file_object_key)),
                ],
            )],
        ));
        if container.registry_type == RegistryType::Ecr {
            execution_policy.add_statement(PolicyStatement::allow(
                &ECR_PULL_ACTIONS,
                vec![ecr_repository_arn(app, scope, &container.image)?],
            ));
            execution_policy
                .add_statement(PolicyStatement::allow(&["ecr:GetAuthorizationToken"], vec![json!("*")]));
        }
        container_definitions.push(application_container(
            app,
            scope,
            container,
            props,
            bucket,
            &log_group,
        )?);
    }
    execution_policy.add_statement(PolicyStatement::allow(
        &["logs:CreateLogStream", "logs:PutLogEvents"],
        vec![log_group.get_att("Arn")],
    ));
    iam::attach_policy(app, &execution_role, &execution_policy)?;

    let family = match &props.task_definition.family {
        Some(family) => family.clone(),
        None => sanitize(&service_path),
    };
    let mut task_properties = json!({
        "ContainerDefinitions": container_definitions,
        "ExecutionRoleArn": execution_role.get_att("Arn"),
        "Family": family,
        "NetworkMode": network_mode.as_str(),
        "RequiresCompatibilities": ["EC2"],
    });
    if let Some(role) = &task_role {
        task_properties["TaskRoleArn"] = role.get_att("Arn");
    }
    if !props.task_definition.volumes.is_empty() {
        task_properties["Volumes"] = props
            .task_definition
            .volumes
            .iter()
            .map(volume_definition)
            .collect();
    }
    let task_definition = app.add_resource(
        scope,
        "TaskDefinition",
        "AWS::ECS::TaskDefinition",
        task_properties,
    )?;

    let security_group = match network_mode {
        NetworkMode::AwsVpc => Some(create_service_security_group(app, scope, props, &env.vpc)?),
        NetworkMode::Bridge => None,
    };

    let discovery_service = match (&props.service_discovery, &env.namespace) {
        (Some(discovery), Some(namespace)) => Some(app.add_resource(
            scope,
            "CloudMapService",
            "AWS::ServiceDiscovery::Service",
            json!({
                "Name": discovery.service_name,
                "NamespaceId": namespace.id,
                "DnsConfig": {
                    "DnsRecords": [{ "TTL": 60, "Type": "A" }],
                    "NamespaceId": namespace.id,
                    "RoutingPolicy": "MULTIVALUE",
                },
                "HealthCheckCustomConfig": { "FailureThreshold": 1 },
            }),
        )?),
        _ => None,
    };

    Ok(TaskAssembly {
        execution_role,
        task_role,
        log_group,
        task_definition,
        security_group,
        discovery_service,
    })
}

fn create_task_role(
    app: &mut App,
    scope: NodeId,
    props: &ServiceProps,
) -> PatternResult<Option<ResourceHandle>> {
    let mut document = match &props.task_definition.task_policy {
        Some(policy) => policy.clone(),
        None if props.tracing_enabled => PolicyDocument::default(),
        None => return Ok(None),
    };
    if props.tracing_enabled {
        document.add_statement(PolicyStatement::allow(&XRAY_ACTIONS, vec![json!("*")]));
    }

    let mut inline_policies = BTreeMap::new();
    inline_policies.insert("DefaultPolicy".to_string(), document);
    let role = iam::create_role(
        app,
        scope,
        "TaskRole",
        &RoleProps {
            assumed_by: TASK_PRINCIPAL.to_string(),
            inline_policies,
            ..Default::default()
        },
    )?;
    Ok(Some(role))
}

fn log_configuration(app: &App, scope: NodeId, log_group: &ResourceHandle, prefix: &str) -> PatternResult<Value> {
    Ok(json!({
        "LogDriver": "awslogs",
        "Options": {
            "awslogs-group": log_group.ref_value(),
            "awslogs-region": app.region(scope)?,
            "awslogs-stream-prefix": prefix,
        },
    }))
}

fn host_port(network_mode: NetworkMode, container_port: u16) -> u16 {
    match network_mode {
        NetworkMode::Bridge => 0,
        NetworkMode::AwsVpc => container_port,
    }
}

fn port_mapping(network_mode: NetworkMode, container_port: u16, protocol: Protocol) -> Value {
    json!({
        "ContainerPort": container_port,
        "HostPort": host_port(network_mode, container_port),
        "Protocol": protocol.as_str(),
    })
}

fn otel_container(
    app: &App,
    scope: NodeId,
    network_mode: NetworkMode,
    log_group: &ResourceHandle,
) -> PatternResult<Value> {
    Ok(json!({
        "Name": OTEL_CONTAINER_NAME,
        "Image": OTEL_CONTAINER_IMAGE,
        "Essential": true,
        "Cpu": 256,
        "Memory": 256,
        "Command": ["--config=/etc/ecs/ecs-default-config.yaml"],
        "LogConfiguration": log_configuration(app, scope, log_group, "otel")?,
        "PortMappings": [
            port_mapping(network_mode, 2000, Protocol::Udp),
            port_mapping(network_mode, 4317, Protocol::Tcp),
            port_mapping(network_mode, 8125, Protocol::Udp),
        ],
    }))
}

fn container_image(app: &App, scope: NodeId, container: &ContainerDefinition) -> PatternResult<Value> {
    let tag = format!("{}:{}", container.image, container.image_tag);
    Ok(match container.registry_type {
        RegistryType::Ecr => intrinsics::join(
            "",
            vec![
                app.account(scope)?,
                json!(".dkr.ecr."),
                app.region(scope)?,
                json!("."),
                Aws::url_suffix(),
                json!(format!("/{}", tag)),
            ],
        ),
        RegistryType::Others => json!(tag),
    })
}

fn ecr_repository_arn(app: &App, scope: NodeId, repository: &str) -> PatternResult<Value> {
    Ok(intrinsics::join(
        "",
        vec![
            json!("arn:"),
            Aws::partition(),
            json!(":ecr:"),
            app.region(scope)?,
            json!(":"),
            app.account(scope)?,
            json!(format!(":repository/{}", repository)),
        ],
    ))
}

fn application_container(
    app: &App,
    scope: NodeId,
    container: &ContainerDefinition,
    props: &ServiceProps,
    bucket: &BucketReference,
    log_group: &ResourceHandle,
) -> PatternResult<Value> {
    let network_mode = props.task_definition.network_mode;
    let mut definition = json!({
        "Name": container.name,
        "Image": container_image(app, scope, container)?,
        "Essential": container.essential,
        "Cpu": container.cpu,
        "Memory": container.memory,
        "EnvironmentFiles": [{
            "Type": "s3",
            "Value": intrinsics::join(
                "",
                vec![
                    json!("arn:"),
                    Aws::partition(),
                    json!(":s3:::"),
                    bucket.bucket_name.clone(),
                    json!(format!("/{}", container.environment_file_object_key)),
                ],
            ),
        }],
        "LogConfiguration": log_configuration(app, scope, log_group, &container.name)?,
        "PortMappings": container
            .port_mappings
            .iter()
            .map(|m| port_mapping(network_mode, m.container_port, m.protocol))
            .collect::<Vec<_>>(),
    });
    if !container.command.is_empty() {
        definition["Command"] = json!(container.command);
    }
    if !container.entry_point.is_empty() {
        definition["EntryPoint"] = json!(container.entry_point);
    }
    if !container.mount_points.is_empty() {
        definition["MountPoints"] = container
            .mount_points
            .iter()
            .map(|m| {
                json!({
                    "ContainerPath": m.container_path,
                    "ReadOnly": m.read_only,
                    "SourceVolume": m.source_volume,
                })
            })
            .collect();
    }
    if props.tracing_enabled {
        if network_mode != NetworkMode::Bridge {
            warn!(
                "Container {} links to {} but links only work in bridge mode",
                container.name, OTEL_CONTAINER_NAME
            );
        }
        definition["Links"] = json!([format!("{0}:{0}", OTEL_CONTAINER_NAME)]);
        definition["DependsOn"] =
            json!([{ "Condition": "START", "ContainerName": OTEL_CONTAINER_NAME }]);
    }
    Ok(definition)
}

fn volume_definition(volume: &Volume) -> Value {
    json!({
        "Name": volume.name,
        "DockerVolumeConfiguration": {
            "Autoprovision": true,
            "Driver": VOLUME_DRIVER,
            "DriverOpts": { "size": volume.size.to_string(), "volumetype": VOLUME_TYPE },
            "Scope": "shared",
        },
    })
}

fn create_service_security_group(
    app: &mut App,
    scope: NodeId,
    props: &ServiceProps,
    vpc: &Vpc,
) -> PatternResult<SecurityGroup> {
    let group = create_security_group(
        app,
        scope,
        "ServiceSecurityGroup",
        vpc,
        &SecurityGroupProps {
            allow_all_outbound: true,
            ..Default::default()
        },
    )?;

    let port = match &props.service_discovery {
        Some(discovery) => Some(discovery.service_port),
        None => props
            .task_definition
            .containers
            .first()
            .and_then(|c| c.port_mappings.first())
            .map(|m| m.container_port),
    };
    if let Some(port) = port {
        add_ingress_rule(
            app,
            &group,
            &Peer::AnyIpv4,
            Port::Tcp(port),
            &format!("from 0.0.0.0/0:{}", port),
        )?;
    }
    Ok(group)
}

/// Create the `AWS::ECS::Service` for an assembled task.
pub(crate) fn create_service(
    app: &mut App,
    scope: NodeId,
    props: &ServiceProps,
    env: &ServiceEnvironment,
    task: TaskAssembly,
    load_balancers: Vec<Value>,
) -> PatternResult<ServiceResources> {
    let strategies: Vec<Value> = props
        .capacity_providers
        .iter()
        .map(|name| json!({ "Base": 0, "CapacityProvider": name, "Weight": 1 }))
        .collect();

    let mut properties = json!({
        "Cluster": env.cluster_name,
        "CapacityProviderStrategy": strategies,
        "DeploymentConfiguration": {
            "DeploymentCircuitBreaker": { "Enable": true, "Rollback": true },
            "MaximumPercent": 200,
            "MinimumHealthyPercent": 50,
        },
        "DesiredCount": props.desired_count,
        "EnableECSManagedTags": true,
        "PlacementStrategies": [{ "Field": "memory", "Type": "binpack" }],
        "PropagateTags": "SERVICE",
        "SchedulingStrategy": "REPLICA",
        "TaskDefinition": task.task_definition.ref_value(),
    });
    if let Some(discovery) = &task.discovery_service {
        properties["ServiceRegistries"] = json!([{ "RegistryArn": discovery.get_att("Arn") }]);
    }
    if let Some(group) = &task.security_group {
        properties["NetworkConfiguration"] = json!({
            "AwsvpcConfiguration": {
                "AssignPublicIp": "DISABLED",
                "SecurityGroups": [group.resource.get_att("GroupId")],
                "Subnets": env.vpc.select_subnets(SubnetType::Private),
            },
        });
    }
    if !load_balancers.is_empty() {
        properties["LoadBalancers"] = Value::Array(load_balancers);
    }

    let service = app.add_resource(scope, "Service", "AWS::ECS::Service", properties)?;
    debug!("Created service {}", service.logical_id);

    Ok(ServiceResources {
        scope,
        execution_role: task.execution_role,
        task_role: task.task_role,
        log_group: task.log_group,
        task_definition: task.task_definition,
        security_group: task.security_group,
        discovery_service: task.discovery_service,
        service,
    })
}
