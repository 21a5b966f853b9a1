//! Container compute: ECS cluster, capacity providers, load balancer,
//! environment-file bucket and Cloud Map namespace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use orca_core::intrinsics;
use orca_core::logical_id::sanitize;
use orca_core::{App, NodeId, RemovalPolicy, ResourceHandle};
use orca_network::{
    add_ingress_rule, create_security_group, Peer, Port, SecurityGroup, SecurityGroupProps,
    SubnetType, Vpc,
};

use crate::error::PatternResult;
use crate::iam::{self, PolicyDocument, PolicyStatement, RoleProps};
use crate::service::{BucketReference, ListenerReference, NamespaceReference, ServiceEnvironment};
use crate::user_data::ecs_instance_bootstrap;

/// EBS volume actions granted to container instances.
const EC2_VOLUME_ACTIONS: [&str; 12] = [
    "ec2:AttachVolume",
    "ec2:CreateVolume",
    "ec2:DeleteVolume",
    "ec2:DescribeAvailabilityZones",
    "ec2:DescribeInstances",
    "ec2:DescribeVolumes",
    "ec2:DescribeVolumeAttribute",
    "ec2:DetachVolume",
    "ec2:DescribeVolumeStatus",
    "ec2:ModifyVolumeAttribute",
    "ec2:DescribeTags",
    "ec2:CreateTags",
];

const ECS_AMI_PARAMETER: &str =
    "/aws/service/ami-amazon-linux-latest/amzn2-ami-kernel-5.10-hvm-x86_64-gp2";

const LOAD_BALANCER_IDLE_TIMEOUT_SECONDS: u32 = 120;
const DEFAULT_TARGET_GROUP_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub name: String,
    pub container_insights: bool,
    pub asg_capacity_provider_enabled: bool,
    pub fargate_capacity_provider_enabled: bool,
}

/// EC2 instance families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceClass {
    #[default]
    #[serde(rename = "t2")]
    Burstable2,
    #[serde(rename = "t3")]
    Burstable3,
    #[serde(rename = "t3a")]
    Burstable3Amd,
    #[serde(rename = "m5")]
    Standard5,
    #[serde(rename = "c5")]
    Compute5,
    #[serde(rename = "r5")]
    Memory5,
}

impl InstanceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceClass::Burstable2 => "t2",
            InstanceClass::Burstable3 => "t3",
            InstanceClass::Burstable3Amd => "t3a",
            InstanceClass::Standard5 => "m5",
            InstanceClass::Compute5 => "c5",
            InstanceClass::Memory5 => "r5",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    Nano,
    #[default]
    Micro,
    Small,
    Medium,
    Large,
    Xlarge,
    #[serde(rename = "2xlarge")]
    Xlarge2,
}

impl InstanceSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::Nano => "nano",
            InstanceSize::Micro => "micro",
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
            InstanceSize::Xlarge => "xlarge",
            InstanceSize::Xlarge2 => "2xlarge",
        }
    }
}

/// Instance type string such as `t2.micro`.
pub fn instance_type(class: InstanceClass, size: InstanceSize) -> String {
    format!("{}.{}", class.as_str(), size.as_str())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsgOptions {
    pub name: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_capacity: Option<u32>,
    pub ssh_key_name: Option<String>,
    pub instance_class: InstanceClass,
    pub instance_size: InstanceSize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityProviderOptions {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsgCapacityProviderOptions {
    pub auto_scaling_group: AsgOptions,
    pub capacity_provider: CapacityProviderOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketOptions {
    pub name: String,
    pub versioned: bool,
    pub auto_delete_objects: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerOptions {
    pub name: String,
    pub listener_certificate_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceOptions {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeProps {
    pub cluster: ClusterOptions,
    pub asg_capacity_providers: Vec<AsgCapacityProviderOptions>,
    pub environment_file_bucket: BucketOptions,
    pub load_balancer: Option<LoadBalancerOptions>,
    pub namespace: Option<NamespaceOptions>,
}

/// An ASG-backed capacity provider and the resources behind it.
#[derive(Debug, Clone)]
pub struct AsgCapacityProvider {
    pub name: String,
    pub role: ResourceHandle,
    pub security_group: SecurityGroup,
    pub auto_scaling_group: ResourceHandle,
    pub capacity_provider: ResourceHandle,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerResources {
    pub security_group: SecurityGroup,
    pub load_balancer: ResourceHandle,
    pub default_target_group: ResourceHandle,
    pub https_listener: ResourceHandle,
    pub http_listener: ResourceHandle,
}

#[derive(Debug, Clone)]
pub struct NamespaceResources {
    pub name: String,
    pub namespace: ResourceHandle,
}

/// Everything the compute builder created.
#[derive(Debug, Clone)]
pub struct ContainerCompute {
    pub scope: NodeId,
    pub vpc: Vpc,
    pub cluster: ResourceHandle,
    pub cluster_security_groups: Vec<SecurityGroup>,
    pub asg_capacity_providers: Vec<AsgCapacityProvider>,
    pub capacity_provider_association: Option<ResourceHandle>,
    pub environment_file_bucket: ResourceHandle,
    pub load_balancer: Option<LoadBalancerResources>,
    pub namespace: Option<NamespaceResources>,
}

impl ContainerCompute {
    pub fn build(
        app: &mut App,
        scope: NodeId,
        id: &str,
        props: &ComputeProps,
        vpc: &Vpc,
    ) -> PatternResult<Self> {
        let this = app.add_construct(scope, id)?;
        info!("Building container compute {}", app.path(this));

        let cluster = create_cluster(app, this, &props.cluster)?;

        let mut asg_capacity_providers = Vec::new();
        if props.cluster.asg_capacity_provider_enabled {
            for options in &props.asg_capacity_providers {
                let provider =
                    create_asg_capacity_provider(app, this, options, &cluster, vpc)?;
                asg_capacity_providers.push(provider);
            }
        }
        let cluster_security_groups = asg_capacity_providers
            .iter()
            .map(|p| p.security_group.clone())
            .collect();

        let capacity_provider_association = create_capacity_provider_association(
            app,
            this,
            &cluster,
            props.cluster.fargate_capacity_provider_enabled,
            &asg_capacity_providers,
        )?;

        let environment_file_bucket =
            create_environment_file_bucket(app, this, &props.environment_file_bucket)?;

        let load_balancer = match &props.load_balancer {
            Some(options) => Some(create_load_balancer(app, this, options, vpc)?),
            None => None,
        };

        let namespace = match &props.namespace {
            Some(options) => Some(create_namespace(app, this, options, vpc)?),
            None => None,
        };

        Ok(Self {
            scope: this,
            vpc: vpc.clone(),
            cluster,
            cluster_security_groups,
            asg_capacity_providers,
            capacity_provider_association,
            environment_file_bucket,
            load_balancer,
            namespace,
        })
    }

    /// Names of the ASG capacity providers, in configuration order.
    pub fn capacity_provider_names(&self) -> Vec<&str> {
        self.asg_capacity_providers
            .iter()
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Values a service built under `consumer` needs from this compute.
    ///
    /// Every value is resolved into the consumer's stack, so services may
    /// live in nested stacks below the compute stack.
    pub fn service_environment(
        &self,
        app: &mut App,
        consumer: NodeId,
    ) -> PatternResult<ServiceEnvironment> {
        let cluster_name = app.resolve(consumer, &self.cluster.reference())?;

        let mut cluster_security_group_ids = Vec::new();
        for group in &self.cluster_security_groups {
            cluster_security_group_ids.push(app.resolve(consumer, &group.group_id())?);
        }

        let environment_file_bucket = BucketReference {
            bucket_name: app.resolve(consumer, &self.environment_file_bucket.reference())?,
            bucket_arn: app.resolve(consumer, &self.environment_file_bucket.attribute("Arn"))?,
        };

        let namespace = match &self.namespace {
            Some(ns) => Some(NamespaceReference {
                id: app.resolve(consumer, &ns.namespace.attribute("Id"))?,
                name: json!(ns.name),
                arn: app.resolve(consumer, &ns.namespace.attribute("Arn"))?,
            }),
            None => None,
        };

        let listener = match &self.load_balancer {
            Some(lb) => Some(ListenerReference {
                listener_arn: app.resolve(consumer, &lb.https_listener.reference())?,
                security_group_id: app.resolve(consumer, &lb.security_group.group_id())?,
            }),
            None => None,
        };

        Ok(ServiceEnvironment {
            cluster_name,
            vpc: self.vpc.clone(),
            cluster_security_group_ids,
            environment_file_bucket,
            namespace,
            listener,
        })
    }
}

fn create_cluster(app: &mut App, scope: NodeId, options: &ClusterOptions) -> PatternResult<ResourceHandle> {
    let insights = if options.container_insights {
        "enabled"
    } else {
        "disabled"
    };
    let mut properties = json!({
        "ClusterSettings": [{ "Name": "containerInsights", "Value": insights }],
    });
    if !options.name.is_empty() {
        properties["ClusterName"] = json!(options.name);
    }
    Ok(app.add_resource(scope, "EcsCluster", "AWS::ECS::Cluster", properties)?)
}

fn create_asg_capacity_provider(
    app: &mut App,
    scope: NodeId,
    options: &AsgCapacityProviderOptions,
    cluster: &ResourceHandle,
    vpc: &Vpc,
) -> PatternResult<AsgCapacityProvider> {
    let asg = &options.auto_scaling_group;
    debug!("Creating auto scaling group {}", asg.name);

    let mut inline_policies = BTreeMap::new();
    inline_policies.insert(
        "Ec2VolumeAccess".to_string(),
        PolicyDocument::new(vec![PolicyStatement::allow(&EC2_VOLUME_ACTIONS, vec![json!("*")])]),
    );
    let role = iam::create_role(
        app,
        scope,
        &format!("IamRole{}", asg.name),
        &RoleProps {
            assumed_by: "ec2.amazonaws.com".to_string(),
            role_name: Some(format!("{}InstanceProfileRole", asg.name)),
            description: Some(format!("Iam role for autoscaling group {}", asg.name)),
            inline_policies,
            managed_policy_arns: vec![iam::managed_policy_arn("AmazonSSMManagedInstanceCore")],
        },
    )?;
    iam::attach_policy(app, &role, &ecs_instance_policy(cluster))?;

    let security_group = create_security_group(
        app,
        scope,
        &format!("{}SecurityGroup", asg.name),
        vpc,
        &SecurityGroupProps {
            name: Some(format!("{}SecurityGroup", asg.name)),
            description: Some(format!("SecurityGroup for {}", asg.name)),
            allow_all_outbound: true,
        },
    )?;

    let group = app.add_construct(scope, &format!("{}AutoscalingGroup", asg.name))?;
    let instance_profile = app.add_resource(
        group,
        "InstanceProfile",
        "AWS::IAM::InstanceProfile",
        json!({ "Roles": [role.ref_value()] }),
    )?;

    let stack = app.stack_of(scope)?;
    let ami_parameter = format!("SsmParameterValue{}", sanitize(ECS_AMI_PARAMETER));
    app.add_parameter(
        stack,
        &ami_parameter,
        json!({
            "Type": "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>",
            "Default": ECS_AMI_PARAMETER,
        }),
    )?;

    let user_data = ecs_instance_bootstrap(cluster.ref_value());
    let mut launch_properties = json!({
        "ImageId": intrinsics::reference(&ami_parameter),
        "InstanceType": instance_type(asg.instance_class, asg.instance_size),
        "IamInstanceProfile": instance_profile.ref_value(),
        "SecurityGroups": [security_group.resource.get_att("GroupId")],
        "UserData": user_data.to_base64(),
    });
    if let Some(key) = &asg.ssh_key_name {
        launch_properties["KeyName"] = json!(key);
    }
    let launch_config = app.add_resource(
        group,
        "LaunchConfig",
        "AWS::AutoScaling::LaunchConfiguration",
        launch_properties,
    )?;
    app.add_dependency(launch_config.node, role.node)?;

    let mut asg_properties = json!({
        "AutoScalingGroupName": asg.name,
        "MinSize": asg.min_capacity.to_string(),
        "MaxSize": asg.max_capacity.to_string(),
        "LaunchConfigurationName": launch_config.ref_value(),
        "VPCZoneIdentifier": vpc.select_subnets(SubnetType::Public),
    });
    if let Some(desired) = asg.desired_capacity {
        asg_properties["DesiredCapacity"] = json!(desired.to_string());
    }
    let auto_scaling_group = app.add_resource(
        group,
        "ASG",
        "AWS::AutoScaling::AutoScalingGroup",
        asg_properties,
    )?;

    let provider_name = &options.capacity_provider.name;
    let capacity_provider = app.add_resource(
        scope,
        &format!("{}AsgCapacityProvider", provider_name),
        "AWS::ECS::CapacityProvider",
        json!({
            "AutoScalingGroupProvider": {
                "AutoScalingGroupArn": auto_scaling_group.ref_value(),
                "ManagedScaling": { "Status": "ENABLED", "TargetCapacity": 100 },
                "ManagedTerminationProtection": "DISABLED",
            },
            "Name": provider_name,
        }),
    )?;

    Ok(AsgCapacityProvider {
        name: provider_name.clone(),
        role,
        security_group,
        auto_scaling_group,
        capacity_provider,
    })
}

/// Permissions an instance needs to register with and serve `cluster`.
fn ecs_instance_policy(cluster: &ResourceHandle) -> PolicyDocument {
    let cluster_arn = cluster.get_att("Arn");
    PolicyDocument::new(vec![
        PolicyStatement::allow(
            &[
                "ecs:DeregisterContainerInstance",
                "ecs:RegisterContainerInstance",
                "ecs:Submit*",
            ],
            vec![cluster_arn.clone()],
        ),
        PolicyStatement::allow(&["ecs:Poll", "ecs:StartTelemetrySession"], vec![json!("*")])
            .with_condition(json!({ "ArnEquals": { "ecs:cluster": cluster_arn } })),
        PolicyStatement::allow(
            &[
                "ecs:DiscoverPollEndpoint",
                "ecr:GetAuthorizationToken",
                "logs:CreateLogStream",
                "logs:PutLogEvents",
            ],
            vec![json!("*")],
        ),
    ])
}

fn create_capacity_provider_association(
    app: &mut App,
    scope: NodeId,
    cluster: &ResourceHandle,
    fargate_enabled: bool,
    providers: &[AsgCapacityProvider],
) -> PatternResult<Option<ResourceHandle>> {
    if !fargate_enabled && providers.is_empty() {
        return Ok(None);
    }

    let mut capacity_providers = Vec::new();
    if fargate_enabled {
        capacity_providers.push(json!("FARGATE"));
        capacity_providers.push(json!("FARGATE_SPOT"));
    }
    capacity_providers.extend(providers.iter().map(|p| p.capacity_provider.ref_value()));

    let association = app.add_resource(
        scope,
        "EcsClusterCapacityProviderAssociations",
        "AWS::ECS::ClusterCapacityProviderAssociations",
        json!({
            "Cluster": cluster.ref_value(),
            "CapacityProviders": capacity_providers,
            "DefaultCapacityProviderStrategy": [],
        }),
    )?;
    Ok(Some(association))
}

fn create_environment_file_bucket(
    app: &mut App,
    scope: NodeId,
    options: &BucketOptions,
) -> PatternResult<ResourceHandle> {
    let mut properties = json!({});
    if !options.name.is_empty() {
        properties["BucketName"] = json!(options.name);
    }
    if options.versioned {
        properties["VersioningConfiguration"] = json!({ "Status": "Enabled" });
    }
    if options.auto_delete_objects {
        properties["Tags"] = json!([{ "Key": "orca:auto-delete-objects", "Value": "true" }]);
    }

    let bucket = app.add_resource(scope, "EnvironmentFileBucket", "AWS::S3::Bucket", properties)?;

    if options.auto_delete_objects {
        app.resource_mut(&bucket)?
            .apply_removal_policy(RemovalPolicy::Destroy);
        enable_auto_delete_objects(app, scope, &bucket)?;
    } else {
        app.resource_mut(&bucket)?
            .apply_removal_policy(RemovalPolicy::Retain);
    }
    Ok(bucket)
}

const AUTO_DELETE_PROVIDER: &str = "CustomS3AutoDeleteObjectsCustomResourceProvider";
pub const AUTO_DELETE_BUCKET_PARAMETER: &str = "AutoDeleteObjectsHandlerS3Bucket";
pub const AUTO_DELETE_KEY_PARAMETER: &str = "AutoDeleteObjectsHandlerS3Key";

/// Empty the bucket on stack deletion through a custom resource.
///
/// The provider function is shared per stack. Its code package is an
/// external asset, located through two parameters declared on the
/// top-level stack.
fn enable_auto_delete_objects(
    app: &mut App,
    scope: NodeId,
    bucket: &ResourceHandle,
) -> PatternResult<()> {
    let (provider_role, handler) = auto_delete_provider(app, scope)?;

    let bucket_arn = bucket.get_att("Arn");
    let policy = PolicyDocument::new(vec![PolicyStatement::allow(
        &["s3:DeleteObject*", "s3:GetBucket*", "s3:List*"],
        vec![
            bucket_arn.clone(),
            intrinsics::join("", vec![bucket_arn, json!("/*")]),
        ],
    )
    .with_principal(json!({ "AWS": provider_role.get_att("Arn") }))]);

    let bucket_policy = app.add_resource(
        scope,
        "EnvironmentFileBucketPolicy",
        "AWS::S3::BucketPolicy",
        json!({ "Bucket": bucket.ref_value(), "PolicyDocument": policy.to_json() }),
    )?;

    let auto_delete = app.add_resource(
        scope,
        "EnvironmentFileBucketAutoDeleteObjects",
        "Custom::S3AutoDeleteObjects",
        json!({
            "ServiceToken": handler.get_att("Arn"),
            "BucketName": bucket.ref_value(),
        }),
    )?;
    app.resource_mut(&auto_delete)?
        .apply_removal_policy(RemovalPolicy::Destroy);
    app.add_dependency(auto_delete.node, bucket_policy.node)?;
    Ok(())
}

fn auto_delete_provider(
    app: &mut App,
    scope: NodeId,
) -> PatternResult<(ResourceHandle, ResourceHandle)> {
    let stack = app.stack_of(scope)?;
    let role_id = format!("{}Role", AUTO_DELETE_PROVIDER);
    let handler_id = format!("{}Handler", AUTO_DELETE_PROVIDER);

    if let (Some(role), Some(handler)) = (
        app.find_child(stack, &role_id),
        app.find_child(stack, &handler_id),
    ) {
        return Ok((app.resource_handle(role)?, app.resource_handle(handler)?));
    }

    let role = iam::create_role(
        app,
        stack,
        &role_id,
        &RoleProps {
            assumed_by: "lambda.amazonaws.com".to_string(),
            managed_policy_arns: vec![iam::managed_policy_arn(
                "service-role/AWSLambdaBasicExecutionRole",
            )],
            ..Default::default()
        },
    )?;

    // Supplied at deploy time, so nested stacks get them from the top level
    let code_bucket = app.add_deploy_parameter(
        stack,
        AUTO_DELETE_BUCKET_PARAMETER,
        json!({ "Type": "String", "Description": "S3 bucket holding the auto-delete handler package" }),
    )?;
    let code_key = app.add_deploy_parameter(
        stack,
        AUTO_DELETE_KEY_PARAMETER,
        json!({ "Type": "String", "Description": "S3 key of the auto-delete handler package" }),
    )?;

    let handler = app.add_resource(
        stack,
        &handler_id,
        "AWS::Lambda::Function",
        json!({
            "Code": {
                "S3Bucket": code_bucket,
                "S3Key": code_key,
            },
            "Handler": "index.handler",
            "MemorySize": 128,
            "Role": role.get_att("Arn"),
            "Runtime": "nodejs18.x",
            "Timeout": 900,
        }),
    )?;
    app.add_dependency(handler.node, role.node)?;
    Ok((role, handler))
}

fn create_load_balancer(
    app: &mut App,
    scope: NodeId,
    options: &LoadBalancerOptions,
    vpc: &Vpc,
) -> PatternResult<LoadBalancerResources> {
    info!("Creating application load balancer {}", options.name);

    let security_group = create_security_group(
        app,
        scope,
        &format!("{}SecurityGroup", options.name),
        vpc,
        &SecurityGroupProps {
            name: Some(format!("{}SecurityGroup", options.name)),
            description: Some(format!("Security group for {}", options.name)),
            allow_all_outbound: true,
        },
    )?;
    add_ingress_rule(app, &security_group, &Peer::AnyIpv4, Port::Tcp(443), "Default HTTPS Port")?;
    add_ingress_rule(app, &security_group, &Peer::AnyIpv4, Port::Tcp(80), "Default HTTP Port")?;

    let load_balancer = app.add_resource(
        scope,
        "LoadBalancerSetup",
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        json!({
            "Name": options.name,
            "Type": "application",
            "Scheme": "internet-facing",
            "IpAddressType": "ipv4",
            "Subnets": vpc.select_subnets(SubnetType::Public),
            "SecurityGroups": [security_group.resource.get_att("GroupId")],
            "LoadBalancerAttributes": [
                { "Key": "deletion_protection.enabled", "Value": "false" },
                { "Key": "idle_timeout.timeout_seconds", "Value": LOAD_BALANCER_IDLE_TIMEOUT_SECONDS.to_string() },
            ],
        }),
    )?;

    let default_target_group = app.add_resource(
        scope,
        "DefaultTargetGroup",
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        json!({
            "Name": format!("{}DefaultTargetGroup", options.name),
            "Port": DEFAULT_TARGET_GROUP_PORT,
            "Protocol": "HTTP",
            "TargetType": "instance",
            "VpcId": vpc.vpc_id,
            "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
        }),
    )?;

    let https_listener = app.add_resource(
        scope,
        "LoadbalancerHttpsListener",
        "AWS::ElasticLoadBalancingV2::Listener",
        json!({
            "LoadBalancerArn": load_balancer.ref_value(),
            "Port": 443,
            "Protocol": "HTTPS",
            "Certificates": [{ "CertificateArn": options.listener_certificate_arn }],
            "DefaultActions": [{
                "TargetGroupArn": default_target_group.ref_value(),
                "Type": "forward",
            }],
        }),
    )?;

    let http_listener = app.add_resource(
        scope,
        "LoadbalancerHttpListener",
        "AWS::ElasticLoadBalancingV2::Listener",
        json!({
            "LoadBalancerArn": load_balancer.ref_value(),
            "Port": 80,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "RedirectConfig": {
                    "Host": "#{host}",
                    "Path": "/#{path}",
                    "Port": "443",
                    "Protocol": "HTTPS",
                    "Query": "#{query}",
                    "StatusCode": "HTTP_301",
                },
                "Type": "redirect",
            }],
        }),
    )?;

    Ok(LoadBalancerResources {
        security_group,
        load_balancer,
        default_target_group,
        https_listener,
        http_listener,
    })
}

fn create_namespace(
    app: &mut App,
    scope: NodeId,
    options: &NamespaceOptions,
    vpc: &Vpc,
) -> PatternResult<NamespaceResources> {
    let mut properties = json!({
        "Name": options.name,
        "Vpc": vpc.vpc_id,
    });
    if let Some(description) = &options.description {
        properties["Description"] = json!(description);
    }
    let namespace = app.add_resource(
        scope,
        "CloudMapNamespace",
        "AWS::ServiceDiscovery::PrivateDnsNamespace",
        properties,
    )?;
    Ok(NamespaceResources {
        name: options.name.clone(),
        namespace,
    })
}
