//! Project orchestration: network, compute and services wired across
//! nested stacks.
//!
//! Layout of a project built under stack `S`:
//!
//! ```text
//! S
//! └── <id>
//!     ├── Network                          (VPC lookup, no resources)
//!     └── ComputeStack                     (nested)
//!         ├── EcsCompute
//!         ├── NonLoadBalancedServicesStack (nested, optional)
//!         └── LoadBalancedServicesStack    (nested, optional)
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use orca_core::{App, NestedStackProps, NodeId};
use orca_network::{lookup_vpc, Vpc, VpcProps};

use crate::compute::{ComputeProps, ContainerCompute};
use crate::error::{PatternError, PatternResult};
use crate::service::{
    check_service_discovery, check_task_definition, LoadBalancedService, LoadBalancedServiceProps,
    NonLoadBalancedService, ServiceProps,
};

const COMPUTE_STACK_DESCRIPTION: &str =
    "Cloudformation stack for handling Container based compute resources";
const NON_LOAD_BALANCED_STACK_DESCRIPTION: &str =
    "Cloudformation stack for handling non load-balanced ECS services (applications)";
const LOAD_BALANCED_STACK_DESCRIPTION: &str =
    "Cloudformation stack for handling Load Balanced ECS services (applications)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsProjectProps {
    pub network: VpcProps,
    pub compute: ComputeProps,
    pub non_load_balanced_services: Vec<ServiceProps>,
    pub load_balanced_services: Vec<LoadBalancedServiceProps>,
}

impl EcsProjectProps {
    /// Check cross-cutting requirements before anything is added to the tree.
    pub fn validate(&self) -> PatternResult<()> {
        let has_namespace = self.compute.namespace.is_some();

        for (index, service) in self.non_load_balanced_services.iter().enumerate() {
            let name = format!("NonLoadBalancedService{}", index);
            check_service_discovery(&name, service, has_namespace)?;
            check_task_definition(&name, service)?;
        }
        for (index, service) in self.load_balanced_services.iter().enumerate() {
            let name = format!("LoadBalancedService{}", index);
            if self.compute.load_balancer.is_none() {
                return Err(PatternError::MissingListener(name));
            }
            check_service_discovery(&name, &service.service, has_namespace)?;
            check_task_definition(&name, &service.service)?;
        }
        Ok(())
    }
}

/// A built project.
#[derive(Debug, Clone)]
pub struct EcsProject {
    pub scope: NodeId,
    pub vpc: Vpc,
    pub compute_stack: NodeId,
    pub compute: ContainerCompute,
    pub non_load_balanced_stack: Option<NodeId>,
    pub load_balanced_stack: Option<NodeId>,
    pub non_load_balanced_services: Vec<NonLoadBalancedService>,
    pub load_balanced_services: Vec<LoadBalancedService>,
}

impl EcsProject {
    pub fn build(
        app: &mut App,
        scope: NodeId,
        id: &str,
        props: &EcsProjectProps,
    ) -> PatternResult<Self> {
        props.validate()?;

        let this = app.add_construct(scope, id)?;
        info!("Building ECS project {}", app.path(this));

        let network = app.add_construct(this, "Network")?;
        let vpc = lookup_vpc(app, network, &props.network)?;

        let compute_stack = app.add_nested_stack(
            this,
            "ComputeStack",
            NestedStackProps {
                description: Some(COMPUTE_STACK_DESCRIPTION.to_string()),
            },
        )?;
        let compute = ContainerCompute::build(app, compute_stack, "EcsCompute", &props.compute, &vpc)?;
        let default_providers: Vec<String> = compute
            .capacity_provider_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut non_load_balanced_stack = None;
        let mut non_load_balanced_services = Vec::new();
        if !props.non_load_balanced_services.is_empty() {
            let stack = app.add_nested_stack(
                compute_stack,
                "NonLoadBalancedServicesStack",
                NestedStackProps {
                    description: Some(NON_LOAD_BALANCED_STACK_DESCRIPTION.to_string()),
                },
            )?;
            if let Some(association) = &compute.capacity_provider_association {
                app.add_dependency(stack, association.node)?;
            }

            let env = compute.service_environment(app, stack)?;
            for (index, service) in props.non_load_balanced_services.iter().enumerate() {
                let service = with_default_providers(service, &default_providers);
                non_load_balanced_services.push(NonLoadBalancedService::build(
                    app,
                    stack,
                    &format!("NonLoadBalancedService{}", index),
                    &service,
                    &env,
                )?);
            }
            non_load_balanced_stack = Some(stack);
        }

        let mut load_balanced_stack = None;
        let mut load_balanced_services = Vec::new();
        if !props.load_balanced_services.is_empty() {
            let stack = app.add_nested_stack(
                compute_stack,
                "LoadBalancedServicesStack",
                NestedStackProps {
                    description: Some(LOAD_BALANCED_STACK_DESCRIPTION.to_string()),
                },
            )?;
            if let Some(association) = &compute.capacity_provider_association {
                app.add_dependency(stack, association.node)?;
            }
            if let Some(previous) = non_load_balanced_stack {
                info!("Load-balanced services wait for non load-balanced services to start");
                app.add_dependency(stack, previous)?;
            }

            let env = compute.service_environment(app, stack)?;
            for (index, service) in props.load_balanced_services.iter().enumerate() {
                let mut service = service.clone();
                service.service = with_default_providers(&service.service, &default_providers);
                load_balanced_services.push(LoadBalancedService::build(
                    app,
                    stack,
                    &format!("LoadBalancedService{}", index),
                    &service,
                    &env,
                )?);
            }
            load_balanced_stack = Some(stack);
        }

        Ok(Self {
            scope: this,
            vpc,
            compute_stack,
            compute,
            non_load_balanced_stack,
            load_balanced_stack,
            non_load_balanced_services,
            load_balanced_services,
        })
    }

    /// Every service stack, non load-balanced first.
    pub fn service_stacks(&self) -> Vec<NodeId> {
        self.non_load_balanced_stack
            .into_iter()
            .chain(self.load_balanced_stack)
            .collect()
    }
}

/// Services without explicit capacity providers run on every ASG provider of
/// the compute.
fn with_default_providers(service: &ServiceProps, providers: &[String]) -> ServiceProps {
    let mut service = service.clone();
    if service.capacity_providers.is_empty() {
        service.capacity_providers = providers.to_vec();
    }
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::LoadBalancerOptions;
    use crate::service::{ContainerDefinition, MountPoint, NetworkMode, ServiceDiscoveryOptions};

    fn service_with_container() -> ServiceProps {
        let mut service = ServiceProps::default();
        service.task_definition.containers = vec![ContainerDefinition {
            name: "app".to_string(),
            image: "app".to_string(),
            ..Default::default()
        }];
        service
    }

    #[test]
    fn test_validate_requires_load_balancer() {
        let props = EcsProjectProps {
            load_balanced_services: vec![LoadBalancedServiceProps {
                service: service_with_container(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(props.validate(), Err(PatternError::MissingListener(_))));

        let props = EcsProjectProps {
            compute: ComputeProps {
                load_balancer: Some(LoadBalancerOptions::default()),
                ..Default::default()
            },
            ..props
        };
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_namespace_for_discovery() {
        let mut service = ServiceProps {
            service_discovery: Some(ServiceDiscoveryOptions {
                service_name: "db".to_string(),
                service_port: 5432,
            }),
            ..Default::default()
        };
        service.task_definition.network_mode = NetworkMode::AwsVpc;

        let props = EcsProjectProps {
            non_load_balanced_services: vec![service],
            ..Default::default()
        };
        assert!(matches!(props.validate(), Err(PatternError::MissingNamespace(name)) if name == "NonLoadBalancedService0"));
    }

    #[test]
    fn test_validate_rejects_undeclared_mount_volume() {
        let mut service = service_with_container();
        service.task_definition.containers[0].mount_points = vec![MountPoint {
            source_volume: "missing".to_string(),
            container_path: "/data".to_string(),
            read_only: true,
        }];

        let props = EcsProjectProps {
            non_load_balanced_services: vec![service],
            ..Default::default()
        };
        assert!(matches!(props.validate(), Err(PatternError::InvalidConfig(_))));
    }

    #[test]
    fn test_default_providers_only_fill_empty_lists() {
        let providers = vec!["Main".to_string()];
        let filled = with_default_providers(&ServiceProps::default(), &providers);
        assert_eq!(filled.capacity_providers, providers);

        let explicit = ServiceProps {
            capacity_providers: vec!["Other".to_string()],
            ..Default::default()
        };
        assert_eq!(
            with_default_providers(&explicit, &providers).capacity_providers,
            vec!["Other".to_string()]
        );
    }
}
