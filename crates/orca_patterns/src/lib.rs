//! # orca_patterns
//!
//! ECS container deployment patterns for Orca.
//!
//! This crate provides:
//! - Container compute: cluster, ASG and Fargate capacity providers, load
//!   balancer, environment-file bucket and Cloud Map namespace
//! - Load-balanced and non load-balanced EC2 services
//! - A project orchestrator wiring network, compute and services across
//!   nested stacks
//! - YAML/TOML deployment configuration
//!
//! ## Example
//!
//! ```ignore
//! use orca_core::{App, Environment, StackProps};
//! use orca_patterns::{EcsProject, EcsProjectProps};
//!
//! let mut app = App::default();
//! let stack = app.add_stack("Demo", StackProps {
//!     env: Some(Environment::new("123456789012", "us-east-1")),
//!     ..Default::default()
//! })?;
//! let project = EcsProject::build(&mut app, stack, "EcsProject", &EcsProjectProps::default())?;
//! let assembly = app.synth()?;
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod iam;
pub mod project;
pub mod service;
pub mod user_data;

pub use compute::{
    AsgCapacityProviderOptions, AsgOptions, BucketOptions, CapacityProviderOptions,
    ClusterOptions, ComputeProps, ContainerCompute, InstanceClass, InstanceSize,
    LoadBalancerOptions, NamespaceOptions,
};
pub use config::{AppSettings, Deployment, DeploymentConfig};
pub use error::{PatternError, PatternResult};
pub use iam::{Effect, PolicyDocument, PolicyStatement};
pub use project::{EcsProject, EcsProjectProps};
pub use service::{
    ContainerDefinition, ListenerRuleOptions, LoadBalancedService, LoadBalancedServiceProps,
    LoadBalancerTarget, MountPoint, NetworkMode, NonLoadBalancedService, PortMapping, Protocol,
    RegistryType, ServiceDiscoveryOptions, ServiceEnvironment, ServiceLoadBalancerOptions,
    ServiceProps, ServiceResources, TaskDefinitionOptions, Volume,
};
