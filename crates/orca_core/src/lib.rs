//! # orca_core
//!
//! Construct substrate for Orca.
//!
//! This crate provides:
//! - A construct tree ([`App`]) holding stacks, nested stacks and resources
//! - Logical id generation and CloudFormation intrinsic helpers
//! - Context lookups with missing-key reporting
//! - Synthesis into a cloud assembly of templates plus a manifest
//! - Template assertions for tests

pub mod app;
pub mod assertions;
pub mod context;
pub mod error;
pub mod intrinsics;
pub mod logical_id;
pub mod resource;
pub mod synth;

pub use app::{App, AppProps, Environment, NestedStackProps, NodeId, StackProps};
pub use context::{Context, MissingContext, CONTEXT_FILE};
pub use error::{CoreError, CoreResult};
pub use intrinsics::Aws;
pub use resource::{CfnResource, Reference, RemovalPolicy, ResourceHandle};
pub use synth::{CloudAssembly, StackArtifact, MANIFEST_FILE};
