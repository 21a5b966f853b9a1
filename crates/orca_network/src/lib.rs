//! # orca_network
//!
//! Network resolution for Orca patterns: VPC lookups answered from the
//! context store, subnet selection and security groups.

pub mod error;
pub mod security_group;
pub mod vpc;

pub use error::{NetworkError, NetworkResult};
pub use security_group::{
    add_ingress_rule, create_ingress, create_security_group, Peer, Port, SecurityGroup,
    SecurityGroupProps,
};
pub use vpc::{lookup_vpc, SubnetType, Vpc, VpcLookupOptions, VpcProps, VPC_PROVIDER};
