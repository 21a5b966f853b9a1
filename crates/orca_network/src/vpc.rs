//! VPC lookup.
//!
//! A VPC is never created here. Its description comes from the context
//! store; when the store has no answer the dummy VPC below is returned so
//! the tree can still be built and the missing key reported.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use orca_core::{App, NodeId};

use crate::error::{NetworkError, NetworkResult};

/// Context provider name for VPC lookups.
pub const VPC_PROVIDER: &str = "vpc-provider";

/// How to find the VPC to deploy into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcProps {
    pub id: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VpcLookupOptions {
    Default,
    ById(String),
}

impl From<&VpcProps> for VpcLookupOptions {
    fn from(props: &VpcProps) -> Self {
        match (&props.id, props.is_default) {
            (Some(id), false) if !id.is_empty() => VpcLookupOptions::ById(id.clone()),
            _ => VpcLookupOptions::Default,
        }
    }
}

impl VpcLookupOptions {
    fn filters(&self) -> BTreeMap<String, String> {
        let mut filters = BTreeMap::new();
        match self {
            VpcLookupOptions::Default => {
                filters.insert("filter.isDefault".to_string(), "true".to_string());
            }
            VpcLookupOptions::ById(id) => {
                filters.insert("filter.vpc-id".to_string(), id.clone());
            }
        }
        filters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetType {
    Public,
    Private,
}

/// A resolved VPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub vpc_id: String,
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub public_subnet_ids: Vec<String>,
    #[serde(default)]
    pub private_subnet_ids: Vec<String>,
}

impl Vpc {
    fn dummy() -> Self {
        Self {
            vpc_id: "vpc-12345".to_string(),
            availability_zones: vec!["dummy1a".to_string(), "dummy1b".to_string()],
            public_subnet_ids: vec!["s-12345".to_string(), "s-67890".to_string()],
            private_subnet_ids: vec!["p-12345".to_string(), "p-67890".to_string()],
        }
    }

    /// Subnet ids of one type. Private falls back to public.
    pub fn select_subnets(&self, subnet_type: SubnetType) -> &[String] {
        match subnet_type {
            SubnetType::Public => &self.public_subnet_ids,
            SubnetType::Private if self.private_subnet_ids.is_empty() => &self.public_subnet_ids,
            SubnetType::Private => &self.private_subnet_ids,
        }
    }
}

/// Resolve the VPC for the stack owning `scope`.
pub fn lookup_vpc(app: &mut App, scope: NodeId, props: &VpcProps) -> NetworkResult<Vpc> {
    let options = VpcLookupOptions::from(props);
    let filters = options.filters();
    let lookup_props = json!({ "filter": filters, "returnAsymmetricSubnets": true });

    let vpc = match app.lookup_context(scope, VPC_PROVIDER, &filters, lookup_props)? {
        Some(value) => {
            serde_json::from_value::<Vpc>(value).map_err(|source| NetworkError::InvalidContext {
                key: VPC_PROVIDER.to_string(),
                source,
            })?
        }
        None => Vpc::dummy(),
    };

    info!("Resolved VPC {} ({:?})", vpc.vpc_id, options);
    Ok(vpc)
}
