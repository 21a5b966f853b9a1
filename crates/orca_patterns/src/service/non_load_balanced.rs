//! Service without a load balancer. Cloud Map is its only routing.

use tracing::info;

use orca_core::{App, NodeId};

use super::{assemble_task, create_service, ServiceEnvironment, ServiceProps, ServiceResources};
use crate::error::PatternResult;

#[derive(Debug, Clone)]
pub struct NonLoadBalancedService {
    pub resources: ServiceResources,
}

impl NonLoadBalancedService {
    pub fn build(
        app: &mut App,
        scope: NodeId,
        id: &str,
        props: &ServiceProps,
        env: &ServiceEnvironment,
    ) -> PatternResult<Self> {
        let this = app.add_construct(scope, id)?;
        info!("Building service {}", app.path(this));

        let task = assemble_task(app, this, props, env)?;
        let resources = create_service(app, this, props, env, task, Vec::new())?;
        Ok(Self { resources })
    }
}
