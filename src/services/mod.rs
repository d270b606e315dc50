mod scim_provisioning;

use std::sync::Arc;

pub use scim_provisioning::{
    ProvisioningResult, QueryPage, ScimProvisioningError, ScimProvisioningService,
};

use crate::{config::ScimConfig, db::ResourceRepo, scim::SchemaRegistry};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub scim_provisioning: ScimProvisioningService,
}

impl Services {
    pub fn new(
        repo: Arc<dyn ResourceRepo>,
        schema: Arc<SchemaRegistry>,
        config: Arc<ScimConfig>,
    ) -> Self {
        Self {
            scim_provisioning: ScimProvisioningService::new(repo, schema, config),
        }
    }
}
