//! scimgate: a SCIM 2.0 provisioning server.
//!
//! Identity providers push Users and Groups over the SCIM protocol; the
//! [`scim`] module holds the protocol core (filters, attribute paths, PATCH),
//! [`services`] the provisioning rules and [`routes`] the HTTP surface.

pub mod config;
pub mod db;
pub mod observability;
pub mod routes;
pub mod scim;
pub mod services;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    config::GatewayConfig,
    db::{MemoryResourceRepo, ResourceRepo},
    scim::SchemaRegistry,
    services::Services,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    /// Schemas and extensions, as configured under `[scim]`.
    pub schema: Arc<SchemaRegistry>,
    pub repo: Arc<dyn ResourceRepo>,
    pub services: Services,
}

impl AppState {
    /// State backed by the in-memory resource store.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_repo(config, Arc::new(MemoryResourceRepo::new()))
    }

    pub fn with_repo(config: GatewayConfig, repo: Arc<dyn ResourceRepo>) -> Self {
        let schema = Arc::new(config.scim.schema_registry());
        let scim_config = Arc::new(config.scim.clone());
        let services = Services::new(repo.clone(), schema.clone(), scim_config);
        Self {
            config: Arc::new(config),
            schema,
            repo,
            services,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();
    let mut app = Router::new()
        // Health check endpoints
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .nest("/scim", routes::scim_routes(&config.scim));

    tracing::info!("SCIM 2.0 provisioning endpoints enabled at /scim/v2/");
    if config.scim.legacy_v1 {
        tracing::info!("SCIM 1.1 provisioning endpoints enabled at /scim/v1/");
    }

    app = app
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes));
    app.with_state(state)
}
