//! Health check endpoints for Kubernetes probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::{AppState, db::DbError, scim::ResourceKind};

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Service version
    pub version: String,
    /// Stored resource counts
    pub resources: ResourceCounts,
}

#[derive(Debug, Default, Serialize)]
pub struct ResourceCounts {
    pub users: usize,
    pub groups: usize,
}

async fn count_resources(state: &AppState) -> Result<ResourceCounts, DbError> {
    Ok(ResourceCounts {
        users: state.repo.count(ResourceKind::User).await?,
        groups: state.repo.count(ResourceKind::Group).await?,
    })
}

/// Full health check with resource store status.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION").to_string();
    match count_resources(&state).await {
        Ok(resources) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "healthy".into(),
                version,
                resources,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Resource store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "unhealthy".into(),
                    version,
                    resources: ResourceCounts::default(),
                }),
            )
        }
    }
}

/// Kubernetes liveness probe.
///
/// Returns 200 if the process is running. Does not check dependencies.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}
