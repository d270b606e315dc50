//! SCIM Discovery Endpoints
//!
//! Implements RFC 7644 Section 4 discovery endpoints:
//! - ServiceProviderConfig: Advertises service capabilities
//! - ResourceTypes: Lists supported resource types (User, Group)
//! - Schemas: Lists and retrieves schema definitions

use axum::{
    Extension,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use super::{ScimFailure, ScimJson, base_url};
use crate::{
    AppState,
    scim::{ProtocolVersion, ScimErrorResponse, ScimMeta},
};

fn to_json<T: Serialize>(version: ProtocolVersion, body: &T) -> Response {
    match serde_json::to_value(body) {
        Ok(value) => ScimJson::ok(value).into_response(),
        Err(e) => ScimFailure::new(
            version,
            ScimErrorResponse::internal(format!("Failed to serialize response: {}", e)),
        )
        .into_response(),
    }
}

fn list<T: Serialize>(version: ProtocolVersion, items: &[T]) -> Response {
    let resources: Result<Vec<Value>, _> = items.iter().map(serde_json::to_value).collect();
    match resources {
        Ok(resources) => {
            let total = resources.len() as u32;
            ScimJson::ok(version.encode_list(resources, total, 1)).into_response()
        }
        Err(e) => ScimFailure::new(
            version,
            ScimErrorResponse::internal(format!("Failed to serialize response: {}", e)),
        )
        .into_response(),
    }
}

// =============================================================================
// ServiceProviderConfig Endpoint
// =============================================================================

/// Get SCIM Service Provider Configuration.
///
/// Advertises which optional features (patch, filter, sort) are switched on
/// and the `count` ceiling.
///
/// `GET /ServiceProviderConfig`
#[tracing::instrument(name = "scim.discovery.service_provider_config", skip_all)]
pub async fn service_provider_config(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
) -> Response {
    let base_url = base_url(&headers, version);
    let mut config = state.config.scim.service_provider_config();
    config.meta = Some(
        ScimMeta::new("ServiceProviderConfig")
            .with_location(format!("{}/ServiceProviderConfig", base_url)),
    );
    to_json(version, &config)
}

// =============================================================================
// ResourceTypes Endpoints
// =============================================================================

/// `GET /ResourceTypes`
#[tracing::instrument(name = "scim.discovery.resource_types", skip_all)]
pub async fn resource_types(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
) -> Response {
    let base_url = base_url(&headers, version);
    list(version, &state.schema.resource_types(&base_url))
}

/// Get a specific resource type by name.
///
/// `GET /ResourceTypes/{name}`
#[tracing::instrument(name = "scim.discovery.resource_type", skip_all, fields(%name))]
pub async fn resource_type(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let base_url = base_url(&headers, version);
    match state
        .schema
        .resource_types(&base_url)
        .into_iter()
        .find(|rt| rt.name.eq_ignore_ascii_case(&name))
    {
        Some(resource_type) => to_json(version, &resource_type),
        None => ScimFailure::new(
            version,
            ScimErrorResponse::not_found(format!("ResourceType '{}' not found", name)),
        )
        .into_response(),
    }
}

// =============================================================================
// Schemas Endpoints
// =============================================================================

/// `GET /Schemas`
#[tracing::instrument(name = "scim.discovery.schemas", skip_all)]
pub async fn schemas(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
) -> Response {
    let base_url = base_url(&headers, version);
    list(version, &state.schema.schema_documents(&base_url))
}

/// Get a schema by its URN.
///
/// `GET /Schemas/{id}`
#[tracing::instrument(name = "scim.discovery.schema", skip_all, fields(%id))]
pub async fn schema(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let base_url = base_url(&headers, version);
    match state
        .schema
        .schema_documents(&base_url)
        .into_iter()
        .find(|s| s.id.eq_ignore_ascii_case(&id))
    {
        Some(schema) => to_json(version, &schema),
        None => ScimFailure::new(
            version,
            ScimErrorResponse::not_found(format!("Schema '{}' not found", id)),
        )
        .into_response(),
    }
}
