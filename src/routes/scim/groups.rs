//! SCIM Group Resource Endpoints
//!
//! Implements RFC 7644 Section 3 operations for Group resources:
//! - POST /Groups: Create group
//! - GET /Groups: List groups
//! - POST /Groups/.search: Search groups
//! - GET /Groups/{id}: Get group by ID
//! - PUT /Groups/{id}: Replace group (full update)
//! - PATCH /Groups/{id}: Partial update (membership changes)
//! - DELETE /Groups/{id}: Delete group

use axum::{
    Extension,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};

use super::resources::{ProjectionParams, ResourceRequest};
use crate::{
    AppState,
    scim::{ProtocolVersion, ResourceKind, ScimListParams},
};

/// List groups.
///
/// `GET /Groups`
#[tracing::instrument(name = "scim.groups.list", skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    Query(params): Query<ScimListParams>,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .list(&params)
        .await
}

/// `POST /Groups/.search`
#[tracing::instrument(name = "scim.groups.search", skip_all)]
pub async fn search_groups(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .search(&body)
        .await
}

/// Create a new group. Every member must reference an existing User or Group.
///
/// `POST /Groups`
#[tracing::instrument(name = "scim.groups.create", skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .create(&body, &params)
        .await
}

/// `GET /Groups/{id}`
#[tracing::instrument(name = "scim.groups.get", skip_all, fields(%id))]
pub async fn get_group(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .get(&id, &params)
        .await
}

/// `PUT /Groups/{id}`
#[tracing::instrument(name = "scim.groups.replace", skip_all, fields(%id))]
pub async fn replace_group(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .replace(&id, &body, &params)
        .await
}

/// Partially update a group.
///
/// `PATCH /Groups/{id}`
///
/// Identity providers mostly use this for membership changes, e.g.
/// `remove` with path `members[value eq "..."]`.
#[tracing::instrument(name = "scim.groups.patch", skip_all, fields(%id))]
pub async fn patch_group(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .patch(&id, &body, &params)
        .await
}

/// `DELETE /Groups/{id}`
#[tracing::instrument(name = "scim.groups.delete", skip_all, fields(%id))]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::Group, version, &headers)
        .delete(&id)
        .await
}
