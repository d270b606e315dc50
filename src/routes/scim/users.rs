//! SCIM User Resource Endpoints
//!
//! Implements RFC 7644 Section 3 operations for User resources:
//! - POST /Users: Create user
//! - GET /Users: List users
//! - POST /Users/.search: Search users
//! - GET /Users/{id}: Get user by ID
//! - PUT /Users/{id}: Replace user (full update)
//! - PATCH /Users/{id}: Partial update
//! - DELETE /Users/{id}: Delete user

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

/// List users with optional filter, sorting and pagination.
///
/// `GET /Users`
///
/// Query parameters:
/// - `filter`: SCIM filter expression (e.g., `userName eq "john@example.com"`)
/// - `sortBy` / `sortOrder`: attribute path and `ascending` / `descending`
/// - `startIndex`: 1-based pagination start (default: 1)
/// - `count`: Results per page (clamped to `scim.max_results`)
/// - `attributes` / `excludedAttributes`: response projection
#[tracing::instrument(name = "scim.users.list", skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    Query(params): Query<ScimListParams>,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .list(&params)
        .await
}

/// Search users with a `SearchRequest` body.
///
/// `POST /Users/.search`
#[tracing::instrument(name = "scim.users.search", skip_all)]
pub async fn search_users(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .search(&body)
        .await
}

/// Create a new user.
///
/// `POST /Users`
///
/// Returns 201 Created with the full user resource and a `Location` header.
#[tracing::instrument(name = "scim.users.create", skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .create(&body, &params)
        .await
}

/// Get a user by ID.
///
/// `GET /Users/{id}`
#[tracing::instrument(name = "scim.users.get", skip_all, fields(%id))]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .get(&id, &params)
        .await
}

/// Replace a user (full update).
///
/// `PUT /Users/{id}`
#[tracing::instrument(name = "scim.users.replace", skip_all, fields(%id))]
pub async fn replace_user(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .replace(&id, &body, &params)
        .await
}

/// Partially update a user.
///
/// `PATCH /Users/{id}`
///
/// Operations apply atomically: on any failure the stored user is unchanged.
#[tracing::instrument(name = "scim.users.patch", skip_all, fields(%id))]
pub async fn patch_user(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ProjectionParams>,
    body: Bytes,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .patch(&id, &body, &params)
        .await
}

/// Delete a user and remove it from every group.
///
/// `DELETE /Users/{id}`
#[tracing::instrument(name = "scim.users.delete", skip_all, fields(%id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(version): Extension<ProtocolVersion>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    ResourceRequest::new(&state, ResourceKind::User, version, &headers)
        .delete(&id)
        .await
}
