//! SCIM Protocol Routes
//!
//! Endpoints per RFC 7643 (Core Schema) and RFC 7644 (Protocol), served under
//! `/scim/v2/` and, with `scim.legacy_v1`, the SCIM 1.1 wire format under `/scim/v1/`.
//!
//! ## Endpoint Structure
//!
//! **Discovery Endpoints:**
//! - `GET /ServiceProviderConfig` - Service capabilities
//! - `GET /ResourceTypes` - List supported resource types
//! - `GET /ResourceTypes/{name}` - Get specific resource type
//! - `GET /Schemas` - List supported schemas
//! - `GET /Schemas/{id}` - Get specific schema
//!
//! **Resource Endpoints:**
//! - `GET/POST /Users` - List/create users
//! - `POST /Users/.search` - Search users
//! - `GET/PUT/PATCH/DELETE /Users/{id}` - User operations
//! - the same for `/Groups`

pub mod discovery;
pub mod groups;
mod resources;
pub mod users;

use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::Value;

use crate::{
    AppState,
    config::ScimConfig,
    scim::{ProtocolVersion, ScimErrorResponse},
};

pub const SCIM_CONTENT_TYPE: &str = "application/scim+json";

/// Build the SCIM routes, to be nested under `/scim`.
pub fn scim_routes(config: &ScimConfig) -> Router<AppState> {
    let router = Router::new().nest("/v2", versioned_routes(ProtocolVersion::V2));
    if config.legacy_v1 {
        router.nest("/v1", versioned_routes(ProtocolVersion::V1))
    } else {
        router
    }
}

fn versioned_routes(version: ProtocolVersion) -> Router<AppState> {
    Router::new()
        // Discovery endpoints
        .route(
            "/ServiceProviderConfig",
            get(discovery::service_provider_config),
        )
        .route("/ResourceTypes", get(discovery::resource_types))
        .route("/ResourceTypes/{name}", get(discovery::resource_type))
        .route("/Schemas", get(discovery::schemas))
        .route("/Schemas/{id}", get(discovery::schema))
        // User resource endpoints
        .route("/Users", get(users::list_users).post(users::create_user))
        .route("/Users/.search", post(users::search_users))
        .route(
            "/Users/{id}",
            get(users::get_user)
                .put(users::replace_user)
                .patch(users::patch_user)
                .delete(users::delete_user),
        )
        // Group resource endpoints
        .route("/Groups", get(groups::list_groups).post(groups::create_group))
        .route("/Groups/.search", post(groups::search_groups))
        .route(
            "/Groups/{id}",
            get(groups::get_group)
                .put(groups::replace_group)
                .patch(groups::patch_group)
                .delete(groups::delete_group),
        )
        .layer(Extension(version))
}

// =============================================================================
// Responses
// =============================================================================

/// SCIM JSON response with the SCIM content type and optional caching headers.
pub struct ScimJson {
    body: Value,
    status: StatusCode,
    etag: Option<String>,
    location: Option<String>,
}

impl ScimJson {
    pub fn ok(body: Value) -> Self {
        Self {
            body,
            status: StatusCode::OK,
            etag: None,
            location: None,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(body)
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

impl IntoResponse for ScimJson {
    fn into_response(self) -> Response {
        let body = match serde_json::to_vec(&self.body) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize SCIM response: {}", e);
                return ScimErrorResponse::internal("Failed to serialize response").into_response();
            }
        };

        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, SCIM_CONTENT_TYPE)],
            Body::from(body),
        )
            .into_response();
        let headers = response.headers_mut();
        if let Some(etag) = self.etag.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(header::ETAG, etag);
        }
        if let Some(location) = self.location.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(header::LOCATION, location);
        }
        response
    }
}

/// A protocol error rendered in the envelope of the request's protocol version.
pub struct ScimFailure {
    version: ProtocolVersion,
    error: ScimErrorResponse,
}

impl ScimFailure {
    pub fn new(version: ProtocolVersion, error: impl Into<ScimErrorResponse>) -> Self {
        Self {
            version,
            error: error.into(),
        }
    }
}

impl IntoResponse for ScimFailure {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, detail = %self.error.detail, "SCIM request failed");
        } else {
            tracing::debug!(status = %status, detail = %self.error.detail, "SCIM request rejected");
        }
        ScimJson {
            status,
            ..ScimJson::ok(self.version.encode_error(&self.error))
        }
        .into_response()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Extract the SCIM base URL for `version` from the request headers.
///
/// Uses X-Forwarded-* headers if present (for reverse proxy scenarios),
/// otherwise constructs from the Host header.
pub fn base_url(headers: &HeaderMap, version: ProtocolVersion) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, version.prefix())
}
