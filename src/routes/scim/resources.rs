//! Resource operations shared by the User and Group endpoints.

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;

use super::{ScimFailure, ScimJson, base_url};
use crate::{
    AppState,
    scim::{
        PatchRequest, ProtocolVersion, ResourceKind, SCHEMA_SEARCH_REQUEST, ScimErrorResponse,
        ScimListParams, SearchRequest,
    },
    services::ScimProvisioningService,
};

/// `attributes` / `excludedAttributes` on single-resource requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionParams {
    pub attributes: Option<String>,
    pub excluded_attributes: Option<String>,
}

/// Request context shared by every resource handler.
pub(super) struct ResourceRequest<'a> {
    pub state: &'a AppState,
    pub kind: ResourceKind,
    pub version: ProtocolVersion,
    pub base_url: String,
}

impl<'a> ResourceRequest<'a> {
    pub fn new(
        state: &'a AppState,
        kind: ResourceKind,
        version: ProtocolVersion,
        headers: &HeaderMap,
    ) -> Self {
        Self {
            state,
            kind,
            version,
            base_url: base_url(headers, version),
        }
    }

    fn service(&self) -> &ScimProvisioningService {
        &self.state.services.scim_provisioning
    }

    fn fail(&self, error: impl Into<ScimErrorResponse>) -> Response {
        ScimFailure::new(self.version, error).into_response()
    }

    /// Decode a JSON body into the canonical resource tree.
    fn decode(&self, body: &Bytes) -> Result<Value, Response> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            self.fail(ScimErrorResponse::invalid_syntax(format!("Invalid JSON: {}", e)))
        })?;
        Ok(self.version.decode_resource(value, self.kind.core_schema()))
    }

    /// Project and encode one resource, with its ETag.
    fn respond(&self, resource: Value, params: &ProjectionParams, status: StatusCode) -> Response {
        let projection = match self.service().projection(
            self.kind,
            params.attributes.as_deref(),
            params.excluded_attributes.as_deref(),
        ) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        let etag = resource
            .pointer("/meta/version")
            .and_then(Value::as_str)
            .map(str::to_string);
        let location = resource
            .pointer("/meta/location")
            .and_then(Value::as_str)
            .map(str::to_string);
        let body = self
            .version
            .encode_resource(self.service().project(self.kind, &resource, &projection));

        let response = if status == StatusCode::CREATED {
            ScimJson::created(body).with_location(location)
        } else {
            ScimJson::ok(body)
        };
        response.with_etag(etag).into_response()
    }

    pub async fn list(&self, params: &ScimListParams) -> Response {
        let projection = match self.service().projection(
            self.kind,
            params.attributes.as_deref(),
            params.excluded_attributes.as_deref(),
        ) {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };

        match self.service().query(self.kind, params, &self.base_url).await {
            Ok(page) => {
                let resources = page
                    .resources
                    .iter()
                    .map(|r| {
                        self.version
                            .encode_resource(self.service().project(self.kind, r, &projection))
                    })
                    .collect();
                ScimJson::ok(self.version.encode_list(
                    resources,
                    page.total_results,
                    page.start_index,
                ))
                .into_response()
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn search(&self, body: &Bytes) -> Response {
        let request: SearchRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                return self.fail(ScimErrorResponse::invalid_syntax(format!(
                    "Invalid search request: {}",
                    e
                )));
            }
        };
        if self.version == ProtocolVersion::V2
            && !request
                .schemas
                .iter()
                .any(|s| s.eq_ignore_ascii_case(SCHEMA_SEARCH_REQUEST))
        {
            return self.fail(ScimErrorResponse::invalid_syntax(format!(
                "search request must declare '{}'",
                SCHEMA_SEARCH_REQUEST
            )));
        }
        self.list(&ScimListParams::from(request)).await
    }

    pub async fn create(&self, body: &Bytes, params: &ProjectionParams) -> Response {
        let resource = match self.decode(body) {
            Ok(r) => r,
            Err(response) => return response,
        };
        match self.service().create(self.kind, resource, &self.base_url).await {
            Ok(created) => self.respond(created, params, StatusCode::CREATED),
            Err(e) => self.fail(e),
        }
    }

    pub async fn get(&self, id: &str, params: &ProjectionParams) -> Response {
        match self.service().get(self.kind, id, &self.base_url).await {
            Ok(resource) => self.respond(resource, params, StatusCode::OK),
            Err(e) => self.fail(e),
        }
    }

    pub async fn replace(&self, id: &str, body: &Bytes, params: &ProjectionParams) -> Response {
        let resource = match self.decode(body) {
            Ok(r) => r,
            Err(response) => return response,
        };
        match self
            .service()
            .replace(self.kind, id, resource, &self.base_url)
            .await
        {
            Ok(replaced) => self.respond(replaced, params, StatusCode::OK),
            Err(e) => self.fail(e),
        }
    }

    pub async fn patch(&self, id: &str, body: &Bytes, params: &ProjectionParams) -> Response {
        let request: PatchRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                return self.fail(ScimErrorResponse::invalid_syntax(format!(
                    "Invalid PATCH request: {}",
                    e
                )));
            }
        };
        match self
            .service()
            .patch(self.kind, id, &request, &self.base_url)
            .await
        {
            Ok(patched) => self.respond(patched, params, StatusCode::OK),
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete(&self, id: &str) -> Response {
        match self.service().delete(self.kind, id).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => self.fail(e),
        }
    }
}
