//! SCIM 2.0 protocol types
//!
//! Schema URNs, resource metadata, list/search messages and the discovery
//! documents (RFC 7643/7644). Resources themselves are kept as canonical
//! `serde_json::Value` trees; see [`super::wire`] for their per-version shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Schema URIs
// =============================================================================

/// SCIM Core User schema URI
pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM Core Group schema URI
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// SCIM Enterprise User extension schema URI
pub const SCHEMA_ENTERPRISE_USER: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

/// SCIM ListResponse schema URI
pub const SCHEMA_LIST_RESPONSE: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";

/// SCIM Error schema URI
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// SCIM PatchOp schema URI
pub const SCHEMA_PATCH_OP: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// SCIM ServiceProviderConfig schema URI
pub const SCHEMA_SERVICE_PROVIDER_CONFIG: &str =
    "urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig";

/// SCIM ResourceType schema URI
pub const SCHEMA_RESOURCE_TYPE: &str = "urn:ietf:params:scim:schemas:core:2.0:ResourceType";

/// SCIM Schema schema URI
pub const SCHEMA_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Schema";

/// SCIM SearchRequest schema URI
pub const SCHEMA_SEARCH_REQUEST: &str = "urn:ietf:params:scim:api:messages:2.0:SearchRequest";

// =============================================================================
// Resource Metadata
// =============================================================================

/// Resource metadata common to all SCIM resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimMeta {
    /// The resource type (e.g., "User", "Group")
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    /// The absolute URI of the resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Weak ETag of the resource (e.g., "W/\"a330bc54f0671c9\"")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ScimMeta {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            created: None,
            last_modified: None,
            location: None,
            version: None,
        }
    }

    /// Metadata for a resource created at `now`.
    pub fn created_at(resource_type: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            created: Some(now),
            last_modified: Some(now),
            ..Self::new(resource_type)
        }
    }

    /// Set the location URI
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the ETag version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Render as the `meta` member of a canonical resource tree.
    pub fn to_value(&self) -> Value {
        let mut meta = json!({ "resourceType": self.resource_type });
        if let Some(created) = self.created {
            meta["created"] = json!(format_timestamp(created));
        }
        if let Some(modified) = self.last_modified {
            meta["lastModified"] = json!(format_timestamp(modified));
        }
        if let Some(location) = &self.location {
            meta["location"] = json!(location);
        }
        if let Some(version) = &self.version {
            meta["version"] = json!(version);
        }
        meta
    }
}

/// RFC 3339 timestamp with millisecond precision, as written into `meta`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// List Response (RFC 7644 Section 3.4.2)
// =============================================================================

/// SCIM list response for paginated collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    /// SCIM schema URIs
    pub schemas: Vec<String>,

    /// Total number of results available
    pub total_results: u32,

    /// Number of results returned in this response
    pub items_per_page: u32,

    /// 1-based index of the first result in this response
    pub start_index: u32,

    /// The list of resources
    #[serde(rename = "Resources")]
    pub resources: Vec<T>,
}

impl<T> ScimListResponse<T> {
    /// Create a new list response
    pub fn new(resources: Vec<T>, total_results: u32, start_index: u32) -> Self {
        let items_per_page = resources.len() as u32;
        Self {
            schemas: vec![SCHEMA_LIST_RESPONSE.to_string()],
            total_results,
            items_per_page,
            start_index,
            resources,
        }
    }
}

/// Query parameters for list operations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListParams {
    /// SCIM filter expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// 1-based start index (default: 1); values below 1 are treated as 1
    #[serde(default = "default_start_index")]
    pub start_index: i64,

    /// Number of results per page; the server default applies when absent.
    /// Negative values are treated as 0.
    #[serde(default)]
    pub count: Option<i64>,

    /// Attribute to sort by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// Sort order ("ascending" or "descending")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,

    /// Attributes to include in response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,

    /// Attributes to exclude from response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_attributes: Option<String>,
}

fn default_start_index() -> i64 {
    1
}

impl Default for ScimListParams {
    fn default() -> Self {
        Self {
            filter: None,
            start_index: default_start_index(),
            count: None,
            sort_by: None,
            sort_order: None,
            attributes: None,
            excluded_attributes: None,
        }
    }
}

impl ScimListParams {
    /// Whether `sortOrder` asks for descending order.
    pub fn is_descending(&self) -> bool {
        self.sort_order
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case("descending"))
    }
}

/// Body of a `POST .search` request (RFC 7644 Section 3.4.3).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub excluded_attributes: Vec<String>,
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub start_index: Option<i64>,
    pub count: Option<i64>,
}

impl From<SearchRequest> for ScimListParams {
    fn from(req: SearchRequest) -> Self {
        let join = |v: Vec<String>| (!v.is_empty()).then(|| v.join(","));
        Self {
            filter: req.filter,
            start_index: req.start_index.unwrap_or_else(default_start_index),
            count: req.count,
            sort_by: req.sort_by,
            sort_order: req.sort_order,
            attributes: join(req.attributes),
            excluded_attributes: join(req.excluded_attributes),
        }
    }
}

// =============================================================================
// Discovery Types (RFC 7644)
// =============================================================================

/// Service Provider Configuration.
///
/// Advertises the SCIM service's capabilities and supported features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProviderConfig {
    /// SCIM schema URIs
    pub schemas: Vec<String>,

    /// Documentation URI for this SCIM implementation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_uri: Option<String>,

    /// PATCH operation support
    pub patch: FeatureSupport,

    /// Bulk operation support
    pub bulk: BulkSupport,

    /// Filter support
    pub filter: FilterSupport,

    /// Change password support
    pub change_password: FeatureSupport,

    /// Sort support
    pub sort: FeatureSupport,

    /// ETag support
    pub etag: FeatureSupport,

    /// Supported authentication schemes
    pub authentication_schemes: Vec<AuthenticationScheme>,

    /// Resource metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ScimMeta>,
}

impl Default for ServiceProviderConfig {
    fn default() -> Self {
        Self {
            schemas: vec![SCHEMA_SERVICE_PROVIDER_CONFIG.to_string()],
            documentation_uri: None,
            patch: FeatureSupport { supported: true },
            bulk: BulkSupport::unsupported(),
            filter: FilterSupport::default(),
            change_password: FeatureSupport { supported: false },
            sort: FeatureSupport { supported: true },
            etag: FeatureSupport { supported: true },
            authentication_schemes: Vec::new(),
            meta: None,
        }
    }
}

/// Simple feature support flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSupport {
    pub supported: bool,
}

/// Bulk operation support configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSupport {
    pub supported: bool,
    pub max_operations: u32,
    pub max_payload_size: u32,
}

impl BulkSupport {
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            max_operations: 0,
            max_payload_size: 0,
        }
    }
}

/// Filter support configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSupport {
    pub supported: bool,
    pub max_results: u32,
}

impl Default for FilterSupport {
    fn default() -> Self {
        Self {
            supported: true,
            max_results: 200,
        }
    }
}

/// Authentication scheme definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationScheme {
    /// Display name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// URI to specification document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_uri: Option<String>,

    /// Scheme type identifier
    #[serde(rename = "type")]
    pub scheme_type: String,

    /// Whether this is the primary authentication method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

/// Resource type definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    /// SCIM schema URIs
    pub schemas: Vec<String>,

    /// Resource type identifier (e.g., "User")
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Endpoint path (e.g., "/Users")
    pub endpoint: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Primary schema URI for this resource type
    pub schema: String,

    /// Schema extensions supported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_extensions: Vec<SchemaExtension>,

    /// Resource metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ScimMeta>,
}

/// Schema extension reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaExtension {
    /// Schema URI of the extension
    pub schema: String,
    /// Whether the extension is required
    pub required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scim_list_response() {
        let users = vec![json!({"id": "1"}), json!({"id": "2"})];

        let response = ScimListResponse::new(users, 100, 1);

        let json = serde_json::to_string_pretty(&response).unwrap();
        assert!(json.contains("\"totalResults\": 100"));
        assert!(json.contains("\"itemsPerPage\": 2"));
        assert!(json.contains("\"startIndex\": 1"));
        assert!(json.contains("\"Resources\""));
    }

    #[test]
    fn test_service_provider_config() {
        let config = ServiceProviderConfig::default();

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"patch\""));
        assert!(json.contains("\"supported\": true"));
        assert!(json.contains("\"authenticationSchemes\""));
    }

    #[test]
    fn test_list_params_defaults() {
        let params: ScimListParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.start_index, 1);
        assert_eq!(params.count, None);
        assert!(!params.is_descending());

        let params: ScimListParams =
            serde_json::from_value(json!({"sortOrder": "Descending"})).unwrap();
        assert!(params.is_descending());
    }

    #[test]
    fn test_list_params_accept_negative_paging() {
        let params: ScimListParams =
            serde_json::from_value(json!({"startIndex": -1, "count": -5})).unwrap();
        assert_eq!(params.start_index, -1);
        assert_eq!(params.count, Some(-5));
    }

    #[test]
    fn test_search_request_into_params() {
        let req: SearchRequest = serde_json::from_value(json!({
            "schemas": [SCHEMA_SEARCH_REQUEST],
            "attributes": ["userName", "emails"],
            "filter": "userName sw \"j\"",
            "count": 10
        }))
        .unwrap();

        let params = ScimListParams::from(req);
        assert_eq!(params.attributes.as_deref(), Some("userName,emails"));
        assert_eq!(params.excluded_attributes, None);
        assert_eq!(params.start_index, 1);
        assert_eq!(params.count, Some(10));
    }

    #[test]
    fn test_meta_to_value() {
        let now = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let meta = ScimMeta::created_at("User", now)
            .with_location("https://example.com/scim/v2/Users/1")
            .with_version("W/\"abc\"");

        let value = meta.to_value();
        assert_eq!(value["resourceType"], "User");
        assert_eq!(value["created"], "2024-01-02T03:04:05.000Z");
        assert_eq!(value["lastModified"], value["created"]);
        assert_eq!(value["version"], "W/\"abc\"");
    }
}
