//! SCIM 2.0 Error Types
//!
//! Three layers, innermost first:
//!
//! - [`ScimError`]: syntax and semantic failures of the path/filter engine
//! - [`PatchError`]: a failed PATCH operation, carrying its `scimType`
//! - [`ScimErrorResponse`]: the protocol error body (RFC 7644 Section 3.12)

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{
    filter::{CompareOp, FilterParseError},
    schema::AttributeType,
    types::SCHEMA_ERROR,
};

// =============================================================================
// Engine errors
// =============================================================================

/// Failure to parse or resolve a filter or attribute path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScimError {
    /// Malformed text: unbalanced boundary, dangling operator, empty segment.
    #[error("{message} at position {position}")]
    Syntax { message: String, position: usize },

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("operator '{op}' is not supported for {data_type} attribute '{attribute}'")]
    UnsupportedOperator {
        attribute: String,
        op: CompareOp,
        data_type: AttributeType,
    },

    /// The comparison literal does not fit the attribute's type.
    #[error("invalid comparison value for attribute '{attribute}': {detail}")]
    InvalidLiteral { attribute: String, detail: String },

    #[error("attribute '{0}' is read-only")]
    ReadOnlyAttribute(String),

    /// The path is well-formed but cannot address anything in the resource.
    #[error("path '{path}' does not address a target: {detail}")]
    NoTarget { path: String, detail: String },

    /// The path is well-formed but not usable as a PATCH target.
    #[error("invalid path '{path}': {detail}")]
    InvalidPath { path: String, detail: String },
}

impl ScimError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }
}

impl From<FilterParseError> for ScimError {
    fn from(err: FilterParseError) -> Self {
        Self::Syntax {
            message: err.message,
            position: err.position,
        }
    }
}

/// A failed PATCH operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{scim_type}: {detail}")]
pub struct PatchError {
    pub scim_type: ScimErrorType,
    pub detail: String,
}

impl PatchError {
    pub fn new(scim_type: ScimErrorType, detail: impl Into<String>) -> Self {
        Self {
            scim_type,
            detail: detail.into(),
        }
    }

    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::new(ScimErrorType::InvalidPath, detail)
    }

    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::new(ScimErrorType::NoTarget, detail)
    }

    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(ScimErrorType::InvalidValue, detail)
    }

    pub fn invalid_syntax(detail: impl Into<String>) -> Self {
        Self::new(ScimErrorType::InvalidSyntax, detail)
    }

    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::new(ScimErrorType::Mutability, detail)
    }

    /// Prefix the detail with the index of the failing operation.
    pub fn at_operation(self, index: usize) -> Self {
        Self {
            detail: format!("operation {}: {}", index, self.detail),
            ..self
        }
    }
}

impl From<ScimError> for PatchError {
    fn from(err: ScimError) -> Self {
        let detail = err.to_string();
        match err {
            ScimError::ReadOnlyAttribute(_) => Self::mutability(detail),
            ScimError::NoTarget { .. } => Self::no_target(detail),
            ScimError::Syntax { .. }
            | ScimError::UnknownAttribute(_)
            | ScimError::UnsupportedOperator { .. }
            | ScimError::InvalidLiteral { .. }
            | ScimError::InvalidPath { .. } => Self::invalid_path(detail),
        }
    }
}

// =============================================================================
// Protocol error body
// =============================================================================

/// SCIM error response per RFC 7644.
///
/// All SCIM errors are returned in this format with appropriate HTTP status codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
    /// SCIM schema URIs (always contains the Error schema)
    pub schemas: Vec<String>,

    /// HTTP status code as a string (e.g., "400", "404")
    pub status: String,

    /// SCIM-specific error type (optional, per RFC 7644)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<ScimErrorType>,

    /// Human-readable error detail
    pub detail: String,
}

impl ScimErrorResponse {
    /// Create a new SCIM error
    fn new(
        status: StatusCode,
        scim_type: Option<ScimErrorType>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.as_u16().to_string(),
            scim_type,
            detail: detail.into(),
        }
    }

    /// Invalid filter syntax error (400)
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidFilter),
            detail,
        )
    }

    /// Invalid JSON syntax error (400)
    pub fn invalid_syntax(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidSyntax),
            detail,
        )
    }

    /// Malformed PATCH path (400)
    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidPath),
            detail,
        )
    }

    /// PATCH path matched nothing (400)
    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::NoTarget),
            detail,
        )
    }

    /// Attempt to modify immutable or read-only attribute (400)
    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::Mutability),
            detail,
        )
    }

    /// Invalid attribute value (400)
    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidValue),
            detail,
        )
    }

    /// Generic bad request without specific scimType (400)
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, None, detail)
    }

    /// Resource not found (404)
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, None, detail)
    }

    /// Uniqueness constraint violation (409)
    pub fn uniqueness(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            Some(ScimErrorType::Uniqueness),
            detail,
        )
    }

    /// Feature switched off in this deployment (501)
    pub fn not_implemented(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, None, detail)
    }

    /// Internal server error (500)
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, None, detail)
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status.parse().unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ScimErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            [(header::CONTENT_TYPE, "application/scim+json")],
            Json(self),
        )
            .into_response()
    }
}

impl From<ScimError> for ScimErrorResponse {
    /// Errors raised while compiling a query filter.
    fn from(err: ScimError) -> Self {
        let detail = err.to_string();
        match err {
            ScimError::ReadOnlyAttribute(_) => Self::mutability(detail),
            ScimError::NoTarget { .. } => Self::no_target(detail),
            ScimError::InvalidPath { .. } => Self::invalid_path(detail),
            ScimError::Syntax { .. }
            | ScimError::UnknownAttribute(_)
            | ScimError::UnsupportedOperator { .. }
            | ScimError::InvalidLiteral { .. } => Self::invalid_filter(detail),
        }
    }
}

impl From<PatchError> for ScimErrorResponse {
    fn from(err: PatchError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Some(err.scim_type), err.detail)
    }
}

/// SCIM error types per RFC 7644 Section 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
    /// Filter syntax is invalid or unsupported
    InvalidFilter,

    /// Request body has invalid JSON syntax
    InvalidSyntax,

    /// PATCH path is malformed or names no attribute
    InvalidPath,

    /// PATCH path or filter matched nothing
    NoTarget,

    /// Attempt to modify read-only or immutable attribute
    Mutability,

    /// Uniqueness constraint violated (e.g., duplicate userName)
    Uniqueness,

    /// Attribute value is invalid for its type
    InvalidValue,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScimErrorType::InvalidFilter => write!(f, "invalidFilter"),
            ScimErrorType::InvalidSyntax => write!(f, "invalidSyntax"),
            ScimErrorType::InvalidPath => write!(f, "invalidPath"),
            ScimErrorType::NoTarget => write!(f, "noTarget"),
            ScimErrorType::Mutability => write!(f, "mutability"),
            ScimErrorType::Uniqueness => write!(f, "uniqueness"),
            ScimErrorType::InvalidValue => write!(f, "invalidValue"),
        }
    }
}

/// Result type for SCIM operations
pub type ScimResult<T> = Result<T, ScimErrorResponse>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scim_error_invalid_filter() {
        let err = ScimErrorResponse::invalid_filter("The filter syntax is invalid");

        assert_eq!(err.status, "400");
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));
        assert!(err.detail.contains("filter"));

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"scimType\": \"invalidFilter\""));
        assert!(json.contains("\"status\": \"400\""));
    }

    #[test]
    fn test_scim_error_not_found() {
        let err = ScimErrorResponse::not_found("User with id '12345' not found");

        assert_eq!(err.status, "404");
        assert_eq!(err.scim_type, None);

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(!json.contains("scimType")); // Should be omitted
    }

    #[test]
    fn test_scim_error_uniqueness() {
        let err =
            ScimErrorResponse::uniqueness("User with userName 'john@example.com' already exists");

        assert_eq!(err.status, "409");
        assert_eq!(err.scim_type, Some(ScimErrorType::Uniqueness));
    }

    #[test]
    fn test_scim_error_status_code() {
        assert_eq!(
            ScimErrorResponse::bad_request("test").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ScimErrorResponse::not_found("test").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ScimErrorResponse::uniqueness("test").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ScimErrorResponse::internal("test").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_scim_error_type_display() {
        assert_eq!(format!("{}", ScimErrorType::InvalidFilter), "invalidFilter");
        assert_eq!(format!("{}", ScimErrorType::Uniqueness), "uniqueness");
        assert_eq!(format!("{}", ScimErrorType::InvalidPath), "invalidPath");
    }

    #[test]
    fn test_filter_errors_map_to_invalid_filter() {
        let err: ScimErrorResponse = ScimError::UnknownAttribute("fooBar".into()).into();
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));
        assert!(err.detail.contains("fooBar"));

        let err: ScimErrorResponse = ScimError::syntax("Unterminated string", 12).into();
        assert_eq!(err.status, "400");
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));
    }

    #[test]
    fn test_patch_error_mapping() {
        let err: PatchError = ScimError::UnknownAttribute("fooBar".into()).into();
        assert_eq!(err.scim_type, ScimErrorType::InvalidPath);

        let err: PatchError = ScimError::ReadOnlyAttribute("id".into()).into();
        assert_eq!(err.scim_type, ScimErrorType::Mutability);

        let err = PatchError::no_target("no member matched").at_operation(2);
        assert_eq!(err.detail, "operation 2: no member matched");

        let body: ScimErrorResponse = err.into();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["scimType"], "noTarget");
        assert_eq!(json["status"], "400");
    }
}
