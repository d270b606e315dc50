//! Protocol-version wire encoding
//!
//! Resources are stored and patched as canonical SCIM 2.0 trees. Legacy SCIM 1.1
//! clients get the same tree with 1.0 schema URNs, no `meta.resourceType`, and
//! the 1.1 list and error envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    error::ScimErrorResponse,
    types::{SCHEMA_ENTERPRISE_USER, SCHEMA_GROUP, SCHEMA_USER, ScimListResponse},
};

/// SCIM 1.1 core schema URN
pub const SCHEMA_CORE_V1: &str = "urn:scim:schemas:core:1.0";

/// SCIM 1.1 Enterprise User extension URN
pub const SCHEMA_ENTERPRISE_V1: &str = "urn:scim:schemas:extension:enterprise:1.0";

/// URN pairs translated between protocol versions (2.0, 1.1).
const URN_MAP: [(&str, &str); 3] = [
    (SCHEMA_USER, SCHEMA_CORE_V1),
    (SCHEMA_GROUP, SCHEMA_CORE_V1),
    (SCHEMA_ENTERPRISE_USER, SCHEMA_ENTERPRISE_V1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "v1")]
    V1,
    #[default]
    #[serde(rename = "v2")]
    V2,
}

impl ProtocolVersion {
    /// Route prefix the version is served under.
    pub fn prefix(self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "/scim/v1",
            ProtocolVersion::V2 => "/scim/v2",
        }
    }

    /// Encode a canonical resource for the wire.
    pub fn encode_resource(self, resource: Value) -> Value {
        match self {
            ProtocolVersion::V2 => resource,
            ProtocolVersion::V1 => to_v1(resource),
        }
    }

    /// Translate a request body into the canonical tree.
    ///
    /// Only the Enterprise User members move back; the core 1.0 URN is ambiguous
    /// between Users and Groups, so `core_schema` names the one meant.
    pub fn decode_resource(self, body: Value, core_schema: &str) -> Value {
        match self {
            ProtocolVersion::V2 => body,
            ProtocolVersion::V1 => from_v1(body, core_schema),
        }
    }

    /// Encode a page of already-encoded resources.
    pub fn encode_list(self, resources: Vec<Value>, total_results: u32, start_index: u32) -> Value {
        match self {
            ProtocolVersion::V2 => {
                serde_json::to_value(ScimListResponse::new(resources, total_results, start_index))
                    .unwrap_or(Value::Null)
            }
            ProtocolVersion::V1 => json!({
                "schemas": [SCHEMA_CORE_V1],
                "totalResults": total_results,
                "itemsPerPage": resources.len(),
                "startIndex": start_index,
                "Resources": resources,
            }),
        }
    }

    /// Encode an error body. SCIM 1.1 wraps errors in an `Errors` array.
    pub fn encode_error(self, error: &ScimErrorResponse) -> Value {
        match self {
            ProtocolVersion::V2 => serde_json::to_value(error).unwrap_or(Value::Null),
            ProtocolVersion::V1 => json!({
                "Errors": [{
                    "description": error.detail,
                    "code": error.status,
                }]
            }),
        }
    }
}

fn translate(urn: &str, forward: bool) -> Option<&'static str> {
    URN_MAP.iter().find_map(|(v2, v1)| {
        let (from, to) = if forward { (*v2, *v1) } else { (*v1, *v2) };
        from.eq_ignore_ascii_case(urn).then_some(to)
    })
}

fn to_v1(resource: Value) -> Value {
    let Value::Object(object) = resource else {
        return resource;
    };

    let mut encoded = Map::new();
    for (key, value) in object {
        match key.as_str() {
            "schemas" => {
                let mut schemas: Vec<Value> = Vec::new();
                for urn in value.as_array().into_iter().flatten() {
                    let mapped = urn
                        .as_str()
                        .and_then(|u| translate(u, true))
                        .map(|u| Value::String(u.to_string()))
                        .unwrap_or_else(|| urn.clone());
                    if !schemas.contains(&mapped) {
                        schemas.push(mapped);
                    }
                }
                encoded.insert(key, Value::Array(schemas));
            }
            "meta" => {
                let mut meta = value;
                if let Some(meta) = meta.as_object_mut() {
                    meta.remove("resourceType");
                }
                encoded.insert(key, meta);
            }
            _ => {
                let key = translate(&key, true).map(str::to_string).unwrap_or(key);
                encoded.insert(key, value);
            }
        }
    }
    Value::Object(encoded)
}

fn from_v1(body: Value, core_schema: &str) -> Value {
    let Value::Object(object) = body else {
        return body;
    };

    let mut decoded = Map::new();
    for (key, value) in object {
        if key == "schemas" {
            let schemas: Vec<Value> = value
                .as_array()
                .into_iter()
                .flatten()
                .map(|urn| match urn.as_str() {
                    Some(u) if u.eq_ignore_ascii_case(SCHEMA_CORE_V1) => json!(core_schema),
                    Some(u) => translate(u, false)
                        .map(|v2| json!(v2))
                        .unwrap_or_else(|| urn.clone()),
                    None => urn.clone(),
                })
                .collect();
            decoded.insert(key, Value::Array(schemas));
        } else if key.eq_ignore_ascii_case(SCHEMA_ENTERPRISE_V1) {
            decoded.insert(SCHEMA_ENTERPRISE_USER.to_string(), value);
        } else {
            decoded.insert(key, value);
        }
    }
    Value::Object(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Value {
        json!({
            "schemas": [SCHEMA_USER, SCHEMA_ENTERPRISE_USER],
            "id": "2819c223",
            "userName": "bjensen",
            "meta": {"resourceType": "User", "version": "W/\"abc\""},
            SCHEMA_ENTERPRISE_USER: {"employeeNumber": "701984"}
        })
    }

    #[test]
    fn test_v2_is_canonical() {
        assert_eq!(ProtocolVersion::V2.encode_resource(user()), user());
    }

    #[test]
    fn test_v1_resource_shape() {
        let encoded = ProtocolVersion::V1.encode_resource(user());
        assert_eq!(
            encoded,
            json!({
                "schemas": [SCHEMA_CORE_V1, SCHEMA_ENTERPRISE_V1],
                "id": "2819c223",
                "userName": "bjensen",
                "meta": {"version": "W/\"abc\""},
                SCHEMA_ENTERPRISE_V1: {"employeeNumber": "701984"}
            })
        );
    }

    #[test]
    fn test_v1_decode_restores_canonical_urns() {
        let body = json!({
            "schemas": [SCHEMA_CORE_V1, SCHEMA_ENTERPRISE_V1],
            "userName": "bjensen",
            SCHEMA_ENTERPRISE_V1: {"employeeNumber": "701984"}
        });
        let decoded = ProtocolVersion::V1.decode_resource(body, SCHEMA_USER);
        assert_eq!(decoded["schemas"], json!([SCHEMA_USER, SCHEMA_ENTERPRISE_USER]));
        assert_eq!(decoded[SCHEMA_ENTERPRISE_USER]["employeeNumber"], "701984");
    }

    #[test]
    fn test_list_envelopes() {
        let v2 = ProtocolVersion::V2.encode_list(vec![json!({"id": "1"})], 5, 1);
        assert_eq!(
            v2["schemas"],
            json!(["urn:ietf:params:scim:api:messages:2.0:ListResponse"])
        );
        assert_eq!(v2["itemsPerPage"], 1);

        let v1 = ProtocolVersion::V1.encode_list(vec![json!({"id": "1"})], 5, 1);
        assert_eq!(v1["schemas"], json!([SCHEMA_CORE_V1]));
        assert_eq!(v1["totalResults"], 5);
        assert_eq!(v1["Resources"][0]["id"], "1");
    }

    #[test]
    fn test_v1_error_envelope() {
        let error = ScimErrorResponse::not_found("User 42 not found");
        let body = ProtocolVersion::V1.encode_error(&error);
        assert_eq!(body["Errors"][0]["code"], "404");
        assert_eq!(body["Errors"][0]["description"], "User 42 not found");
    }
}
