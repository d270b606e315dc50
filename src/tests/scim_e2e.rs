//! End-to-end tests for the SCIM HTTP surface.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{
    AppState, build_app,
    config::GatewayConfig,
    scim::{
        SCHEMA_ENTERPRISE_USER, SCHEMA_ERROR, SCHEMA_GROUP, SCHEMA_LIST_RESPONSE, SCHEMA_PATCH_OP,
        SCHEMA_SEARCH_REQUEST, SCHEMA_USER,
        wire::{SCHEMA_CORE_V1, SCHEMA_ENTERPRISE_V1},
    },
};

struct TestHarness {
    app: Router,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(r#"
[scim]
legacy_v1 = true
"#)
    }

    fn with_config(config: &str) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = GatewayConfig::from_str(config).expect("Failed to parse test config");
        Self {
            app: build_app(AppState::new(config)),
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "scim.example.com");
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/scim+json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, headers, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self.send("GET", uri, None).await;
        (status, body)
    }

    async fn create_user(&self, user_name: &str) -> Value {
        let (status, _, body) = self
            .send(
                "POST",
                "/scim/v2/Users",
                Some(json!({
                    "schemas": [SCHEMA_USER],
                    "userName": user_name,
                    "name": {"givenName": "Barbara", "familyName": "Jensen"},
                    "emails": [
                        {
                            "value": format!("{user_name}@example.com"),
                            "type": "work",
                            "primary": true
                        },
                        {"value": format!("{user_name}@home.example"), "type": "home"}
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn patch(&self, uri: &str, operations: Value) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(
                "PATCH",
                uri,
                Some(json!({"schemas": [SCHEMA_PATCH_OP], "Operations": operations})),
            )
            .await;
        (status, body)
    }
}

fn id_of(resource: &Value) -> &str {
    resource["id"].as_str().unwrap()
}

#[tokio::test]
async fn test_create_user_returns_location_and_etag() {
    let harness = TestHarness::new();
    let (status, headers, body) = harness
        .send(
            "POST",
            "/scim/v2/Users",
            Some(json!({"schemas": [SCHEMA_USER], "userName": "bjensen"})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers[header::CONTENT_TYPE], "application/scim+json");
    let id = id_of(&body);
    assert_eq!(
        headers[header::LOCATION],
        format!("http://scim.example.com/scim/v2/Users/{id}").as_str()
    );
    assert_eq!(
        headers[header::ETAG].to_str().unwrap(),
        body["meta"]["version"].as_str().unwrap()
    );
}

#[tokio::test]
async fn test_get_missing_user_is_scim_error() {
    let harness = TestHarness::new();
    let (status, body) = harness.get("/scim/v2/Users/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["schemas"][0], SCHEMA_ERROR);
    assert_eq!(body["status"], "404");
}

#[tokio::test]
async fn test_invalid_json_is_invalid_syntax() {
    let harness = TestHarness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/scim/v2/Users")
        .body(Body::from("{not json"))
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["scimType"], "invalidSyntax");
}

#[tokio::test]
async fn test_list_with_filter_and_projection() {
    let harness = TestHarness::new();
    harness.create_user("alice").await;
    harness.create_user("bob").await;

    let (status, body) = harness
        .get("/scim/v2/Users?filter=userName%20eq%20%22bob%22&attributes=userName")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schemas"][0], SCHEMA_LIST_RESPONSE);
    assert_eq!(body["totalResults"], 1);
    let user = &body["Resources"][0];
    assert_eq!(user["userName"], "bob");
    assert!(user.get("id").is_some());
    assert!(user.get("emails").is_none());
}

#[tokio::test]
async fn test_list_with_value_path_filter() {
    let harness = TestHarness::new();
    harness.create_user("alice").await;
    harness.create_user("bob").await;

    let filter = "emails[type eq \"work\" and value ew \"example.com\"] and userName sw \"a\"";
    let uri = format!(
        "/scim/v2/Users?filter={}",
        filter
            .replace(' ', "%20")
            .replace('"', "%22")
            .replace('[', "%5B")
            .replace(']', "%5D")
    );
    let (status, body) = harness.get(&uri).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["Resources"][0]["userName"], "alice");
}

#[tokio::test]
async fn test_invalid_filter_is_bad_request() {
    let harness = TestHarness::new();
    let (status, body) = harness
        .get("/scim/v2/Users?filter=userName%20eq")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["scimType"], "invalidFilter");
}

#[tokio::test]
async fn test_non_ascii_filter_is_invalid_filter() {
    let harness = TestHarness::new();
    harness.create_user("alice").await;

    // userName eq "x" or ab€c pr
    let (status, body) = harness
        .get("/scim/v2/Users?filter=userName%20eq%20%22x%22%20or%20ab%E2%82%ACc%20pr")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["schemas"][0], SCHEMA_ERROR);
    assert_eq!(body["scimType"], "invalidFilter");
}

#[tokio::test]
async fn test_negative_paging_is_clamped() {
    let harness = TestHarness::new();
    harness.create_user("alice").await;
    harness.create_user("bob").await;

    let (status, body) = harness.get("/scim/v2/Users?startIndex=-1").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["startIndex"], 1);
    assert_eq!(body["totalResults"], 2);
    assert_eq!(body["Resources"].as_array().map(Vec::len), Some(2));

    let (status, body) = harness.get("/scim/v2/Users?count=-1").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["totalResults"], 2);
    assert_eq!(body["itemsPerPage"], 0);
}

#[tokio::test]
async fn test_search_endpoint() {
    let harness = TestHarness::new();
    harness.create_user("alice").await;
    harness.create_user("bob").await;

    let (status, _, body) = harness
        .send(
            "POST",
            "/scim/v2/Users/.search",
            Some(json!({
                "schemas": [SCHEMA_SEARCH_REQUEST],
                "filter": "userName pr",
                "sortBy": "userName",
                "sortOrder": "descending",
                "count": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 2);
    assert_eq!(body["itemsPerPage"], 1);
    assert_eq!(body["Resources"][0]["userName"], "bob");
}

#[tokio::test]
async fn test_patch_user_multi_valued() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, body) = harness
        .patch(
            &uri,
            json!([
                {
                    "op": "replace",
                    "path": "emails[type eq \"work\"].value",
                    "value": "babs@example.com"
                },
                {
                    "op": "add",
                    "path": "phoneNumbers",
                    "value": [{"value": "555-555-8377", "type": "work"}]
                },
                {"op": "remove", "path": "emails[type eq \"home\"]"}
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let emails = body["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["value"], "babs@example.com");
    assert_eq!(body["phoneNumbers"][0]["value"], "555-555-8377");
    assert_ne!(body["meta"]["version"], user["meta"]["version"]);
}

#[tokio::test]
async fn test_patch_failure_leaves_resource_unchanged() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, body) = harness
        .patch(
            &uri,
            json!([
                {"op": "replace", "path": "displayName", "value": "Babs"},
                {"op": "remove", "path": "emails[type eq \"other\"]"}
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["scimType"], "noTarget");

    let (_, stored) = harness.get(&uri).await;
    assert!(stored.get("displayName").is_none());
    assert_eq!(stored["meta"]["version"], user["meta"]["version"]);
}

#[tokio::test]
async fn test_patch_read_only_is_mutability() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, body) = harness
        .patch(&uri, json!([{"op": "replace", "path": "id", "value": "other"}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["scimType"], "mutability");
}

#[tokio::test]
async fn test_patch_enterprise_extension() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, body) = harness
        .patch(
            &uri,
            json!([{
                "op": "add",
                "path": format!("{SCHEMA_ENTERPRISE_USER}:employeeNumber"),
                "value": "701984"
            }]),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body[SCHEMA_ENTERPRISE_USER]["employeeNumber"], "701984");
    assert!(
        body["schemas"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s == SCHEMA_ENTERPRISE_USER)
    );
}

#[tokio::test]
async fn test_malformed_patch_body() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, _, body) = harness
        .send(
            "PATCH",
            &uri,
            Some(json!({
                "schemas": [SCHEMA_USER],
                "Operations": [{"op": "add", "path": "title", "value": "x"}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["scimType"], "invalidSyntax");

    let (status, body) = harness
        .patch(&uri, json!([{"op": "move", "path": "title"}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["scimType"], "invalidSyntax");
}

#[tokio::test]
async fn test_group_membership_lifecycle() {
    let harness = TestHarness::new();
    let alice = harness.create_user("alice").await;
    let bob = harness.create_user("bob").await;

    let (status, _, group) = harness
        .send(
            "POST",
            "/scim/v2/Groups",
            Some(json!({
                "schemas": [SCHEMA_GROUP],
                "displayName": "Tour Guides",
                "members": [{"value": id_of(&alice)}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{group}");
    let group_uri = format!("/scim/v2/Groups/{}", id_of(&group));

    let (status, group) = harness
        .patch(
            &group_uri,
            json!([{"op": "add", "path": "members", "value": [{"value": id_of(&bob)}]}]),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{group}");
    assert_eq!(group["members"].as_array().unwrap().len(), 2);

    let (_, bob_view) = harness
        .get(&format!("/scim/v2/Users/{}", id_of(&bob)))
        .await;
    assert_eq!(bob_view["groups"][0]["value"], group["id"]);

    let (status, group) = harness
        .patch(
            &group_uri,
            json!([{
                "op": "remove",
                "path": format!("members[value eq \"{}\"]", id_of(&alice))
            }]),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{group}");
    assert_eq!(group["members"][0]["value"], bob["id"]);

    let (status, _, _) = harness
        .send("DELETE", &format!("/scim/v2/Users/{}", id_of(&bob)), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, group) = harness.get(&group_uri).await;
    assert!(group.get("members").is_none());
}

#[tokio::test]
async fn test_replace_user() {
    let harness = TestHarness::new();
    let user = harness.create_user("bjensen").await;
    let uri = format!("/scim/v2/Users/{}", id_of(&user));

    let (status, _, body) = harness
        .send(
            "PUT",
            &uri,
            Some(json!({"schemas": [SCHEMA_USER], "userName": "bjensen", "active": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert!(body.get("emails").is_none());
    assert_eq!(body["meta"]["created"], user["meta"]["created"]);
}

#[tokio::test]
async fn test_duplicate_user_name_conflicts() {
    let harness = TestHarness::new();
    harness.create_user("bjensen").await;
    let (status, _, body) = harness
        .send(
            "POST",
            "/scim/v2/Users",
            Some(json!({"schemas": [SCHEMA_USER], "userName": "BJensen"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["scimType"], "uniqueness");
}

#[tokio::test]
async fn test_discovery_endpoints() {
    let harness = TestHarness::new();

    let (status, config) = harness.get("/scim/v2/ServiceProviderConfig").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["patch"]["supported"], true);
    assert_eq!(config["filter"]["maxResults"], 200);

    let (status, types) = harness.get("/scim/v2/ResourceTypes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(types["totalResults"], 2);

    let (status, user_type) = harness.get("/scim/v2/ResourceTypes/User").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user_type["schemaExtensions"][0]["schema"], SCHEMA_ENTERPRISE_USER);

    let (status, schema) = harness
        .get(&format!("/scim/v2/Schemas/{SCHEMA_USER}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schema["id"], SCHEMA_USER);

    let (status, _) = harness.get("/scim/v2/Schemas/urn:nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_legacy_v1_wire_format() {
    let harness = TestHarness::new();
    let (status, _, created) = harness
        .send(
            "POST",
            "/scim/v1/Users",
            Some(json!({
                "schemas": [SCHEMA_CORE_V1, SCHEMA_ENTERPRISE_V1],
                "userName": "legacy",
                SCHEMA_ENTERPRISE_V1: {"department": "Tour Operations"}
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["schemas"], json!([SCHEMA_CORE_V1, SCHEMA_ENTERPRISE_V1]));
    assert_eq!(created[SCHEMA_ENTERPRISE_V1]["department"], "Tour Operations");
    assert!(created["meta"].get("resourceType").is_none());

    // The same resource through the current protocol
    let (_, current) = harness
        .get(&format!("/scim/v2/Users/{}", id_of(&created)))
        .await;
    assert_eq!(current[SCHEMA_ENTERPRISE_USER]["department"], "Tour Operations");
    assert_eq!(current["meta"]["resourceType"], "User");

    let (_, list) = harness.get("/scim/v1/Users").await;
    assert_eq!(list["schemas"], json!([SCHEMA_CORE_V1]));
    assert_eq!(list["totalResults"], 1);

    let (status, error) = harness.get("/scim/v1/Users/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["Errors"][0]["code"], "404");
}

#[tokio::test]
async fn test_legacy_v1_disabled_by_default() {
    let harness = TestHarness::with_config("");
    let (status, _) = harness.get("/scim/v1/Users").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_filtering_is_not_implemented() {
    let harness = TestHarness::with_config(
        r#"
[scim.filter]
enabled = false
"#,
    );
    let (status, body) = harness
        .get("/scim/v2/Users?filter=userName%20pr")
        .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["status"], "501");
}

#[tokio::test]
async fn test_health_endpoints() {
    let harness = TestHarness::new();
    harness.create_user("bjensen").await;
    let (status, body) = harness.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"]["users"], 1);

    let (status, _, _) = harness.send("GET", "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
}
