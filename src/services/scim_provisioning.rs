//! SCIM 2.0 User and Group Provisioning Service
//!
//! Orchestrates provisioning and deprovisioning of Users and Groups on behalf of
//! identity providers. Resources are held as canonical SCIM 2.0 trees; request
//! bodies are type-checked by running them through the PATCH engine against an
//! empty resource, so create, replace and patch share one set of value rules.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::ScimConfig,
    db::{DbError, ResourceRepo},
    scim::{
        CompiledFilter, Mutability, PatchEngine, PatchError, PatchOp, PatchRequest, Projection,
        ResourceKind, SchemaLookup, SchemaRegistry, ScimError, ScimErrorResponse, ScimListParams,
        ScimMeta, ScimPath, SortKey, compile, compile::member, types::format_timestamp,
    },
};

/// SCIM provisioning error types
#[derive(Debug, thiserror::Error)]
pub enum ScimProvisioningError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("{kind} '{id}' not found", kind = .0.name(), id = .1)]
    NotFound(ResourceKind, String),

    /// A uniqueness constraint (e.g. userName) would be violated
    #[error("{0}")]
    Uniqueness(String),

    #[error("{0}")]
    InvalidValue(String),

    #[error("{0}")]
    InvalidSyntax(String),

    /// Query filter or path could not be compiled
    #[error(transparent)]
    Filter(#[from] ScimError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    /// A protocol feature switched off in configuration
    #[error("{0} is not supported by this server")]
    NotImplemented(&'static str),
}

impl From<ScimProvisioningError> for ScimErrorResponse {
    fn from(e: ScimProvisioningError) -> Self {
        let detail = e.to_string();
        match e {
            ScimProvisioningError::Database(DbError::NotFound) => {
                ScimErrorResponse::not_found("Resource not found")
            }
            ScimProvisioningError::Database(DbError::Conflict(msg)) => {
                ScimErrorResponse::uniqueness(msg)
            }
            ScimProvisioningError::Database(_) => ScimErrorResponse::internal(detail),
            ScimProvisioningError::NotFound(..) => ScimErrorResponse::not_found(detail),
            ScimProvisioningError::Uniqueness(msg) => ScimErrorResponse::uniqueness(msg),
            ScimProvisioningError::InvalidValue(msg) => ScimErrorResponse::invalid_value(msg),
            ScimProvisioningError::InvalidSyntax(msg) => ScimErrorResponse::invalid_syntax(msg),
            ScimProvisioningError::Filter(err) => err.into(),
            ScimProvisioningError::Patch(err) => err.into(),
            ScimProvisioningError::NotImplemented(_) => ScimErrorResponse::not_implemented(detail),
        }
    }
}

/// Result type for SCIM provisioning operations
pub type ProvisioningResult<T> = Result<T, ScimProvisioningError>;

/// One page of a list or search request.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub resources: Vec<Value>,
    pub total_results: u32,
    pub start_index: u32,
}

/// SCIM User and Group provisioning.
#[derive(Clone)]
pub struct ScimProvisioningService {
    repo: Arc<dyn ResourceRepo>,
    schema: Arc<SchemaRegistry>,
    config: Arc<ScimConfig>,
    /// Held from the uniqueness check through the store write, so concurrent
    /// writes cannot both claim one userName or lose each other's PATCH.
    writes: Arc<Mutex<()>>,
}

impl ScimProvisioningService {
    pub fn new(
        repo: Arc<dyn ResourceRepo>,
        schema: Arc<SchemaRegistry>,
        config: Arc<ScimConfig>,
    ) -> Self {
        Self {
            repo,
            schema,
            config,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Create a resource from a request body.
    pub async fn create(
        &self,
        kind: ResourceKind,
        body: Value,
        base_url: &str,
    ) -> ProvisioningResult<Value> {
        let mut resource = self.build(kind, body)?;
        let _writes = self.writes.lock().await;
        self.check_uniqueness(kind, &resource, None).await?;
        if kind == ResourceKind::Group {
            self.resolve_members(&mut resource, base_url).await?;
        }

        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let meta = ScimMeta::created_at(kind.name(), now)
            .with_location(format!("{}{}/{}", base_url, kind.endpoint(), id));
        if let Some(object) = resource.as_object_mut() {
            object.insert("id".into(), json!(id));
            object.insert("meta".into(), meta.to_value());
        }
        stamp_version(&mut resource);

        let stored = self.repo.insert(kind, resource).await?;
        debug!(resource_type = kind.name(), resource_id = %id, "Created SCIM resource");
        self.decorate(kind, stored, base_url).await
    }

    pub async fn get(
        &self,
        kind: ResourceKind,
        id: &str,
        base_url: &str,
    ) -> ProvisioningResult<Value> {
        let stored = self.fetch(kind, id).await?;
        self.decorate(kind, stored, base_url).await
    }

    /// Replace a resource (PUT). `id` and `meta.created` survive.
    pub async fn replace(
        &self,
        kind: ResourceKind,
        id: &str,
        body: Value,
        base_url: &str,
    ) -> ProvisioningResult<Value> {
        let mut resource = self.build(kind, body)?;
        let _writes = self.writes.lock().await;
        let existing = self.fetch(kind, id).await?;
        self.check_uniqueness(kind, &resource, Some(id)).await?;
        if kind == ResourceKind::Group {
            self.resolve_members(&mut resource, base_url).await?;
        }
        if let (Some(object), Some(existing)) = (resource.as_object_mut(), existing.as_object()) {
            for key in ["id", "meta"] {
                if let Some(value) = existing.get(key) {
                    object.insert(key.into(), value.clone());
                }
            }
        }

        let stored = self.persist_if_changed(kind, id, &existing, resource).await?;
        self.decorate(kind, stored, base_url).await
    }

    /// Apply a PATCH request. Nothing is stored unless every operation succeeds.
    pub async fn patch(
        &self,
        kind: ResourceKind,
        id: &str,
        request: &PatchRequest,
        base_url: &str,
    ) -> ProvisioningResult<Value> {
        if !self.config.patch.enabled {
            return Err(ScimProvisioningError::NotImplemented("PATCH"));
        }
        request.validate()?;

        let _writes = self.writes.lock().await;
        let existing = self.fetch(kind, id).await?;
        let mut patched =
            PatchEngine::new(self.schema.as_ref(), kind).apply(&existing, &request.operations)?;
        self.check_uniqueness(kind, &patched, Some(id)).await?;
        if kind == ResourceKind::Group {
            self.resolve_members(&mut patched, base_url).await?;
        }

        debug!(
            resource_type = kind.name(),
            resource_id = %id,
            operations = request.operations.len(),
            "Applied SCIM PATCH"
        );
        let stored = self.persist_if_changed(kind, id, &existing, patched).await?;
        self.decorate(kind, stored, base_url).await
    }

    /// Delete a resource. A deleted user also leaves every group.
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> ProvisioningResult<()> {
        let _writes = self.writes.lock().await;
        match self.repo.delete(kind, id).await {
            Err(DbError::NotFound) => {
                return Err(ScimProvisioningError::NotFound(kind, id.to_string()));
            }
            other => other?,
        }
        debug!(resource_type = kind.name(), resource_id = %id, "Deleted SCIM resource");

        for group in self.repo.list(ResourceKind::Group, None).await? {
            let Some(group_id) = group.get("id").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            let mut updated = group.clone();
            let removed = updated
                .get_mut("members")
                .and_then(Value::as_array_mut)
                .map(|members| {
                    let before = members.len();
                    members.retain(|m| member(m, "value").and_then(Value::as_str) != Some(id));
                    before != members.len()
                })
                .unwrap_or(false);
            if removed {
                if updated["members"].as_array().is_some_and(|m| m.is_empty())
                    && let Some(object) = updated.as_object_mut()
                {
                    object.remove("members");
                }
                self.persist_if_changed(ResourceKind::Group, &group_id, &group, updated)
                    .await?;
                debug!(group_id = %group_id, member_id = %id, "Removed deleted member from group");
            }
        }
        Ok(())
    }

    /// List or search resources.
    pub async fn query(
        &self,
        kind: ResourceKind,
        params: &ScimListParams,
        base_url: &str,
    ) -> ProvisioningResult<QueryPage> {
        let filter = match params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            Some(_) if !self.config.filter.enabled => {
                return Err(ScimProvisioningError::NotImplemented("filtering"));
            }
            Some(text) => Some(self.compile_filter(kind, text)?),
            None => None,
        };
        let sort_key = match params.sort_by.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(_) if !self.config.sort.enabled => {
                return Err(ScimProvisioningError::NotImplemented("sorting"));
            }
            Some(text) => {
                let key = ScimPath::parse(text, self.schema.as_ref())
                    .and_then(|path| SortKey::compile(&path, self.schema.as_ref(), kind))
                    .map_err(|e| ScimProvisioningError::InvalidValue(format!("sortBy: {}", e)))?;
                Some(key)
            }
            None => None,
        };

        // A user's `groups` is derived, so users are decorated before filtering
        let mut matched = Vec::new();
        for resource in self.repo.list(kind, None).await? {
            let resource = self.decorate(kind, resource, base_url).await?;
            if filter.as_ref().is_none_or(|f| f.matches(&resource)) {
                matched.push(resource);
            }
        }

        if let Some(key) = &sort_key {
            let descending = params.is_descending();
            matched.sort_by(|a, b| {
                let ord = key.compare(a, b);
                if descending { ord.reverse() } else { ord }
            });
        }

        let total_results = matched.len() as u32;
        let start_index = u32::try_from(params.start_index.max(1)).unwrap_or(u32::MAX);
        let count = params
            .count
            .map_or(self.config.default_count, |count| {
                u32::try_from(count.max(0)).unwrap_or(u32::MAX)
            })
            .min(self.config.max_results);
        let resources = matched
            .into_iter()
            .skip(start_index as usize - 1)
            .take(count as usize)
            .collect();

        Ok(QueryPage {
            resources,
            total_results,
            start_index,
        })
    }

    /// Parse `attributes` / `excludedAttributes` for `kind`.
    pub fn projection(
        &self,
        kind: ResourceKind,
        attributes: Option<&str>,
        excluded_attributes: Option<&str>,
    ) -> ProvisioningResult<Projection> {
        Projection::parse(attributes, excluded_attributes, self.schema.as_ref(), kind)
            .map_err(|e| ScimProvisioningError::InvalidValue(e.to_string()))
    }

    pub fn project(&self, kind: ResourceKind, resource: &Value, projection: &Projection) -> Value {
        projection.apply(resource, self.schema.as_ref(), kind)
    }

    fn compile_filter(&self, kind: ResourceKind, text: &str) -> ProvisioningResult<CompiledFilter> {
        let path = ScimPath::parse(text, self.schema.as_ref())?;
        Ok(compile(&path, self.schema.as_ref(), kind)?)
    }

    async fn fetch(&self, kind: ResourceKind, id: &str) -> ProvisioningResult<Value> {
        self.repo
            .get(kind, id)
            .await?
            .ok_or_else(|| ScimProvisioningError::NotFound(kind, id.to_string()))
    }

    /// Build a canonical resource from a create/replace body.
    fn build(&self, kind: ResourceKind, body: Value) -> ProvisioningResult<Value> {
        let Value::Object(mut body) = body else {
            return Err(ScimProvisioningError::InvalidSyntax(
                "request body must be a JSON object".into(),
            ));
        };

        let schemas: Vec<String> = body
            .remove("schemas")
            .and_then(|s| serde_json::from_value(s).ok())
            .ok_or_else(|| {
                ScimProvisioningError::InvalidValue(
                    "'schemas' must be a list of schema URNs".into(),
                )
            })?;
        let declares = |urn: &str| schemas.iter().any(|s| s.eq_ignore_ascii_case(urn));
        if !declares(kind.core_schema()) {
            return Err(ScimProvisioningError::InvalidValue(format!(
                "'schemas' must contain '{}'",
                kind.core_schema()
            )));
        }
        for urn in self.schema.required_extensions(kind) {
            if !declares(&urn) {
                return Err(ScimProvisioningError::InvalidValue(format!(
                    "'schemas' must contain the required extension '{}'",
                    urn
                )));
            }
        }
        for urn in &schemas {
            if !urn.eq_ignore_ascii_case(kind.core_schema())
                && self.schema.extension(kind, urn).is_none()
            {
                return Err(ScimProvisioningError::InvalidValue(format!(
                    "schema '{}' is not supported for {}",
                    urn,
                    kind.name()
                )));
            }
        }

        // Read-only attributes are assigned by the server
        body.retain(|key, _| {
            self.schema
                .attribute(kind, key)
                .is_none_or(|a| a.mutability != Mutability::ReadOnly)
        });

        let mut resource = json!({ "schemas": [kind.core_schema()] });
        let op = PatchOp::Replace {
            path: None,
            value: Value::Object(body),
        };
        PatchEngine::new(self.schema.as_ref(), kind)
            .apply_operation(&mut resource, &op)
            .map_err(|e| ScimProvisioningError::InvalidValue(e.detail))?;

        // Declared extensions stay declared even when the body carries no attributes for them
        if let Some(declared) = resource.get_mut("schemas").and_then(Value::as_array_mut) {
            for urn in &schemas {
                if let Some(extension) = self.schema.extension(kind, urn)
                    && !declared.iter().any(|s| s.as_str() == Some(extension.id.as_str()))
                {
                    declared.push(json!(extension.id));
                }
            }
        }

        for attribute in &self.schema.core_schema(kind).attributes {
            if attribute.required
                && member(&resource, &attribute.name).is_none_or(|v| v.is_null())
            {
                return Err(ScimProvisioningError::InvalidValue(format!(
                    "'{}' is required",
                    attribute.name
                )));
            }
        }
        Ok(resource)
    }

    /// userName is unique across Users, case-insensitively.
    async fn check_uniqueness(
        &self,
        kind: ResourceKind,
        resource: &Value,
        exclude_id: Option<&str>,
    ) -> ProvisioningResult<()> {
        if kind != ResourceKind::User {
            return Ok(());
        }
        let Some(user_name) = member(resource, "userName").and_then(Value::as_str) else {
            return Ok(());
        };
        let case_exact = self
            .schema
            .lookup(kind, "userName")
            .is_some_and(|meta| meta.case_exact);
        if self
            .repo
            .find_by_attribute(kind, "userName", user_name, case_exact, exclude_id)
            .await?
            .is_some()
        {
            return Err(ScimProvisioningError::Uniqueness(format!(
                "User with userName '{}' already exists",
                user_name
            )));
        }
        Ok(())
    }

    /// Check that every group member exists, fill in `type`, `display` and
    /// `$ref`, and drop repeated members.
    async fn resolve_members(&self, group: &mut Value, base_url: &str) -> ProvisioningResult<()> {
        let Some(members) = group.get_mut("members").and_then(Value::as_array_mut) else {
            return Ok(());
        };

        let mut resolved: Vec<Value> = Vec::with_capacity(members.len());
        for entry in members.drain(..) {
            let Some(member_id) = member(&entry, "value")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                return Err(ScimProvisioningError::InvalidValue(
                    "group members need a 'value'".into(),
                ));
            };
            if resolved
                .iter()
                .any(|m| member(m, "value").and_then(Value::as_str) == Some(member_id.as_str()))
            {
                continue;
            }

            let (kind, target) = match self.repo.get(ResourceKind::User, &member_id).await? {
                Some(user) => (ResourceKind::User, user),
                None => match self.repo.get(ResourceKind::Group, &member_id).await? {
                    Some(group) => (ResourceKind::Group, group),
                    None => {
                        return Err(ScimProvisioningError::InvalidValue(format!(
                            "member '{}' does not exist",
                            member_id
                        )));
                    }
                },
            };

            let mut entry = match entry {
                Value::Object(object) => object,
                _ => Map::new(),
            };
            entry.insert("value".into(), json!(member_id));
            entry
                .entry("type")
                .or_insert_with(|| json!(kind.name()));
            entry.entry("$ref").or_insert_with(|| {
                json!(format!("{}{}/{}", base_url, kind.endpoint(), member_id))
            });
            if let Some(display) = member(&target, "displayName")
                .or_else(|| member(&target, "userName"))
                .cloned()
            {
                entry.entry("display").or_insert(display);
            }
            resolved.push(Value::Object(entry));
        }
        *members = resolved;
        Ok(())
    }

    /// Store `updated` unless its version equals `existing`'s.
    async fn persist_if_changed(
        &self,
        kind: ResourceKind,
        id: &str,
        existing: &Value,
        mut updated: Value,
    ) -> ProvisioningResult<Value> {
        let version = version_of(&updated);
        if existing.pointer("/meta/version").and_then(Value::as_str) == Some(version.as_str()) {
            debug!(resource_type = kind.name(), resource_id = %id, "SCIM resource unchanged");
            return Ok(existing.clone());
        }

        if let Some(meta) = updated.get_mut("meta").and_then(Value::as_object_mut) {
            meta.insert("lastModified".into(), json!(format_timestamp(Utc::now())));
            meta.insert("version".into(), json!(version));
        } else {
            warn!(resource_type = kind.name(), resource_id = %id, "SCIM resource has no meta");
        }
        Ok(self.repo.update(kind, id, updated).await?)
    }

    /// Add derived attributes to a stored resource.
    async fn decorate(
        &self,
        kind: ResourceKind,
        mut resource: Value,
        base_url: &str,
    ) -> ProvisioningResult<Value> {
        if kind != ResourceKind::User {
            return Ok(resource);
        }
        let Some(user_id) = resource.get("id").and_then(Value::as_str).map(str::to_string) else {
            return Ok(resource);
        };

        let groups: Vec<Value> = self
            .repo
            .list(ResourceKind::Group, None)
            .await?
            .into_iter()
            .filter(|group| {
                member(group, "members")
                    .and_then(Value::as_array)
                    .is_some_and(|members| {
                        members.iter().any(|m| {
                            member(m, "value").and_then(Value::as_str) == Some(user_id.as_str())
                        })
                    })
            })
            .filter_map(|group| {
                let id = group.get("id")?.as_str()?.to_string();
                let mut entry = json!({
                    "value": id,
                    "$ref": format!("{}{}/{}", base_url, ResourceKind::Group.endpoint(), id),
                    "type": "direct",
                });
                if let Some(display) = member(&group, "displayName") {
                    entry["display"] = display.clone();
                }
                Some(entry)
            })
            .collect();

        if !groups.is_empty()
            && let Some(object) = resource.as_object_mut()
        {
            object.insert("groups".into(), Value::Array(groups));
        }
        Ok(resource)
    }
}

/// Weak ETag over everything but `meta`.
fn version_of(resource: &Value) -> String {
    let mut content = resource.clone();
    if let Some(object) = content.as_object_mut() {
        object.remove("meta");
    }
    let digest = Sha256::digest(content.to_string().as_bytes());
    format!("W/\"{}\"", hex::encode(digest))
}

fn stamp_version(resource: &mut Value) {
    let version = version_of(resource);
    if let Some(meta) = resource.get_mut("meta").and_then(Value::as_object_mut) {
        meta.insert("version".into(), json!(version));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        db::MemoryResourceRepo,
        scim::{
            ScimErrorType,
            types::{SCHEMA_ENTERPRISE_USER, SCHEMA_GROUP, SCHEMA_USER},
        },
    };

    const BASE: &str = "https://example.com/scim/v2";

    fn service_with(config: ScimConfig) -> ScimProvisioningService {
        ScimProvisioningService::new(
            Arc::new(MemoryResourceRepo::new()),
            Arc::new(config.schema_registry()),
            Arc::new(config),
        )
    }

    fn service() -> ScimProvisioningService {
        service_with(ScimConfig::default())
    }

    fn user_body(user_name: &str) -> Value {
        json!({
            "schemas": [SCHEMA_USER],
            "userName": user_name,
            "name": {"givenName": "Barbara", "familyName": "Jensen"},
            "emails": [{
                "value": format!("{user_name}@example.com"),
                "type": "work",
                "primary": true
            }]
        })
    }

    async fn create_user(service: &ScimProvisioningService, user_name: &str) -> String {
        let user = service
            .create(ResourceKind::User, user_body(user_name), BASE)
            .await
            .unwrap();
        user["id"].as_str().unwrap().to_string()
    }

    fn error_type(err: ScimProvisioningError) -> Option<ScimErrorType> {
        ScimErrorResponse::from(err).scim_type
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_meta() {
        let service = service();
        let user = service
            .create(ResourceKind::User, user_body("bjensen"), BASE)
            .await
            .unwrap();

        let id = user["id"].as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(user["meta"]["resourceType"], "User");
        assert_eq!(user["meta"]["location"], format!("{BASE}/Users/{id}"));
        assert!(user["meta"]["version"].as_str().unwrap().starts_with("W/\""));
        assert_eq!(user["meta"]["created"], user["meta"]["lastModified"]);
    }

    #[tokio::test]
    async fn test_create_ignores_client_read_only_attributes() {
        let service = service();
        let mut body = user_body("bjensen");
        body["id"] = json!("client-chosen");
        body["meta"] = json!({"resourceType": "Nope"});
        let user = service.create(ResourceKind::User, body, BASE).await.unwrap();
        assert_ne!(user["id"], "client-chosen");
        assert_eq!(user["meta"]["resourceType"], "User");
    }

    #[tokio::test]
    async fn test_create_validations() {
        let service = service();

        let err = service
            .create(ResourceKind::User, json!({"schemas": [SCHEMA_GROUP], "userName": "x"}), BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));

        let err = service
            .create(ResourceKind::User, json!({"schemas": [SCHEMA_USER]}), BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));

        let err = service
            .create(ResourceKind::User, json!({"schemas": [SCHEMA_USER], "userName": 42}), BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));

        let err = service
            .create(ResourceKind::User, json!(["not", "an", "object"]), BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidSyntax));
    }

    #[tokio::test]
    async fn test_create_requires_required_extension() {
        let mut config = ScimConfig::default();
        config.enterprise_extension.required = true;
        let service = service_with(config);

        let err = service
            .create(ResourceKind::User, user_body("bjensen"), BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));

        let mut body = user_body("bjensen");
        body["schemas"] = json!([SCHEMA_USER, SCHEMA_ENTERPRISE_USER]);
        body[SCHEMA_ENTERPRISE_USER] = json!({"employeeNumber": "701984"});
        let user = service.create(ResourceKind::User, body, BASE).await.unwrap();
        assert_eq!(user[SCHEMA_ENTERPRISE_USER]["employeeNumber"], "701984");
    }

    #[tokio::test]
    async fn test_duplicate_user_name_is_uniqueness() {
        let service = service();
        create_user(&service, "bjensen").await;
        let err = service
            .create(ResourceKind::User, user_body("BJENSEN"), BASE)
            .await
            .unwrap_err();
        let response = ScimErrorResponse::from(err);
        assert_eq!(response.status, "409");
        assert_eq!(response.scim_type, Some(ScimErrorType::Uniqueness));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_claim_user_name_once() {
        let service = service();
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                let user_name = if i % 2 == 0 { "bjensen" } else { "BJensen" };
                tokio::spawn(async move {
                    service
                        .create(ResourceKind::User, user_body(user_name), BASE)
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert_eq!(error_type(err), Some(ScimErrorType::Uniqueness)),
            }
        }
        assert_eq!(created, 1);

        let page = service
            .query(ResourceKind::User, &ScimListParams::default(), BASE)
            .await
            .unwrap();
        assert_eq!(page.total_results, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_patches_are_not_lost() {
        let service = service();
        let id = create_user(&service, "bjensen").await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let request = PatchRequest::new(vec![PatchOp::add(
                        "emails",
                        json!([{"value": format!("alias{i}@example.com"), "type": "other"}]),
                    )]);
                    service.patch(ResourceKind::User, &id, &request, BASE).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let user = service.get(ResourceKind::User, &id, BASE).await.unwrap();
        assert_eq!(user["emails"].as_array().map(Vec::len), Some(9));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let err = service()
            .get(ResourceKind::User, "missing", BASE)
            .await
            .unwrap_err();
        assert_eq!(ScimErrorResponse::from(err).status, "404");
    }

    #[tokio::test]
    async fn test_replace_keeps_id_and_created() {
        let service = service();
        let id = create_user(&service, "bjensen").await;
        let before = service.get(ResourceKind::User, &id, BASE).await.unwrap();

        let mut body = user_body("bjensen");
        body["title"] = json!("Tour Guide");
        let after = service
            .replace(ResourceKind::User, &id, body, BASE)
            .await
            .unwrap();
        assert_eq!(after["id"], before["id"]);
        assert_eq!(after["meta"]["created"], before["meta"]["created"]);
        assert_ne!(after["meta"]["version"], before["meta"]["version"]);
        assert_eq!(after["title"], "Tour Guide");
    }

    #[tokio::test]
    async fn test_replace_with_same_content_keeps_version() {
        let service = service();
        let id = create_user(&service, "bjensen").await;
        let before = service.get(ResourceKind::User, &id, BASE).await.unwrap();
        let after = service
            .replace(ResourceKind::User, &id, user_body("bjensen"), BASE)
            .await
            .unwrap();
        assert_eq!(after["meta"], before["meta"]);
    }

    #[tokio::test]
    async fn test_patch_is_atomic() {
        let service = service();
        let id = create_user(&service, "bjensen").await;
        let request = PatchRequest::new(vec![
            PatchOp::replace("title", json!("Changed")),
            PatchOp::remove("userName"),
        ]);
        let err = service
            .patch(ResourceKind::User, &id, &request, BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));

        let user = service.get(ResourceKind::User, &id, BASE).await.unwrap();
        assert!(user.get("title").is_none());
    }

    #[tokio::test]
    async fn test_patch_disabled() {
        let mut config = ScimConfig::default();
        config.patch.enabled = false;
        let service = service_with(config);
        let id = create_user(&service, "bjensen").await;
        let request = PatchRequest::new(vec![PatchOp::replace("title", json!("x"))]);
        let err = service
            .patch(ResourceKind::User, &id, &request, BASE)
            .await
            .unwrap_err();
        assert_eq!(ScimErrorResponse::from(err).status, "501");
    }

    #[tokio::test]
    async fn test_group_members_are_resolved_and_derived() {
        let service = service();
        let user_id = create_user(&service, "bjensen").await;

        let group = service
            .create(
                ResourceKind::Group,
                json!({
                    "schemas": [SCHEMA_GROUP],
                    "displayName": "Tour Guides",
                    "members": [{"value": user_id}, {"value": user_id}]
                }),
                BASE,
            )
            .await
            .unwrap();
        let members = group["members"].as_array().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["type"], "User");
        assert_eq!(members[0]["display"], "bjensen");
        assert_eq!(members[0]["$ref"], format!("{BASE}/Users/{user_id}"));

        let user = service.get(ResourceKind::User, &user_id, BASE).await.unwrap();
        assert_eq!(user["groups"][0]["value"], group["id"]);
        assert_eq!(user["groups"][0]["display"], "Tour Guides");
    }

    #[tokio::test]
    async fn test_unknown_member_is_invalid_value() {
        let err = service()
            .create(
                ResourceKind::Group,
                json!({
                    "schemas": [SCHEMA_GROUP],
                    "displayName": "Ghosts",
                    "members": [{"value": "nobody"}]
                }),
                BASE,
            )
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidValue));
    }

    #[tokio::test]
    async fn test_delete_user_leaves_groups() {
        let service = service();
        let alice = create_user(&service, "alice").await;
        let bob = create_user(&service, "bob").await;
        let group = service
            .create(
                ResourceKind::Group,
                json!({
                    "schemas": [SCHEMA_GROUP],
                    "displayName": "Admins",
                    "members": [{"value": alice}, {"value": bob}]
                }),
                BASE,
            )
            .await
            .unwrap();
        let group_id = group["id"].as_str().unwrap();

        service.delete(ResourceKind::User, &alice).await.unwrap();
        let group = service.get(ResourceKind::Group, group_id, BASE).await.unwrap();
        let members = group["members"].as_array().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["value"], bob.as_str());

        let err = service.delete(ResourceKind::User, &alice).await.unwrap_err();
        assert_eq!(ScimErrorResponse::from(err).status, "404");
    }

    #[tokio::test]
    async fn test_query_filter_sort_and_paging() {
        let service = service();
        for name in ["carol", "alice", "bob", "dave"] {
            create_user(&service, name).await;
        }

        let params = ScimListParams {
            filter: Some("userName ne \"dave\"".into()),
            sort_by: Some("userName".into()),
            start_index: 2,
            count: Some(5),
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.total_results, 3);
        assert_eq!(page.start_index, 2);
        let names: Vec<&str> = page
            .resources
            .iter()
            .filter_map(|u| u["userName"].as_str())
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let params = ScimListParams {
            sort_by: Some("userName".into()),
            sort_order: Some("descending".into()),
            start_index: 0,
            count: Some(1),
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.start_index, 1);
        assert_eq!(page.resources[0]["userName"], "dave");
    }

    #[tokio::test]
    async fn test_query_count_is_clamped() {
        let config = ScimConfig {
            max_results: 2,
            default_count: 1,
            ..ScimConfig::default()
        };
        let service = service_with(config);
        for name in ["a", "b", "c"] {
            create_user(&service, name).await;
        }

        let page = service
            .query(ResourceKind::User, &ScimListParams::default(), BASE)
            .await
            .unwrap();
        assert_eq!(page.resources.len(), 1);
        assert_eq!(page.total_results, 3);

        let params = ScimListParams {
            count: Some(50),
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.resources.len(), 2);
    }

    #[tokio::test]
    async fn test_query_clamps_negative_paging() {
        let service = service();
        for name in ["alice", "bob"] {
            create_user(&service, name).await;
        }

        let params = ScimListParams {
            start_index: -1,
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.start_index, 1);
        assert_eq!(page.resources.len(), 2);

        let params = ScimListParams {
            count: Some(-1),
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.total_results, 2);
        assert!(page.resources.is_empty());
    }

    #[tokio::test]
    async fn test_query_invalid_filter() {
        let params = ScimListParams {
            filter: Some("userName eq".into()),
            ..ScimListParams::default()
        };
        let err = service()
            .query(ResourceKind::User, &params, BASE)
            .await
            .unwrap_err();
        assert_eq!(error_type(err), Some(ScimErrorType::InvalidFilter));
    }

    #[tokio::test]
    async fn test_query_by_derived_groups() {
        let service = service();
        let user_id = create_user(&service, "alice").await;
        create_user(&service, "bob").await;
        let group = service
            .create(
                ResourceKind::Group,
                json!({
                    "schemas": [SCHEMA_GROUP],
                    "displayName": "Ops",
                    "members": [{"value": user_id}]
                }),
                BASE,
            )
            .await
            .unwrap();

        let params = ScimListParams {
            filter: Some(format!("groups.value eq \"{}\"", group["id"].as_str().unwrap())),
            ..ScimListParams::default()
        };
        let page = service.query(ResourceKind::User, &params, BASE).await.unwrap();
        assert_eq!(page.total_results, 1);
        assert_eq!(page.resources[0]["userName"], "alice");
    }

    #[test]
    fn test_version_ignores_meta() {
        let a = json!({"id": "1", "userName": "x", "meta": {"version": "old"}});
        let b = json!({"id": "1", "userName": "x"});
        assert_eq!(version_of(&a), version_of(&b));
        assert_ne!(version_of(&b), version_of(&json!({"id": "1", "userName": "y"})));
    }
}
