use async_trait::async_trait;
use serde_json::Value;

use crate::{
    db::error::DbResult,
    scim::{CompiledFilter, ResourceKind},
};

/// Storage for canonical SCIM resource trees.
///
/// Resources are stored whole, with `id` and `meta` already assigned. Reads
/// return owned copies; nothing outside the store can mutate a stored resource.
#[async_trait]
pub trait ResourceRepo: Send + Sync {
    /// Store a new resource. Fails with `Conflict` when its `id` is taken.
    async fn insert(&self, kind: ResourceKind, resource: Value) -> DbResult<Value>;

    async fn get(&self, kind: ResourceKind, id: &str) -> DbResult<Option<Value>>;

    /// Replace a stored resource. Fails with `NotFound` when absent.
    async fn update(&self, kind: ResourceKind, id: &str, resource: Value) -> DbResult<Value>;

    /// Delete a resource. Fails with `NotFound` when absent.
    async fn delete(&self, kind: ResourceKind, id: &str) -> DbResult<()>;

    /// All resources of `kind` matching `filter`, in insertion order.
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&CompiledFilter>,
    ) -> DbResult<Vec<Value>>;

    /// Find a resource whose top-level string `attribute` equals `value`,
    /// ignoring `exclude_id`. Comparison ignores ASCII case unless `case_exact`.
    async fn find_by_attribute(
        &self,
        kind: ResourceKind,
        attribute: &str,
        value: &str,
        case_exact: bool,
        exclude_id: Option<&str>,
    ) -> DbResult<Option<Value>>;

    async fn count(&self, kind: ResourceKind) -> DbResult<usize>;
}
