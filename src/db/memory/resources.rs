use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ResourceRepo,
    },
    scim::{CompiledFilter, ResourceKind, compile::member},
};

struct StoredResource {
    /// Insertion sequence, for stable list order
    seq: u64,
    resource: Value,
}

/// In-memory resource store using DashMap for concurrent access.
///
/// State lives only as long as the process; every node has its own store.
#[derive(Clone, Default)]
pub struct MemoryResourceRepo {
    resources: Arc<DashMap<(ResourceKind, String), StoredResource>>,
    next_seq: Arc<AtomicU64>,
}

impl MemoryResourceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn id_of(resource: &Value) -> DbResult<String> {
        resource
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DbError::Validation("resource has no id".into()))
    }

    /// Snapshot of one kind's resources in insertion order.
    fn snapshot(&self, kind: ResourceKind) -> Vec<(u64, Value)> {
        let mut rows: Vec<(u64, Value)> = self
            .resources
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| (entry.seq, entry.resource.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows
    }
}

#[async_trait]
impl ResourceRepo for MemoryResourceRepo {
    async fn insert(&self, kind: ResourceKind, resource: Value) -> DbResult<Value> {
        let id = Self::id_of(&resource)?;
        match self.resources.entry((kind, id)) {
            Entry::Occupied(entry) => Err(DbError::Conflict(format!(
                "{} '{}' already exists",
                kind.name(),
                entry.key().1
            ))),
            Entry::Vacant(entry) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                entry.insert(StoredResource {
                    seq,
                    resource: resource.clone(),
                });
                Ok(resource)
            }
        }
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> DbResult<Option<Value>> {
        Ok(self
            .resources
            .get(&(kind, id.to_string()))
            .map(|entry| entry.resource.clone()))
    }

    async fn update(&self, kind: ResourceKind, id: &str, resource: Value) -> DbResult<Value> {
        let mut entry = self
            .resources
            .get_mut(&(kind, id.to_string()))
            .ok_or(DbError::NotFound)?;
        entry.resource = resource.clone();
        Ok(resource)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> DbResult<()> {
        self.resources
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or(DbError::NotFound)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&CompiledFilter>,
    ) -> DbResult<Vec<Value>> {
        Ok(self
            .snapshot(kind)
            .into_iter()
            .map(|(_, resource)| resource)
            .filter(|resource| filter.is_none_or(|f| f.matches(resource)))
            .collect())
    }

    async fn find_by_attribute(
        &self,
        kind: ResourceKind,
        attribute: &str,
        value: &str,
        case_exact: bool,
        exclude_id: Option<&str>,
    ) -> DbResult<Option<Value>> {
        let found = self.resources.iter().find(|entry| {
            let (entry_kind, entry_id) = entry.key();
            *entry_kind == kind
                && exclude_id != Some(entry_id.as_str())
                && member(&entry.resource, attribute)
                    .and_then(Value::as_str)
                    .is_some_and(|v| {
                        if case_exact {
                            v == value
                        } else {
                            v.eq_ignore_ascii_case(value)
                        }
                    })
        });
        Ok(found.map(|entry| entry.resource.clone()))
    }

    async fn count(&self, kind: ResourceKind) -> DbResult<usize> {
        Ok(self
            .resources
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scim::{ScimPath, SchemaRegistry, compile};

    fn user(id: &str, user_name: &str) -> Value {
        json!({"id": id, "userName": user_name})
    }

    #[tokio::test]
    async fn test_insert_get_update_delete() {
        let repo = MemoryResourceRepo::new();
        repo.insert(ResourceKind::User, user("u1", "bjensen"))
            .await
            .unwrap();

        let stored = repo.get(ResourceKind::User, "u1").await.unwrap().unwrap();
        assert_eq!(stored["userName"], "bjensen");
        assert!(repo.get(ResourceKind::Group, "u1").await.unwrap().is_none());

        repo.update(ResourceKind::User, "u1", user("u1", "babs"))
            .await
            .unwrap();
        let stored = repo.get(ResourceKind::User, "u1").await.unwrap().unwrap();
        assert_eq!(stored["userName"], "babs");

        repo.delete(ResourceKind::User, "u1").await.unwrap();
        assert!(repo.get(ResourceKind::User, "u1").await.unwrap().is_none());
        assert!(matches!(
            repo.delete(ResourceKind::User, "u1").await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let repo = MemoryResourceRepo::new();
        repo.insert(ResourceKind::User, user("u1", "a")).await.unwrap();
        let err = repo
            .insert(ResourceKind::User, user("u1", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_id_is_validation_error() {
        let repo = MemoryResourceRepo::new();
        let err = repo
            .insert(ResourceKind::User, json!({"userName": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = MemoryResourceRepo::new();
        let err = repo
            .update(ResourceKind::User, "nope", user("nope", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order_and_filters() {
        let repo = MemoryResourceRepo::new();
        for (id, name) in [("c", "carol"), ("a", "alice"), ("b", "bob")] {
            repo.insert(ResourceKind::User, user(id, name)).await.unwrap();
        }

        let all = repo.list(ResourceKind::User, None).await.unwrap();
        let ids: Vec<&str> = all.iter().filter_map(|u| u["id"].as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let registry = SchemaRegistry::default();
        let path = ScimPath::parse("userName sw \"b\"", &registry).unwrap();
        let filter = compile(&path, &registry, ResourceKind::User).unwrap();
        let matched = repo.list(ResourceKind::User, Some(&filter)).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_find_by_attribute_is_case_insensitive() {
        let repo = MemoryResourceRepo::new();
        repo.insert(ResourceKind::User, user("u1", "BJensen"))
            .await
            .unwrap();

        let found = repo
            .find_by_attribute(ResourceKind::User, "userName", "bjensen", false, None)
            .await
            .unwrap();
        assert!(found.is_some());

        let excluded = repo
            .find_by_attribute(ResourceKind::User, "userName", "bjensen", false, Some("u1"))
            .await
            .unwrap();
        assert!(excluded.is_none());

        let exact = repo
            .find_by_attribute(ResourceKind::User, "userName", "bjensen", true, None)
            .await
            .unwrap();
        assert!(exact.is_none());
        assert_eq!(repo.count(ResourceKind::User).await.unwrap(), 1);
    }
}
