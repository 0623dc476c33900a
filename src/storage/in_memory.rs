//! In-memory implementation of DocumentStore for testing and development

use super::populate::populate;
use crate::core::query::{Filter, values_equal};
use crate::core::store::{Document, DocumentStore, FindOptions, ID_FIELD, StoreError, Update};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory document store
///
/// Collections keep insertion order, which is the natural order of results
/// when no sort is given. Uses RwLock for thread-safe access; no lock is
/// held across an `.await`.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default())
    }

    /// Projection then population, after the lock is released
    async fn finish(
        &self,
        documents: Vec<Document>,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let documents = match &options.projection {
            Some(projection) => documents.iter().map(|doc| projection.apply(doc)).collect(),
            None => documents,
        };
        populate(self, documents, &options.populate).await
    }
}

/// Apply `$set`, then `$addToSet`, then `$pull`
fn apply_update(document: &mut Document, update: &Update) -> Result<(), StoreError> {
    for (field, value) in &update.set {
        if field == ID_FIELD {
            return Err(StoreError::Malformed("the id field is immutable".to_string()));
        }
        document.insert(field.clone(), value.clone());
    }

    for (field, value) in &update.add_to_set {
        match document.get_mut(field) {
            None | Some(Value::Null) => {
                document.insert(field.clone(), Value::Array(vec![value.clone()]));
            }
            Some(Value::Array(items)) => {
                if !items.iter().any(|item| values_equal(item, value)) {
                    items.push(value.clone());
                }
            }
            Some(_) => {
                return Err(StoreError::Malformed(format!(
                    "cannot add to non-array field '{}'",
                    field
                )));
            }
        }
    }

    for (field, value) in &update.pull {
        match document.get_mut(field) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => items.retain(|item| !values_equal(item, value)),
            Some(_) => {
                return Err(StoreError::Malformed(format!(
                    "cannot pull from non-array field '{}'",
                    field
                )));
            }
        }
    }

    Ok(())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents = self.matching(collection, filter)?;

        if !options.sort.is_empty() {
            documents.sort_by(|a, b| options.sort.compare(a, b));
        }
        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let documents: Vec<Document> = match options.limit {
            0 => documents.into_iter().skip(skip).collect(),
            limit => documents
                .into_iter()
                .skip(skip)
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
        };

        self.finish(documents, options).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<Document>, StoreError> {
        let options = FindOptions {
            limit: 1,
            ..options.clone()
        };
        Ok(self.find(collection, filter, &options).await?.into_iter().next())
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: &FindOptions,
    ) -> Result<Option<Document>, StoreError> {
        let updated = {
            let mut collections = self
                .collections
                .write()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;

            let target = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)));
            match target {
                Some(document) => {
                    let mut candidate = document.clone();
                    apply_update(&mut candidate, update)?;
                    *document = candidate.clone();
                    Some(candidate)
                }
                None => None,
            }
        };

        match updated {
            Some(document) => Ok(self.finish(vec![document], options).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let stored = collections.entry(collection.to_string()).or_default();

        let mut inserted = Vec::with_capacity(documents.len());
        for mut document in documents {
            match document.get(ID_FIELD) {
                None | Some(Value::Null) => {
                    document.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
                }
                Some(Value::String(id)) => {
                    if stored.iter().any(|doc| doc.get(ID_FIELD) == Some(&Value::String(id.clone()))) {
                        return Err(StoreError::Query {
                            backend: "in-memory".to_string(),
                            message: format!("duplicate id '{}' in {}", id, collection),
                        });
                    }
                }
                Some(other) => {
                    return Err(StoreError::Malformed(format!("id must be a string, got {}", other)));
                }
            }
            inserted.push(document);
        }

        stored.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|doc| !filter.matches(doc));
        Ok((before - documents.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, Projection, Sort, SortOrder};
    use crate::core::store::Populate;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_keeps_order() {
        let store = InMemoryDocumentStore::new();
        let inserted = store
            .insert_many("users", vec![doc(json!({"name": "a"})), doc(json!({"name": "b"}))])
            .await
            .unwrap();
        assert!(inserted.iter().all(|d| d["id"].is_string()));

        let all = store
            .find("users", &Filter::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(all, inserted);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("users", vec![doc(json!({"id": "u-1"}))])
            .await
            .unwrap();
        let result = store.insert_many("users", vec![doc(json!({"id": "u-1"}))]).await;
        assert!(matches!(result, Err(StoreError::Query { .. })));
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit_projection() {
        let store = InMemoryDocumentStore::new();
        let docs = (0..5).map(|i| doc(json!({"n": i, "secret": "x"}))).collect();
        store.insert_many("nums", docs).await.unwrap();

        let options = FindOptions {
            sort: Sort::by("n", SortOrder::Descending),
            skip: 1,
            limit: 2,
            ..Default::default()
        }
        .with_projection(Projection::exclude(&["secret", "id"]));
        let found = store.find("nums", &Filter::new(), &options).await.unwrap();
        assert_eq!(
            found.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"n": 3}), json!({"n": 2})]
        );
    }

    #[tokio::test]
    async fn test_find_one_and_update_set_operations() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("users", vec![doc(json!({"id": "u-1", "favoriteOwners": ["a"]}))])
            .await
            .unwrap();

        let update = Update::add_to_set("favoriteOwners", "a");
        let after = store
            .find_one_and_update("users", &Filter::by_id("u-1"), &update, &FindOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after["favoriteOwners"], json!(["a"]));

        let update = Update::add_to_set("favoriteOwners", "b");
        store
            .find_one_and_update("users", &Filter::by_id("u-1"), &update, &FindOptions::default())
            .await
            .unwrap();
        let update = Update::pull("favoriteOwners", "a");
        let after = store
            .find_one_and_update("users", &Filter::by_id("u-1"), &update, &FindOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after["favoriteOwners"], json!(["b"]));
    }

    #[tokio::test]
    async fn test_find_one_and_update_missing_returns_none() {
        let store = InMemoryDocumentStore::new();
        let result = store
            .find_one_and_update(
                "users",
                &Filter::by_id("nope"),
                &Update::set_field("status", false),
                &FindOptions::default(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failed_update_leaves_document_untouched() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many("users", vec![doc(json!({"id": "u-1", "name": "Ana", "tags": "oops"}))])
            .await
            .unwrap();

        let mut update = Update::set_field("name", "Bea");
        update.add_to_set.insert("tags".to_string(), json!("x"));
        let result = store
            .find_one_and_update("users", &Filter::by_id("u-1"), &update, &FindOptions::default())
            .await;
        assert!(matches!(result, Err(StoreError::Malformed(_))));

        let stored = store
            .find_one("users", &Filter::by_id("u-1"), &FindOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], "Ana");
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "images",
                vec![
                    doc(json!({"parentId": "u-1"})),
                    doc(json!({"parentId": "u-1"})),
                    doc(json!({"parentId": "u-2"})),
                ],
            )
            .await
            .unwrap();
        let removed = store
            .delete_many("images", &Filter::eq("parentId", "u-1"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count("images", &Filter::new()).await.unwrap(), 1);
        assert_eq!(store.delete_many("missing", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_population_single_and_array() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_many(
                "images",
                vec![
                    doc(json!({"id": "img-1", "url": "a", "status": true})),
                    doc(json!({"id": "img-2", "url": "b", "status": false})),
                ],
            )
            .await
            .unwrap();
        store
            .insert_many(
                "users",
                vec![
                    doc(json!({"id": "u-1", "image": "img-1", "gallery": ["img-1", "img-2"]})),
                    doc(json!({"id": "u-2", "image": "img-2"})),
                    doc(json!({"id": "u-3", "image": null})),
                ],
            )
            .await
            .unwrap();

        let active = Filter::eq("status", true);
        let select = Some(Projection::include(&["url"]));
        let options = FindOptions::default()
            .with_populate(Populate {
                path: "image".to_string(),
                collection: "images".to_string(),
                filter: active.clone(),
                select: select.clone(),
            })
            .with_populate(Populate {
                path: "gallery".to_string(),
                collection: "images".to_string(),
                filter: active.and("url", Condition::Equals(json!("a"))),
                select,
            });
        let users = store.find("users", &Filter::new(), &options).await.unwrap();

        assert_eq!(users[0]["image"], json!({"id": "img-1", "url": "a"}));
        assert_eq!(users[0]["gallery"], json!([{"id": "img-1", "url": "a"}]));
        assert_eq!(users[1]["image"], Value::Null);
        assert_eq!(users[2]["image"], Value::Null);
    }
}
