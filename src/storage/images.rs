//! ImageService backed by a DocumentStore collection

use crate::core::images::{ImageRecord, ImageService, NewImage};
use crate::core::query::{Condition, Filter};
use crate::core::store::{Document, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Collection images are stored in by default
pub const IMAGES_COLLECTION: &str = "images";

/// Images stored as plain documents next to the records that own them
#[derive(Clone)]
pub struct DocumentImageService {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl DocumentImageService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collection(store, IMAGES_COLLECTION)
    }

    pub fn with_collection(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

fn to_document(image: NewImage) -> Result<Document, StoreError> {
    let mut document = match serde_json::to_value(image) {
        Ok(Value::Object(map)) => map,
        Ok(other) => return Err(StoreError::Malformed(format!("image encoded as {}", other))),
        Err(e) => return Err(StoreError::Malformed(e.to_string())),
    };
    document.insert("status".to_string(), Value::Bool(true));
    Ok(document)
}

#[async_trait]
impl ImageService for DocumentImageService {
    async fn insert_images(&self, images: Vec<NewImage>) -> Result<Vec<ImageRecord>, StoreError> {
        let documents = images
            .into_iter()
            .map(to_document)
            .collect::<Result<Vec<_>, _>>()?;

        self.store
            .insert_many(&self.collection, documents)
            .await?
            .into_iter()
            .map(|doc| {
                serde_json::from_value(Value::Object(doc))
                    .map_err(|e| StoreError::Malformed(format!("stored image: {}", e)))
            })
            .collect()
    }

    async fn delete_by_parent(&self, parent_type: &str, parent_id: &str) -> Result<u64, StoreError> {
        let filter = Filter::eq("parentType", parent_type)
            .and("parentId", Condition::Equals(parent_id.into()));
        let removed = self.store.delete_many(&self.collection, &filter).await?;
        tracing::debug!(parent_type, parent_id, removed, "deleted images by parent");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_insert_then_delete_by_parent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let images = DocumentImageService::new(store.clone());

        let inserted = images
            .insert_images(vec![
                NewImage::new("https://cdn/a.png").owned_by("users", "u-1"),
                NewImage::new("https://cdn/b.png").owned_by("users", "u-2"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
        assert!(inserted.iter().all(|image| image.status && !image.id.is_empty()));
        assert_eq!(inserted[0].parent_id, "u-1");

        let removed = images.delete_by_parent("users", "u-1").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(IMAGES_COLLECTION, &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_parent_matches_type() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let images = DocumentImageService::new(store.clone());
        images
            .insert_images(vec![NewImage::new("a").owned_by("units", "u-1")])
            .await
            .unwrap();

        assert_eq!(images.delete_by_parent("users", "u-1").await.unwrap(), 0);
    }
}
