//! MongoDB storage backend using the official MongoDB async driver.
//!
//! Provides a `DocumentStore` backed by a `mongodb::Database`; each
//! fieldgate collection maps onto a MongoDB collection of the same name.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! fieldgate-rs = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Serialization strategy
//!
//! Documents, filters, projections and sorts all go through
//! `serde_json::Value` and are converted to BSON. Their JSON form already
//! uses MongoDB's operator names (`$in`, `$gte`, ...), so no per-operator
//! translation is needed. The `id` field is mapped to MongoDB's `_id`.
//!
//! Reference population is done with follow-up `$in` queries rather than an
//! aggregation `$lookup`, so it behaves exactly like the in-memory backend.

use super::populate::populate;
use crate::core::query::Filter;
use crate::core::store::{self, DocumentStore, FindOptions, ID_FIELD, StoreError, Update};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Database;
use mongodb::bson::{Bson, Document};
use mongodb::options::ReturnDocument;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

const BACKEND: &str = "mongodb";

fn query_error(e: mongodb::error::Error) -> StoreError {
    StoreError::Query {
        backend: BACKEND.to_string(),
        message: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert anything serializing to a JSON object into a BSON Document,
/// renaming a top-level `id` → `_id` for MongoDB convention.
fn to_bson_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    let bson_val = mongodb::bson::to_bson(value)
        .map_err(|e| StoreError::Malformed(format!("Failed to convert to BSON: {}", e)))?;

    let mut doc = match bson_val {
        Bson::Document(d) => d,
        _ => {
            return Err(StoreError::Malformed(
                "Expected BSON document, got non-object".to_string(),
            ));
        }
    };

    if let Some(id) = doc.remove(ID_FIELD) {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON Document back into a stored document,
/// renaming `_id` → `id`.
fn from_bson_document(mut doc: Document) -> Result<store::Document, StoreError> {
    if let Some(id) = doc.remove("_id") {
        doc.insert(ID_FIELD, id);
    }

    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(format!(
            "Expected JSON object from BSON document, got {}",
            other
        ))),
    }
}

fn update_document(update: &Update) -> Result<Document, StoreError> {
    let mut doc = Document::new();
    for (operator, fields) in [
        ("$set", &update.set),
        ("$addToSet", &update.add_to_set),
        ("$pull", &update.pull),
    ] {
        if !fields.is_empty() {
            doc.insert(operator, to_bson_document(fields)?);
        }
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// MongoDocumentStore
// ---------------------------------------------------------------------------

/// Document store backed by MongoDB.
///
/// # Example
///
/// ```rust,ignore
/// use mongodb::Client;
/// use fieldgate::storage::MongoDocumentStore;
///
/// let client = Client::with_uri_str("mongodb://localhost:27017").await?;
/// let store = MongoDocumentStore::new(client.database("fieldgate"));
/// let users = store.find("users", &Filter::eq("status", true), &FindOptions::default()).await?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Create a new `MongoDocumentStore` with the given database handle.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Connect to `uri` and use `database`
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(query_error)?;
        Ok(Self::new(client.database(database)))
    }

    /// Get a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.database.collection(name)
    }

    /// Create the indexes the user routes rely on
    ///
    /// - `users.subjectId` for authentication lookups
    /// - `images.parentType + parentId` for image replacement
    ///
    /// This method is idempotent — safe to call on every startup.
    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        use mongodb::IndexModel;
        use mongodb::bson::doc;

        self.collection("users")
            .create_index(IndexModel::builder().keys(doc! { "subjectId": 1 }).build())
            .await
            .map_err(query_error)?;
        self.collection("images")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "parentType": 1, "parentId": 1 })
                    .build(),
            )
            .await
            .map_err(query_error)?;

        Ok(())
    }

    async fn finish(
        &self,
        docs: Vec<Document>,
        options: &FindOptions,
    ) -> Result<Vec<store::Document>, StoreError> {
        let documents = docs
            .into_iter()
            .map(from_bson_document)
            .collect::<Result<Vec<_>, _>>()?;
        populate(self, documents, &options.populate).await
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.collection(collection)
            .count_documents(to_bson_document(filter)?)
            .await
            .map_err(query_error)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<store::Document>, StoreError> {
        let mut action = self
            .collection(collection)
            .find(to_bson_document(filter)?)
            .skip(options.skip.min(i64::MAX as u64));
        if options.limit > 0 {
            action = action.limit(i64::try_from(options.limit).unwrap_or(i64::MAX));
        }
        if !options.sort.is_empty() {
            action = action.sort(to_bson_document(&options.sort)?);
        }
        if let Some(projection) = options.projection.as_ref().filter(|p| !p.is_empty()) {
            action = action.projection(to_bson_document(projection)?);
        }

        let docs: Vec<Document> = action
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        self.finish(docs, options).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<store::Document>, StoreError> {
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
    ) -> Result<Option<store::Document>, StoreError> {
        if update.is_empty() {
            return self.find_one(collection, filter, options).await;
        }

        let mut action = self
            .collection(collection)
            .find_one_and_update(to_bson_document(filter)?, update_document(update)?)
            .return_document(ReturnDocument::After);
        if let Some(projection) = options.projection.as_ref().filter(|p| !p.is_empty()) {
            action = action.projection(to_bson_document(projection)?);
        }

        match action.await.map_err(query_error)? {
            Some(doc) => Ok(self.finish(vec![doc], options).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<store::Document>,
    ) -> Result<Vec<store::Document>, StoreError> {
        if documents.is_empty() {
            return Ok(documents);
        }

        let documents: Vec<store::Document> = documents
            .into_iter()
            .map(|mut document| {
                if document.get(ID_FIELD).is_none_or(Value::is_null) {
                    document.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
                }
                document
            })
            .collect();
        let bson_docs = documents
            .iter()
            .map(to_bson_document)
            .collect::<Result<Vec<_>, _>>()?;

        self.collection(collection)
            .insert_many(bson_docs)
            .await
            .map_err(query_error)?;

        Ok(documents)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .delete_many(to_bson_document(filter)?)
            .await
            .map_err(query_error)?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, Projection};
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn test_filter_maps_id_and_operators() {
        let filter = Filter::by_id("u-1").and("role", Condition::in_list(vec![json!("ADMIN")]));
        let doc = to_bson_document(&filter).unwrap();
        assert_eq!(doc, doc! { "_id": "u-1", "role": { "$in": ["ADMIN"] } });
    }

    #[test]
    fn test_projection_maps_id() {
        let projection: Projection = serde_json::from_value(json!({"url": 1, "id": 0})).unwrap();
        let doc = to_bson_document(&projection).unwrap();
        assert_eq!(doc, doc! { "url": true, "_id": false });
    }

    #[test]
    fn test_update_document_skips_empty_operators() {
        let update = Update::add_to_set("favoriteOwners", "o-1");
        let doc = update_document(&update).unwrap();
        assert_eq!(doc, doc! { "$addToSet": { "favoriteOwners": "o-1" } });
    }

    #[test]
    fn test_from_bson_document_renames_id() {
        let doc = from_bson_document(doc! { "_id": "u-1", "name": "Ana" }).unwrap();
        assert_eq!(Value::Object(doc), json!({"id": "u-1", "name": "Ana"}));
    }
}
