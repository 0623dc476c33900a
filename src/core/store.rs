//! Persistence service abstraction
//!
//! The repository and the query translator only talk to the database
//! through [`DocumentStore`]. Documents are JSON objects keyed by an opaque
//! string id stored under [`ID_FIELD`].

use crate::core::query::{Filter, Projection, Sort};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document
pub type Document = Map<String, Value>;

/// Field holding a document's id
pub const ID_FIELD: &str = "id";

/// Expansion of a reference field, already resolved against the registry
#[derive(Debug, Clone, PartialEq)]
pub struct Populate {
    /// Field on the parent document holding an id (or an array of ids)
    pub path: String,
    /// Collection the ids point into
    pub collection: String,
    /// Extra condition the referenced documents must satisfy
    pub filter: Filter,
    /// Projection applied to the referenced documents
    pub select: Option<Projection>,
}

/// Options shared by every read
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Sort,
    pub skip: u64,
    /// `0` means no limit
    pub limit: u64,
    pub populate: Vec<Populate>,
}

impl FindOptions {
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }
}

/// A document update
///
/// `set` overwrites fields, `add_to_set` unions a value into an array field
/// (creating it when missing), `pull` removes every occurrence of a value
/// from an array field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub add_to_set: Document,
    pub pull: Document,
}

impl Update {
    pub fn set(fields: Document) -> Self {
        Self {
            set: fields,
            ..Default::default()
        }
    }

    pub fn set_field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Document::new();
        fields.insert(field.into(), value.into());
        Self::set(fields)
    }

    pub fn add_to_set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Document::new();
        fields.insert(field.into(), value.into());
        Self {
            add_to_set: fields,
            ..Default::default()
        }
    }

    pub fn pull(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Document::new();
        fields.insert(field.into(), value.into());
        Self {
            pull: fields,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add_to_set.is_empty() && self.pull.is_empty()
    }
}

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend query failed
    #[error("{backend} query error: {message}")]
    Query { backend: String, message: String },

    /// A stored or provided document has an unexpected shape
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Internal lock was poisoned by a panicking writer
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
}

/// Generic document persistence
///
/// Implementations are agnostic to entity types; they only manage
/// collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Count documents matching the filter
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Fetch documents: filter, projection, sort, skip/limit, then population
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Fetch the first matching document
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<Document>, StoreError>;

    /// Apply an update to the first matching document and return it as it is
    /// after the update (projected and populated per `options`)
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: &FindOptions,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert documents, assigning ids to those without one
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Remove every matching document, returning how many were removed
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;
}
