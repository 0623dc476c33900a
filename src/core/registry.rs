//! Entity registry: per-entity field policies
//!
//! Each entity type has one immutable [`EntityDescriptor`] listing which
//! fields callers may write, which must be present on creation, which may be
//! read or queried, and which value constraints apply. Descriptors are
//! compiled once at startup and shared read-only.

use crate::core::error::ApiError;
use crate::core::store::ID_FIELD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value constraint on a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldConstraint {
    /// Value must be one of an enumerated set of strings
    OneOf { field: String, allowed: Vec<String> },
}

impl FieldConstraint {
    pub fn field(&self) -> &str {
        match self {
            FieldConstraint::OneOf { field, .. } => field,
        }
    }
}

/// How `enforce_required` treats a required field holding an empty array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyCollectionPolicy {
    /// Empty arrays pass
    #[default]
    Ignore,
    /// Empty arrays raise `EmptyCollection`
    Reject,
}

/// A field holding the id of a document in another collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub field: String,
    pub collection: String,
}

/// Field policy of one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    name: String,
    collection: String,
    writable: Vec<String>,
    required: Vec<String>,
    readable: Vec<String>,
    constraints: Vec<FieldConstraint>,
    references: Vec<Reference>,
    empty_collections: EmptyCollectionPolicy,
}

impl EntityDescriptor {
    /// Start describing an entity; the collection defaults to its name
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        let name = name.into();
        EntityDescriptorBuilder {
            collection: name.clone(),
            name,
            writable: Vec::new(),
            required: Vec::new(),
            readable: Vec::new(),
            constraints: Vec::new(),
            references: Vec::new(),
            empty_collections: EmptyCollectionPolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Writable fields, in declaration order
    pub fn writable(&self) -> &[String] {
        &self.writable
    }

    /// Required fields, in declaration order
    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn readable(&self) -> &[String] {
        &self.readable
    }

    pub fn constraints(&self) -> &[FieldConstraint] {
        &self.constraints
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn empty_collections(&self) -> EmptyCollectionPolicy {
        self.empty_collections
    }

    pub fn is_writable(&self, field: &str) -> bool {
        self.writable.iter().any(|f| f == field)
    }

    /// Whether a (possibly dotted) path may be read, filtered or sorted on
    pub fn is_readable(&self, path: &str) -> bool {
        let root = path.split('.').next().unwrap_or(path);
        root == ID_FIELD || self.readable.iter().any(|f| f == root)
    }

    pub fn reference(&self, field: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.field == field)
    }
}

/// Builder for [`EntityDescriptor`]
#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    name: String,
    collection: String,
    writable: Vec<String>,
    required: Vec<String>,
    readable: Vec<String>,
    constraints: Vec<FieldConstraint>,
    references: Vec<Reference>,
    empty_collections: EmptyCollectionPolicy,
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl EntityDescriptorBuilder {
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn writable(mut self, fields: &[&str]) -> Self {
        self.writable = owned(fields);
        self
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required = owned(fields);
        self
    }

    pub fn readable(mut self, fields: &[&str]) -> Self {
        self.readable = owned(fields);
        self
    }

    pub fn one_of(mut self, field: &str, allowed: &[&str]) -> Self {
        self.constraints.push(FieldConstraint::OneOf {
            field: field.to_string(),
            allowed: owned(allowed),
        });
        self
    }

    pub fn constraint(mut self, constraint: FieldConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn reference(mut self, field: &str, collection: &str) -> Self {
        self.references.push(Reference {
            field: field.to_string(),
            collection: collection.to_string(),
        });
        self
    }

    pub fn empty_collections(mut self, policy: EmptyCollectionPolicy) -> Self {
        self.empty_collections = policy;
        self
    }

    /// Check internal consistency and freeze the descriptor
    pub fn build(self) -> Result<EntityDescriptor, ApiError> {
        let invalid = |message: String| {
            Err(ApiError::Configuration(format!(
                "Invalid policy for entity '{}': {}",
                self.name, message
            )))
        };

        if self.collection.is_empty() {
            return invalid("collection name is empty".to_string());
        }
        if let Some(field) = self.required.iter().find(|f| !self.writable.contains(*f)) {
            return invalid(format!("required field '{}' is not writable", field));
        }
        if let Some(constraint) = self
            .constraints
            .iter()
            .find(|c| !self.writable.iter().any(|f| f == c.field()))
        {
            return invalid(format!(
                "constraint on '{}' targets a field that is not writable",
                constraint.field()
            ));
        }
        if let Some(reference) = self
            .references
            .iter()
            .find(|r| !self.readable.contains(&r.field))
        {
            return invalid(format!(
                "reference '{}' targets a field that is not readable",
                reference.field
            ));
        }

        Ok(EntityDescriptor {
            name: self.name,
            collection: self.collection,
            writable: self.writable,
            required: self.required,
            readable: self.readable,
            constraints: self.constraints,
            references: self.references,
            empty_collections: self.empty_collections,
        })
    }
}

/// Registry of every entity's field policy
///
/// Populated while the server is being built, then shared behind an `Arc`
/// and never mutated again.
#[derive(Debug, Default, Clone)]
pub struct EntityRegistry {
    descriptors: HashMap<String, EntityDescriptor>,
}

impl EntityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Register a descriptor; a descriptor with the same name is replaced
    pub fn register(&mut self, descriptor: EntityDescriptor) {
        self.descriptors
            .insert(descriptor.name().to_string(), descriptor);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, descriptor: EntityDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Look up an entity's descriptor
    pub fn describe(&self, entity: &str) -> Result<&EntityDescriptor, ApiError> {
        self.descriptors
            .get(entity)
            .ok_or_else(|| ApiError::Configuration(format!("Invalid route: unknown entity '{}'", entity)))
    }

    /// Get all registered entity types
    pub fn entity_types(&self) -> Vec<&str> {
        self.descriptors.keys().map(|s| s.as_str()).collect()
    }
}
