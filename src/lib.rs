//! # fieldgate
//!
//! A policy-gated REST API over a document store.
//!
//! ## Features
//!
//! - **Field policies**: per-entity allow-lists, required sets and value
//!   constraints, declared in code or in YAML
//! - **Typed queries**: filter / projection / sort / pagination / population
//!   descriptors validated before they reach storage
//! - **Authentication**: bearer credentials verified by a pluggable identity
//!   provider and resolved to a user record
//! - **Claims propagation**: role changes pushed to the identity provider in
//!   the background
//! - **Storage backends**: in-memory (default) and MongoDB (`mongodb_backend`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldgate::prelude::*;
//!
//! let identity = InMemoryIdentityProvider::new().with_token("dev-token", "dev-subject", None);
//!
//! ServerBuilder::new()
//!     .with_store(InMemoryDocumentStore::new())
//!     .with_identity_provider(identity)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    pub use crate::config::AppConfig;

    pub use crate::core::{
        ApiError, Claims, ClaimsPropagator, DocumentStore, EntityDescriptor, EntityRegistry,
        EventBus, EventEnvelope, Filter, IdentityProvider, ImageService, NewImage,
        PaginatedResult, Principal, QueryDescriptor, Role, ServiceEvent, ValidationError,
    };

    pub use crate::entities::{UserAppState, UserRepository, Users};

    pub use crate::server::{ServerBuilder, ServerHost};

    pub use crate::storage::{DocumentImageService, InMemoryDocumentStore, InMemoryIdentityProvider};

    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoDocumentStore;
}
