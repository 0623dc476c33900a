//! Storage implementations for the collaborator traits

pub mod identity;
pub mod images;
pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;
pub mod populate;

pub use identity::InMemoryIdentityProvider;
pub use images::{DocumentImageService, IMAGES_COLLECTION};
pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb_backend")]
pub use mongodb::MongoDocumentStore;
