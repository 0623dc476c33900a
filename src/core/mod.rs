//! Core module containing the field-policy pipeline and collaborator traits

pub mod auth;
pub mod error;
pub mod events;
pub mod identity;
pub mod images;
pub mod query;
pub mod registry;
pub mod store;
pub mod translator;
pub mod validation;

pub use auth::{AuthState, Principal, Role, authenticate};
pub use error::{ApiError, ErrorResponse, ValidationError, ValidationKind};
pub use events::{ClaimsEvent, EventBus, EventEnvelope, RecordEvent, ServiceEvent};
pub use identity::{Claims, ClaimsPropagator, IdentityError, IdentityProvider, VerifiedIdentity};
pub use images::{ImageRecord, ImageService, NewImage};
pub use query::{Filter, PaginatedResult, PopulateRequest, Projection, QueryDescriptor, Sort};
pub use registry::{EmptyCollectionPolicy, EntityDescriptor, EntityRegistry, FieldConstraint};
pub use store::{Document, DocumentStore, FindOptions, Populate, StoreError, Update};
pub use translator::QueryTranslator;
pub use validation::{AcceptedProps, PolicyEntity, RequiredProps};
