//! Server host holding the shared application state
//!
//! The host owns every collaborator the routes need. It is built once by
//! [`ServerBuilder`](super::ServerBuilder) and handed to the router, which
//! derives the per-route states from it.

use crate::core::auth::AuthState;
use crate::core::error::ApiError;
use crate::core::events::EventBus;
use crate::core::identity::{ClaimsPropagator, IdentityProvider};
use crate::core::images::ImageService;
use crate::core::registry::EntityRegistry;
use crate::core::store::DocumentStore;
use crate::entities::user::{USERS, UserAppState, UserRepository};
use std::sync::Arc;

pub struct ServerHost {
    /// Record storage
    pub store: Arc<dyn DocumentStore>,

    /// Verifies bearer credentials and receives claim updates
    pub identity: Arc<dyn IdentityProvider>,

    /// Image storage used when a user's image is replaced
    pub images: Arc<dyn ImageService>,

    /// Field policies of every entity
    pub registry: Arc<EntityRegistry>,

    /// Record and claims events
    pub event_bus: EventBus,

    /// Body of `GET /`
    pub welcome: String,

    /// Collection holding user records, as declared by the users policy
    users_collection: String,
}

impl ServerHost {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        images: Arc<dyn ImageService>,
        registry: EntityRegistry,
        event_bus: EventBus,
        welcome: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let users_collection = registry.describe(USERS)?.collection().to_string();
        Ok(Self {
            store,
            identity,
            images,
            registry: Arc::new(registry),
            event_bus,
            welcome: welcome.into(),
            users_collection,
        })
    }

    /// Get entity types registered in the host
    pub fn entity_types(&self) -> Vec<&str> {
        self.registry.entity_types()
    }

    /// State of the authentication middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            identity: self.identity.clone(),
            store: self.store.clone(),
            users: self.users_collection.clone(),
        }
    }

    /// State of the user routes
    pub fn user_state(&self) -> UserAppState {
        let claims = ClaimsPropagator::new(self.identity.clone(), self.event_bus.clone());
        UserAppState {
            repository: UserRepository::new(
                self.store.clone(),
                self.images.clone(),
                self.registry.clone(),
                claims,
                self.event_bus.clone(),
            ),
            registry: self.registry.clone(),
        }
    }
}
