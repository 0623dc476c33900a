//! ServerBuilder for fluent API to build HTTP servers

use super::host::ServerHost;
use super::router::build_router;
use crate::config::{AppConfig, StorageConfig};
use crate::core::events::EventBus;
use crate::core::identity::IdentityProvider;
use crate::core::images::ImageService;
use crate::core::registry::EntityRegistry;
use crate::core::store::DocumentStore;
use crate::entities::user::users_descriptor;
use crate::storage::{DocumentImageService, InMemoryDocumentStore, InMemoryIdentityProvider};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating the HTTP server
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryDocumentStore::new())
///     .with_identity_provider(InMemoryIdentityProvider::new().with_token("t", "sub", None))
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    images: Option<Arc<dyn ImageService>>,
    registry: Option<EntityRegistry>,
    custom_routes: Vec<Router>,
    event_bus: Option<EventBus>,
    event_capacity: Option<usize>,
    welcome: String,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            store: None,
            identity: None,
            images: None,
            registry: None,
            custom_routes: Vec::new(),
            event_bus: None,
            event_capacity: None,
            welcome: crate::config::ServerConfig::default().welcome,
        }
    }

    /// Builder preloaded from the application configuration
    ///
    /// Connects to MongoDB (and creates its indexes) when the storage section
    /// asks for it; the identity provider is seeded with the configured
    /// static tokens.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let identity = InMemoryIdentityProvider::new();
        for token in &config.identity.tokens {
            identity.add_token(&token.token, &token.subject_id, token.email.as_deref());
        }

        let builder = Self::new()
            .with_identity_provider(identity)
            .with_registry(config.registry()?)
            .with_event_bus(config.server.event_capacity)
            .with_welcome(config.server.welcome.clone());

        Ok(builder.with_shared_store(connect_store(&config.storage).await?))
    }

    /// Set the document store (defaults to an empty in-memory store)
    pub fn with_store(self, store: impl DocumentStore + 'static) -> Self {
        self.with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the identity provider (required)
    pub fn with_identity_provider(self, provider: impl IdentityProvider + 'static) -> Self {
        self.with_shared_identity_provider(Arc::new(provider))
    }

    /// Set an identity provider the caller keeps a handle on
    pub fn with_shared_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Set the image service (defaults to a [`DocumentImageService`] over
    /// the document store)
    pub fn with_image_service(mut self, images: impl ImageService + 'static) -> Self {
        self.images = Some(Arc::new(images));
        self
    }

    /// Set the entity registry (defaults to the built-in users policy)
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_welcome(mut self, welcome: impl Into<String>) -> Self {
        self.welcome = welcome.into();
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are not gated by the authentication middleware.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Create the event bus with the given channel capacity
    ///
    /// Defaults to a capacity of 1024. A zero capacity fails the build.
    pub fn with_event_bus(mut self, capacity: usize) -> Self {
        self.event_bus = None;
        self.event_capacity = Some(capacity);
        self
    }

    /// Use an existing event bus, so the caller can subscribe to it
    pub fn with_shared_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self.event_capacity = None;
        self
    }

    /// Build the host holding the shared state
    pub fn build_host(mut self) -> Result<ServerHost> {
        let identity = self.identity.take().ok_or_else(|| {
            anyhow::anyhow!("IdentityProvider is required. Call .with_identity_provider()")
        })?;
        let store = self
            .store
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new()));
        let images = self
            .images
            .take()
            .unwrap_or_else(|| Arc::new(DocumentImageService::new(store.clone())));
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => EntityRegistry::new().with(users_descriptor()?),
        };
        let event_bus = match (self.event_bus.take(), self.event_capacity) {
            (Some(event_bus), _) => event_bus,
            (None, Some(capacity)) => {
                anyhow::ensure!(capacity > 0, "Event bus capacity must be greater than zero");
                EventBus::new(capacity)
            }
            (None, None) => EventBus::default(),
        };

        // Fails when the registry has no users policy
        Ok(ServerHost::new(
            store,
            identity,
            images,
            registry,
            event_bus,
            self.welcome,
        )?)
    }

    /// Build the final router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        tracing::debug!(entities = ?host.entity_types(), "built router");
        Ok(build_router(host, custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "mongodb_backend")]
async fn connect_store(storage: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    use crate::storage::MongoDocumentStore;

    match storage {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryDocumentStore::new())),
        StorageConfig::Mongodb { uri, database } => {
            let store = MongoDocumentStore::connect(uri, database).await?;
            store.ensure_indexes().await?;
            tracing::info!(database = %database, "connected to MongoDB");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(not(feature = "mongodb_backend"))]
async fn connect_store(storage: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    match storage {
        StorageConfig::InMemory => Ok(Arc::new(InMemoryDocumentStore::new())),
        StorageConfig::Mongodb { .. } => Err(anyhow::anyhow!(
            "MongoDB storage requires the `mongodb_backend` feature"
        )),
    }
}


/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
