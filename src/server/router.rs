//! Router assembly
//!
//! - `GET /`, `GET /health`, `GET /healthz` are open
//! - every `/users/*` route runs behind [`authenticate`]

use super::host::ServerHost;
use crate::core::auth::authenticate;
use crate::entities::user::user_routes;
use axum::Router;
use axum::extract::State;
use axum::middleware;
use axum::response::Json;
use axum::routing::get;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the complete application router from the host
pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Router {
    let gated = user_routes(host.user_state()).route_layer(middleware::from_fn_with_state(
        host.auth_state(),
        authenticate,
    ));

    let mut app = open_routes(host).merge(gated);
    for custom_router in custom_routes {
        app = app.merge(custom_router);
    }

    app.layer(TraceLayer::new_for_http())
}

fn open_routes(host: Arc<ServerHost>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .with_state(host)
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn welcome(State(host): State<Arc<ServerHost>>) -> String {
    host.welcome.clone()
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "fieldgate"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventBus;
    use crate::core::registry::EntityRegistry;
    use crate::core::store::DocumentStore;
    use crate::entities::user::users_descriptor;
    use crate::storage::{DocumentImageService, InMemoryDocumentStore, InMemoryIdentityProvider};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let host = ServerHost::new(
            store.clone(),
            Arc::new(InMemoryIdentityProvider::new()),
            Arc::new(DocumentImageService::new(store)),
            EntityRegistry::new().with(users_descriptor().unwrap()),
            EventBus::new(16),
            "welcome",
        )
        .unwrap();
        build_router(Arc::new(host), Vec::new())
    }

    #[tokio::test]
    async fn test_health_routes_are_open() {
        for path in ["/health", "/healthz", "/"] {
            let response = app()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_user_routes_require_credentials() {
        let response = app()
            .oneshot(Request::get("/users/getAuthUser").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_custom_routes_are_merged() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let host = ServerHost::new(
            store.clone(),
            Arc::new(InMemoryIdentityProvider::new()),
            Arc::new(DocumentImageService::new(store)),
            EntityRegistry::new().with(users_descriptor().unwrap()),
            EventBus::default(),
            "welcome",
        )
        .unwrap();
        let extra = Router::new().route("/version", get(|| async { "1" }));
        let response = build_router(Arc::new(host), vec![extra])
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
