//! Loading configuration files and starting the server from them

use axum::response::Json;
use axum::routing::get;
use axum::{Router, middleware};
use axum_test::TestServer;
use fieldgate::config::{AppConfig, StorageConfig};
use fieldgate::core::auth::{Principal, authenticate};
use fieldgate::core::query::Filter;
use fieldgate::core::registry::EmptyCollectionPolicy;
use fieldgate::core::store::{DocumentStore, FindOptions};
use fieldgate::server::{ServerBuilder, build_router};
use fieldgate::storage::{InMemoryDocumentStore, InMemoryIdentityProvider};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
server:
  bind: 127.0.0.1:4000
  welcome: Hello from the config file
identity:
  tokens:
    - token: dev-token
      subject_id: dev-subject
      email: dev@example.com
entities:
  - name: users
    writable: [name, image, role, tags]
    required: [name, image, tags]
    readable: [name, image, role, tags, status, subjectId, favoriteOwners, email, preferences]
    constraints:
      - kind: one_of
        field: role
        allowed: [ADMIN, CURATOR]
    references:
      - field: image
        collection: images
    empty_collections: reject
"#;

const ACCOUNTS_CONFIG: &str = r#"
entities:
  - name: users
    collection: accounts
    writable: [name, image, role]
    required: [name, image]
    readable: [name, image, role, status, subjectId, email]
    references:
      - field: image
        collection: images
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(CONFIG);
    let config = AppConfig::from_yaml_file(file.path()).unwrap();

    assert_eq!(config.server.bind, "127.0.0.1:4000");
    assert_eq!(config.storage, StorageConfig::InMemory);
    assert_eq!(config.identity.tokens.len(), 1);

    let registry = config.registry().unwrap();
    let users = registry.describe("users").unwrap();
    assert_eq!(users.empty_collections(), EmptyCollectionPolicy::Reject);
    assert!(users.is_writable("tags"));
    assert!(!users.is_writable("serviceZone"));
}

#[test]
fn test_missing_file_reports_path() {
    let err = AppConfig::from_yaml_file("/nonexistent/fieldgate.yaml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/fieldgate.yaml"));
}

#[test]
fn test_invalid_yaml_is_rejected() {
    let file = write_config("storage:\n  backend: cassandra\n");
    assert!(AppConfig::from_yaml_file(file.path()).is_err());
}

#[test]
fn test_zero_event_capacity_is_rejected() {
    let file = write_config("server:\n  event_capacity: 0\n");
    let err = AppConfig::from_yaml_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("event_capacity must be greater than zero"));
}

#[tokio::test]
async fn test_configured_users_collection_resolves_principal() {
    let config = AppConfig::from_yaml_str(ACCOUNTS_CONFIG).unwrap();
    let store = InMemoryDocumentStore::new();
    let account = json!({"id": "acc-1", "name": "Dev", "role": "ADMIN", "status": true, "subjectId": "dev-subject"});
    store
        .insert_many("accounts", vec![account.as_object().cloned().unwrap()])
        .await
        .unwrap();

    let host = ServerBuilder::new()
        .with_store(store.clone())
        .with_identity_provider(InMemoryIdentityProvider::new().with_token("dev-token", "dev-subject", None))
        .with_registry(config.registry().unwrap())
        .build_host()
        .unwrap();

    let whoami = Router::new()
        .route("/whoami", get(|principal: Principal| async move { Json(principal) }))
        .route_layer(middleware::from_fn_with_state(host.auth_state(), authenticate));
    let server = TestServer::try_new(whoami).expect("Failed to create test server");

    let response = server.get("/whoami").authorization_bearer("dev-token").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["internalId"], "acc-1");
    assert_eq!(body["role"], "ADMIN");

    let server = TestServer::try_new(build_router(Arc::new(host), Vec::new()))
        .expect("Failed to create test server");
    let response = server
        .get("/users/getAuthUser")
        .authorization_bearer("dev-token")
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["id"], "acc-1");

    let users = store
        .find("users", &Filter::new(), &FindOptions::default())
        .await
        .unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn test_server_uses_configured_policy() {
    let file = write_config(CONFIG);
    let config = AppConfig::from_yaml_file(file.path()).unwrap();
    let app = ServerBuilder::from_config(&config)
        .await
        .unwrap()
        .build()
        .unwrap();
    let server = TestServer::try_new(app).expect("Failed to create test server");

    let response = server.get("/").await;
    assert_eq!(response.text(), "Hello from the config file");

    // JUNIOR is not in the configured role set
    let response = server
        .post("/users/create")
        .authorization_bearer("dev-token")
        .json(&json!({"name": "Dev", "image": "https://cdn.example.com/d.png", "tags": ["a"], "role": "JUNIOR"}))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "INVALID_ENUM");

    // Empty collections are rejected under this policy
    let response = server
        .post("/users/create")
        .authorization_bearer("dev-token")
        .json(&json!({"name": "Dev", "image": "https://cdn.example.com/d.png", "tags": []}))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "EMPTY_COLLECTION");

    let response = server
        .post("/users/create")
        .authorization_bearer("dev-token")
        .json(&json!({"name": "Dev", "image": "https://cdn.example.com/d.png", "tags": ["a"]}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["email"], "dev@example.com");
    assert_eq!(body["subjectId"], "dev-subject");
}
