//! Configuration loading and management
//!
//! ```yaml
//! server:
//!   bind: 0.0.0.0:3000
//!   welcome: Welcome to the fieldgate API
//! storage:
//!   backend: mongodb
//!   uri: mongodb://localhost:27017
//!   database: fieldgate
//! identity:
//!   tokens:
//!     - token: dev-token
//!       subject_id: dev-subject
//!       email: dev@example.com
//! entities:
//!   - name: users
//!     writable: [name, email, role, image]
//!     required: [name, image]
//!     readable: [name, email, role, image, status, subjectId]
//!     constraints:
//!       - kind: one_of
//!         field: role
//!         allowed: [ADMIN, JUNIOR, CURATOR]
//!     references:
//!       - field: image
//!         collection: images
//! ```
//!
//! Every section is optional. Entity policies listed here replace the
//! built-in policy of the same name.

use crate::core::error::ApiError;
use crate::core::registry::{
    EmptyCollectionPolicy, EntityDescriptor, EntityRegistry, FieldConstraint, Reference,
};
use crate::entities::user::users_descriptor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "FIELDGATE_CONFIG";
pub const BIND_ENV: &str = "FIELDGATE_BIND";
pub const MONGO_URI_ENV: &str = "FIELDGATE_MONGO_URI";
pub const MONGO_DATABASE_ENV: &str = "FIELDGATE_MONGO_DATABASE";

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
    /// Body of `GET /`
    pub welcome: String,
    /// Buffer size of the event bus
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            welcome: "Welcome to the fieldgate API".to_string(),
            event_capacity: 1024,
        }
    }
}

/// Which DocumentStore backs the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    InMemory,
    Mongodb {
        uri: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

fn default_database() -> String {
    "fieldgate".to_string()
}

/// A credential accepted by the in-memory identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticToken {
    pub token: String,
    pub subject_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub tokens: Vec<StaticToken>,
}

/// Field policy of one entity, as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPolicyConfig {
    pub name: String,
    /// Defaults to the entity name
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub readable: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<FieldConstraint>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub empty_collections: EmptyCollectionPolicy,
}

impl EntityPolicyConfig {
    /// Compile into a descriptor, checking its consistency
    pub fn compile(&self) -> Result<EntityDescriptor, ApiError> {
        fn strs(fields: &[String]) -> Vec<&str> {
            fields.iter().map(String::as_str).collect()
        }

        let mut builder = EntityDescriptor::builder(self.name.as_str())
            .writable(&strs(&self.writable))
            .required(&strs(&self.required))
            .readable(&strs(&self.readable))
            .empty_collections(self.empty_collections);
        if let Some(collection) = &self.collection {
            builder = builder.collection(collection.as_str());
        }
        for constraint in &self.constraints {
            builder = builder.constraint(constraint.clone());
        }
        for reference in &self.references {
            builder = builder.reference(&reference.field, &reference.collection);
        }
        builder.build()
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub entities: Vec<EntityPolicyConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, at startup
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.server.event_capacity > 0,
            "server.event_capacity must be greater than zero"
        );
        Ok(())
    }

    /// Load from `FIELDGATE_CONFIG` (or defaults) and apply the environment
    /// overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `FIELDGATE_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(BIND_ENV) {
            self.server.bind = bind;
        }

        let database = lookup(MONGO_DATABASE_ENV);
        if let Some(uri) = lookup(MONGO_URI_ENV) {
            let database = database.unwrap_or_else(|| match &self.storage {
                StorageConfig::Mongodb { database, .. } => database.clone(),
                StorageConfig::InMemory => default_database(),
            });
            self.storage = StorageConfig::Mongodb { uri, database };
        } else if let (StorageConfig::Mongodb { database: current, .. }, Some(database)) =
            (&mut self.storage, database)
        {
            *current = database;
        }
    }

    /// Compile the entity registry: built-in policies first, then the ones
    /// declared in the file
    pub fn registry(&self) -> Result<EntityRegistry, ApiError> {
        let mut registry = EntityRegistry::new().with(users_descriptor()?);
        for entity in &self.entities {
            registry.register(entity.compile()?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.storage, StorageConfig::InMemory);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  bind: 127.0.0.1:8080
  welcome: hello
storage:
  backend: mongodb
  uri: mongodb://db:27017
identity:
  tokens:
    - token: t-1
      subject_id: sub-1
entities:
  - name: notes
    writable: [title, kind]
    required: [title]
    readable: [title, kind]
    constraints:
      - kind: one_of
        field: kind
        allowed: [DRAFT, FINAL]
    empty_collections: reject
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.event_capacity, 1024);
        assert_eq!(
            config.storage,
            StorageConfig::Mongodb {
                uri: "mongodb://db:27017".to_string(),
                database: "fieldgate".to_string(),
            }
        );
        assert_eq!(config.identity.tokens[0].email, None);

        let registry = config.registry().unwrap();
        let notes = registry.describe("notes").unwrap();
        assert_eq!(notes.empty_collections(), EmptyCollectionPolicy::Reject);
        assert!(registry.describe("users").is_ok());
    }

    #[test]
    fn test_zero_event_capacity_is_rejected() {
        let err = AppConfig::from_yaml_str("server:\n  event_capacity: 0\n").unwrap_err();
        assert!(err.to_string().contains("event_capacity"));

        let mut config = AppConfig::default();
        config.server.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_lists_compile_into_descriptor() {
        let yaml = r#"
entities:
  - name: notes
    writable: [title, body]
    required: [title]
    readable: [title, body, status]
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        let notes = config.entities[0].compile().unwrap();
        assert_eq!(notes.writable(), ["title".to_string(), "body".to_string()]);
        assert_eq!(notes.required(), ["title".to_string()]);
        assert!(notes.is_writable("body"));
        assert!(!notes.is_writable("status"));
    }

    #[test]
    fn test_inconsistent_policy_is_rejected() {
        let yaml = r#"
entities:
  - name: notes
    writable: [title]
    required: [body]
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(config.registry(), Err(ApiError::Configuration(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (BIND_ENV, "127.0.0.1:9999"),
            (MONGO_URI_ENV, "mongodb://override:27017"),
            (MONGO_DATABASE_ENV, "other"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.bind, "127.0.0.1:9999");
        assert_eq!(
            config.storage,
            StorageConfig::Mongodb {
                uri: "mongodb://override:27017".to_string(),
                database: "other".to_string(),
            }
        );
    }

    #[test]
    fn test_database_override_keeps_uri() {
        let mut config = AppConfig {
            storage: StorageConfig::Mongodb {
                uri: "mongodb://db:27017".to_string(),
                database: "fieldgate".to_string(),
            },
            ..Default::default()
        };
        config.apply_overrides(|key| (key == MONGO_DATABASE_ENV).then(|| "renamed".to_string()));
        assert_eq!(
            config.storage,
            StorageConfig::Mongodb {
                uri: "mongodb://db:27017".to_string(),
                database: "renamed".to_string(),
            }
        );
    }
}
