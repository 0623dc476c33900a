//! Field policy and routes of the users entity

use super::handlers::{
    UserAppState, create_user, delete_user, get_auth_user, get_one_user, list_users, update_user,
};
use crate::core::auth::{Role, SUBJECT_FIELD};
use crate::core::error::ApiError;
use crate::core::registry::EntityDescriptor;
use crate::core::validation::PolicyEntity;
use crate::storage::IMAGES_COLLECTION;
use axum::Router;
use axum::routing::{delete, get, post, put};

pub const USERS: &str = "users";

pub const NOTIFICATION_TOKENS: &str = "notificationTokens";
pub const NEW_FAVORITE: &str = "newFavorite";
pub const REMOVE_FAVORITE: &str = "removeFavorite";
pub const FAVORITE_OWNERS: &str = "favoriteOwners";
pub const IMAGE: &str = "image";

/// Fields returned by `update` and `create`
pub const PUBLIC_FIELDS: [&str; 7] = [
    "name",
    "email",
    IMAGE,
    "preferences",
    "role",
    FAVORITE_OWNERS,
    SUBJECT_FIELD,
];

/// Policy marker for the extractors
pub struct Users;

impl PolicyEntity for Users {
    const ENTITY: &'static str = USERS;
}

/// Built-in policy of the users entity
pub fn users_descriptor() -> Result<EntityDescriptor, ApiError> {
    EntityDescriptor::builder(USERS)
        .writable(&[
            "name",
            "email",
            "role",
            IMAGE,
            "status",
            "preferences",
            "serviceZone",
            NEW_FAVORITE,
            REMOVE_FAVORITE,
            NOTIFICATION_TOKENS,
        ])
        .required(&["name", IMAGE])
        .readable(&[
            "name",
            "email",
            "role",
            IMAGE,
            "status",
            "preferences",
            "serviceZone",
            FAVORITE_OWNERS,
            NOTIFICATION_TOKENS,
            SUBJECT_FIELD,
        ])
        .one_of("role", &Role::names())
        .reference(IMAGE, IMAGES_COLLECTION)
        .build()
}

/// Routes of the users entity; all of them expect an authenticated caller
pub fn user_routes(state: UserAppState) -> Router {
    Router::new()
        .route("/users/getList", post(list_users))
        .route("/users/getOne/{id}", get(get_one_user))
        .route("/users/getAuthUser", get(get_auth_user))
        .route("/users/update/{id}", put(update_user))
        .route("/users/delete/{id}", delete(delete_user))
        .route("/users/create", post(create_user))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::EntityRegistry;
    use crate::core::validation::{enforce_required, restrict_to_allowed};
    use serde_json::json;

    #[test]
    fn test_users_descriptor_builds() {
        let descriptor = users_descriptor().unwrap();
        assert_eq!(descriptor.collection(), "users");
        assert_eq!(descriptor.required(), &["name".to_string(), "image".to_string()]);
        assert!(descriptor.reference(IMAGE).is_some());
        for field in PUBLIC_FIELDS {
            assert!(descriptor.is_readable(field), "{} should be readable", field);
        }
    }

    #[test]
    fn test_users_policy() {
        let registry = EntityRegistry::new().with(users_descriptor().unwrap());
        let ok = json!({"name": "Ana", "role": "CURATOR", "newFavorite": "o-1"});
        assert!(restrict_to_allowed(&registry, USERS, ok.as_object().cloned().unwrap()).is_ok());

        let bad = json!({"name": "Ana", "favoriteOwners": ["o-1"]});
        assert!(restrict_to_allowed(&registry, USERS, bad.as_object().cloned().unwrap()).is_err());

        let missing_image = json!({"name": "Ana"});
        assert!(enforce_required(&registry, USERS, missing_image.as_object().cloned().unwrap()).is_err());
    }
}
