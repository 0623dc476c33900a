//! User HTTP handlers

use super::descriptor::{IMAGE, Users};
use super::repository::UserRepository;
use crate::core::auth::Principal;
use crate::core::error::{ApiError, ValidationError};
use crate::core::images::NewImage;
use crate::core::query::PaginatedResult;
use crate::core::registry::EntityRegistry;
use crate::core::store::Document;
use crate::core::validation::{AcceptedProps, QueryBody, RequiredProps};
use axum::extract::{FromRef, Path, State};
use axum::response::Json;
use serde_json::Value;
use std::sync::Arc;

/// User-specific AppState
#[derive(Clone)]
pub struct UserAppState {
    pub repository: UserRepository,
    pub registry: Arc<EntityRegistry>,
}

impl FromRef<UserAppState> for Arc<EntityRegistry> {
    fn from_ref(state: &UserAppState) -> Self {
        state.registry.clone()
    }
}

/// Image payload: either a bare URL or `{ url, blurHash }`
fn image_payload(value: Value) -> Result<NewImage, ApiError> {
    match value {
        Value::String(url) if !url.is_empty() => Ok(NewImage::new(url)),
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        _ => Err(ValidationError::invalid_payload(format!(
            "'{}' must be a URL or an image object",
            IMAGE
        ))
        .into()),
    }
}

pub async fn list_users(
    State(state): State<UserAppState>,
    QueryBody(query): QueryBody,
) -> Result<Json<PaginatedResult<Document>>, ApiError> {
    state.repository.get_list(query).await.map(Json)
}

pub async fn get_one_user(
    State(state): State<UserAppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    state.repository.get_one(&id).await.map(Json)
}

pub async fn get_auth_user(
    State(state): State<UserAppState>,
    principal: Principal,
) -> Result<Json<Document>, ApiError> {
    state.repository.get_auth_user(&principal).await.map(Json)
}

pub async fn update_user(
    State(state): State<UserAppState>,
    Path(id): Path<String>,
    AcceptedProps(mut payload, _): AcceptedProps<Users>,
) -> Result<Json<bool>, ApiError> {
    let image = payload
        .remove(IMAGE)
        .filter(|value| !value.is_null())
        .map(image_payload)
        .transpose()?;

    state.repository.update(&id, payload, image).await?;
    Ok(Json(true))
}

pub async fn delete_user(
    State(state): State<UserAppState>,
    Path(id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    state.repository.delete(&id).await.map(Json)
}

pub async fn create_user(
    State(state): State<UserAppState>,
    principal: Principal,
    RequiredProps(mut payload, _): RequiredProps<Users>,
) -> Result<Json<Document>, ApiError> {
    let image = payload
        .remove(IMAGE)
        .map(image_payload)
        .transpose()?
        .ok_or_else(|| ValidationError::missing_field(IMAGE))?;

    state
        .repository
        .create(&principal, payload, image)
        .await
        .map(Json)
}
