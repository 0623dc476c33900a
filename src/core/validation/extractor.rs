//! Axum extractors running the field policy on request bodies
//!
//! Handlers receive a payload that has already been checked against the
//! entity's policy; a violation short-circuits the request with a 400.
//!
//! ```rust,ignore
//! pub async fn update_user(
//!     Path(id): Path<String>,
//!     AcceptedProps(payload, _): AcceptedProps<Users>,
//! ) -> Result<Json<bool>, ApiError> {
//!     // payload only contains writable fields with valid values
//! }
//! ```

use super::policy::{check_allowed, check_required};
use crate::core::error::{ApiError, ValidationError};
use crate::core::query::QueryDescriptor;
use crate::core::registry::EntityRegistry;
use crate::core::store::Document;
use axum::Json;
use axum::extract::{FromRef, FromRequest, Request};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Entity whose policy an extractor should apply
pub trait PolicyEntity {
    /// Name the entity is registered under
    const ENTITY: &'static str;
}

/// Body restricted to the entity's writable fields
pub struct AcceptedProps<E>(pub Document, pub PhantomData<E>);

/// Body carrying every required field and nothing outside the writable set
pub struct RequiredProps<E>(pub Document, pub PhantomData<E>);

/// `getList` body parsed into a [`QueryDescriptor`]
///
/// A body that is valid JSON but not a valid descriptor (unknown sort
/// direction, negative limit) is an `INVALID_QUERY`.
pub struct QueryBody(pub QueryDescriptor);

impl<E> AcceptedProps<E> {
    pub fn into_inner(self) -> Document {
        self.0
    }
}

impl<E> RequiredProps<E> {
    pub fn into_inner(self) -> Document {
        self.0
    }
}

async fn json_object<S>(req: Request, state: &S) -> Result<Document, ApiError>
where
    S: Send + Sync,
{
    let Json(payload): Json<Value> = Json::from_request(req, state)
        .await
        .map_err(|e| ValidationError::invalid_payload(e.body_text()))?;

    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::invalid_payload("Request body must be a JSON object").into()),
    }
}

impl<S, E> FromRequest<S> for AcceptedProps<E>
where
    S: Send + Sync,
    Arc<EntityRegistry>: FromRef<S>,
    E: PolicyEntity + Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let payload = json_object(req, state).await?;
        let registry = Arc::<EntityRegistry>::from_ref(state);
        check_allowed(registry.describe(E::ENTITY)?, &payload)?;
        Ok(AcceptedProps(payload, PhantomData))
    }
}

impl<S, E> FromRequest<S> for RequiredProps<E>
where
    S: Send + Sync,
    Arc<EntityRegistry>: FromRef<S>,
    E: PolicyEntity + Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let payload = json_object(req, state).await?;
        let registry = Arc::<EntityRegistry>::from_ref(state);
        let descriptor = registry.describe(E::ENTITY)?;
        check_required(descriptor, &payload)?;
        check_allowed(descriptor, &payload)?;
        Ok(RequiredProps(payload, PhantomData))
    }
}

impl<S> FromRequest<S> for QueryBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let payload = json_object(req, state).await?;
        let query = serde_json::from_value(Value::Object(payload))
            .map_err(|e| ValidationError::invalid_query(e.to_string()))?;
        Ok(QueryBody(query))
    }
}
