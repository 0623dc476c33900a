//! User record orchestration
//!
//! Every public operation reports store failures as a persistence error
//! named after the operation, while not-found and validation errors reach
//! the caller unchanged.

use super::descriptor::{
    FAVORITE_OWNERS, IMAGE, NEW_FAVORITE, NOTIFICATION_TOKENS, PUBLIC_FIELDS, REMOVE_FAVORITE, USERS,
};
use crate::core::auth::{Principal, SUBJECT_FIELD};
use crate::core::error::{ApiError, ValidationError};
use crate::core::events::{EventBus, RecordEvent, ServiceEvent};
use crate::core::identity::{Claims, ClaimsPropagator};
use crate::core::images::{ImageService, NewImage};
use crate::core::query::{Filter, PaginatedResult, Projection, QueryDescriptor};
use crate::core::registry::{EntityDescriptor, EntityRegistry};
use crate::core::store::{Document, DocumentStore, FindOptions, ID_FIELD, Populate, Update};
use crate::core::translator::QueryTranslator;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
    images: Arc<dyn ImageService>,
    registry: Arc<EntityRegistry>,
    translator: QueryTranslator,
    claims: ClaimsPropagator,
    event_bus: EventBus,
}

fn not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("Could not find user for id: {}", id))
}

/// `notificationTokens` may be sent as one token or a list of tokens
fn token_values(value: Value) -> Result<Vec<Value>, ValidationError> {
    match value {
        Value::String(_) => Ok(vec![value]),
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(items),
        _ => Err(ValidationError::invalid_payload(format!(
            "'{}' must be a string or an array of strings",
            NOTIFICATION_TOKENS
        ))),
    }
}

/// Remove a field, treating an explicit `null` as absent
fn take(fields: &mut Document, field: &str) -> Option<Value> {
    fields.remove(field).filter(|value| !value.is_null())
}

impl UserRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        images: Arc<dyn ImageService>,
        registry: Arc<EntityRegistry>,
        claims: ClaimsPropagator,
        event_bus: EventBus,
    ) -> Self {
        Self {
            translator: QueryTranslator::new(store.clone(), registry.clone()),
            store,
            images,
            registry,
            claims,
            event_bus,
        }
    }

    fn descriptor(&self) -> Result<&EntityDescriptor, ApiError> {
        self.registry.describe(USERS)
    }

    /// Active images only, projected to `select`
    fn image_population(
        descriptor: &EntityDescriptor,
        select: &[&str],
    ) -> Result<Populate, ApiError> {
        let reference = descriptor.reference(IMAGE).ok_or_else(|| {
            ApiError::Configuration(format!("'{}' is not a reference of {}", IMAGE, USERS))
        })?;
        Ok(Populate {
            path: reference.field.clone(),
            collection: reference.collection.clone(),
            filter: Filter::eq("status", true),
            select: Some(Projection::include(select)),
        })
    }

    fn public_view(descriptor: &EntityDescriptor) -> Result<FindOptions, ApiError> {
        Ok(FindOptions::default()
            .with_projection(Projection::include(&PUBLIC_FIELDS))
            .with_populate(Self::image_population(descriptor, &["url", "blurHash"])?))
    }

    pub async fn get_list(
        &self,
        query: QueryDescriptor,
    ) -> Result<PaginatedResult<Document>, ApiError> {
        self.translator.list(USERS, query).await
    }

    pub async fn get_one(&self, id: &str) -> Result<Document, ApiError> {
        self.find_user(Filter::by_id(id), id)
            .await
            .map_err(|e| e.or_persistence("Failed to get user"))
    }

    pub async fn get_auth_user(&self, principal: &Principal) -> Result<Document, ApiError> {
        let filter = Filter::eq(SUBJECT_FIELD, principal.subject_id.as_str());
        self.find_user(filter, &principal.subject_id)
            .await
            .map_err(|e| e.or_persistence("Failed to get authenticated user"))
    }

    async fn find_user(&self, filter: Filter, key: &str) -> Result<Document, ApiError> {
        let descriptor = self.descriptor()?;
        let options =
            FindOptions::default().with_populate(Self::image_population(descriptor, &["url"])?);

        self.store
            .find_one(descriptor.collection(), &filter, &options)
            .await?
            .ok_or_else(|| not_found(key))
    }

    /// Apply a partial update, returning the public view of the record
    ///
    /// `image`, when given, replaces every image the record owns. A `role`
    /// in `partial` is pushed to the identity provider in the background
    /// once the record has been updated.
    pub async fn update(
        &self,
        id: &str,
        partial: Document,
        image: Option<NewImage>,
    ) -> Result<Document, ApiError> {
        self.apply_update(id, partial, image)
            .await
            .map_err(|e| e.or_persistence("Failed to update user"))
    }

    async fn apply_update(
        &self,
        id: &str,
        partial: Document,
        image: Option<NewImage>,
    ) -> Result<Document, ApiError> {
        let descriptor = self.descriptor()?;
        let collection = descriptor.collection();
        let filter = Filter::by_id(id);
        let mut fields = partial;
        let role = fields.get("role").and_then(Value::as_str).map(str::to_string);

        if let Some(tokens) = take(&mut fields, NOTIFICATION_TOKENS) {
            let incoming = token_values(tokens)?;
            let options = FindOptions::default()
                .with_projection(Projection::include(&[NOTIFICATION_TOKENS]));
            let current = self
                .store
                .find_one(collection, &filter, &options)
                .await?
                .ok_or_else(|| not_found(id))?;

            let mut merged = match current.get(NOTIFICATION_TOKENS) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            for token in incoming {
                if !merged.contains(&token) {
                    merged.push(token);
                }
            }
            self.store
                .find_one_and_update(
                    collection,
                    &filter,
                    &Update::set_field(NOTIFICATION_TOKENS, merged),
                    &FindOptions::default(),
                )
                .await?;
        }

        if let Some(favorite) = take(&mut fields, NEW_FAVORITE) {
            self.store
                .find_one_and_update(
                    collection,
                    &filter,
                    &Update::add_to_set(FAVORITE_OWNERS, favorite),
                    &FindOptions::default(),
                )
                .await?
                .ok_or_else(|| not_found(id))?;
        }

        if let Some(favorite) = take(&mut fields, REMOVE_FAVORITE) {
            self.store
                .find_one_and_update(
                    collection,
                    &filter,
                    &Update::pull(FAVORITE_OWNERS, favorite),
                    &FindOptions::default(),
                )
                .await?
                .ok_or_else(|| not_found(id))?;
        }

        if let Some(image) = image {
            if self.store.count(collection, &filter).await? == 0 {
                return Err(not_found(id));
            }
            let image_id = self.replace_image(id, image).await?;
            fields.insert(IMAGE.to_string(), Value::String(image_id));
        }

        let updated = self
            .store
            .find_one_and_update(
                collection,
                &filter,
                &Update::set(fields),
                &Self::public_view(descriptor)?,
            )
            .await?
            .ok_or_else(|| not_found(id))?;

        if let Some(role) = role {
            self.propagate_role(&updated, role, id);
        }

        self.event_bus
            .publish(ServiceEvent::Record(RecordEvent::Updated {
                entity_type: USERS.to_string(),
                record_id: id.to_string(),
                data: Value::Object(updated.clone()),
            }));
        tracing::info!(user_id = %id, "user updated");

        Ok(updated)
    }

    /// Delete the record's images and store `image` in their place
    async fn replace_image(&self, id: &str, image: NewImage) -> Result<String, ApiError> {
        let removed = self.images.delete_by_parent(USERS, id).await?;
        let inserted = self
            .images
            .insert_images(vec![image.owned_by(USERS, id)])
            .await?;
        let image_id = inserted
            .into_iter()
            .next()
            .map(|image| image.id)
            .ok_or_else(|| ApiError::persistence("Image was not stored", "empty insert result"))?;

        tracing::debug!(user_id = %id, removed, image_id = %image_id, "replaced user image");
        Ok(image_id)
    }

    fn propagate_role(&self, record: &Document, role: String, id: &str) {
        match record.get(SUBJECT_FIELD).and_then(Value::as_str) {
            Some(subject_id) => {
                self.claims.dispatch(
                    subject_id.to_string(),
                    Claims {
                        role,
                        internal_id: id.to_string(),
                    },
                );
            }
            None => {
                tracing::warn!(user_id = %id, "role changed on a user without subject id; claims not propagated");
            }
        }
    }

    /// Soft delete: the record stays readable with `status = false`
    pub async fn delete(&self, id: &str) -> Result<bool, ApiError> {
        self.soft_delete(id)
            .await
            .map_err(|e| e.or_persistence("Failed to delete user"))
    }

    async fn soft_delete(&self, id: &str) -> Result<bool, ApiError> {
        let descriptor = self.descriptor()?;
        let options = FindOptions::default().with_projection(Projection::include(&[ID_FIELD]));
        self.store
            .find_one_and_update(
                descriptor.collection(),
                &Filter::by_id(id),
                &Update::set_field("status", false),
                &options,
            )
            .await?
            .ok_or_else(|| not_found(id))?;

        self.event_bus
            .publish(ServiceEvent::Record(RecordEvent::Deleted {
                entity_type: USERS.to_string(),
                record_id: id.to_string(),
            }));
        tracing::info!(user_id = %id, "user deleted");
        Ok(true)
    }

    /// Create the caller's user record
    ///
    /// `partial` must already have passed the required-field and allow-list
    /// checks. The record is bound to the principal's subject id and created
    /// active.
    pub async fn create(
        &self,
        principal: &Principal,
        partial: Document,
        image: NewImage,
    ) -> Result<Document, ApiError> {
        self.insert_user(principal, partial, image)
            .await
            .map_err(|e| e.or_persistence("Failed to create user"))
    }

    async fn insert_user(
        &self,
        principal: &Principal,
        partial: Document,
        image: NewImage,
    ) -> Result<Document, ApiError> {
        let descriptor = self.descriptor()?;
        let collection = descriptor.collection();
        let by_subject = Filter::eq(SUBJECT_FIELD, principal.subject_id.as_str());

        if self.store.count(collection, &by_subject).await? > 0 {
            return Err(ApiError::Conflict(format!(
                "A user already exists for subject {}",
                principal.subject_id
            )));
        }

        let mut fields = partial;
        fields.remove(IMAGE);
        fields.remove(REMOVE_FAVORITE);
        if let Some(favorite) = take(&mut fields, NEW_FAVORITE) {
            fields.insert(FAVORITE_OWNERS.to_string(), Value::Array(vec![favorite]));
        }
        if let Some(tokens) = take(&mut fields, NOTIFICATION_TOKENS) {
            fields.insert(NOTIFICATION_TOKENS.to_string(), Value::Array(token_values(tokens)?));
        }
        if let Some(email) = &principal.email {
            fields.entry("email").or_insert_with(|| Value::String(email.clone()));
        }
        fields.insert(SUBJECT_FIELD.to_string(), Value::String(principal.subject_id.clone()));
        fields.insert("status".to_string(), Value::Bool(true));
        let role = fields.get("role").and_then(Value::as_str).map(str::to_string);

        let id = self
            .store
            .insert_many(collection, vec![fields])
            .await?
            .into_iter()
            .next()
            .and_then(|doc| doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| ApiError::persistence("User was not stored", "empty insert result"))?;

        let image_id = self.replace_image(&id, image).await?;
        let created = self
            .store
            .find_one_and_update(
                collection,
                &Filter::by_id(&id),
                &Update::set_field(IMAGE, image_id),
                &Self::public_view(descriptor)?,
            )
            .await?
            .ok_or_else(|| not_found(&id))?;

        if let Some(role) = role {
            self.propagate_role(&created, role, &id);
        }

        self.event_bus
            .publish(ServiceEvent::Record(RecordEvent::Created {
                entity_type: USERS.to_string(),
                record_id: id.clone(),
                data: Value::Object(created.clone()),
            }));
        tracing::info!(user_id = %id, subject_id = %principal.subject_id, "user created");

        Ok(created)
    }
}
