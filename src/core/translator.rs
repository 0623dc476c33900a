//! Query translation
//!
//! Turns a [`QueryDescriptor`] into a concrete, paginated store fetch. Every
//! field the descriptor names is checked against the entity's readable set
//! before anything reaches the store.

use crate::core::error::{ApiError, ValidationError};
use crate::core::query::{
    Condition, Filter, PaginatedResult, PopulateRequest, QueryDescriptor, total_pages,
};
use crate::core::registry::{EntityDescriptor, EntityRegistry};
use crate::core::store::{Document, DocumentStore, FindOptions, ID_FIELD, Populate};
use std::sync::Arc;

/// Paginated list queries over any registered entity
#[derive(Clone)]
pub struct QueryTranslator {
    store: Arc<dyn DocumentStore>,
    registry: Arc<EntityRegistry>,
}

impl QueryTranslator {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }

    /// Run a paginated fetch
    ///
    /// Count and fetch are issued concurrently and joined; the first failure
    /// wins and is reported as a persistence error.
    pub async fn list(
        &self,
        entity: &str,
        query: QueryDescriptor,
    ) -> Result<PaginatedResult<Document>, ApiError> {
        let descriptor = self.registry.describe(entity)?;
        validate(descriptor, &query)?;

        let options = FindOptions {
            projection: query.projection.clone(),
            sort: query.sort.clone(),
            skip: query.skip(),
            limit: query.limit,
            populate: resolve_population(descriptor, &query.population)?,
        };
        let collection = descriptor.collection();

        let (count, data) = futures::try_join!(
            self.store.count(collection, &query.filter),
            self.store.find(collection, &query.filter, &options),
        )
        .map_err(|e| ApiError::persistence(format!("Failed to list {}", entity), e))?;

        tracing::debug!(entity, count, returned = data.len(), "list query");

        Ok(PaginatedResult {
            count,
            page: query.page(),
            total_pages: total_pages(count, query.limit),
            data,
        })
    }
}

/// Reject descriptors naming unreadable fields or malformed clauses
pub fn validate(descriptor: &EntityDescriptor, query: &QueryDescriptor) -> Result<(), ValidationError> {
    if let Some((field, _)) = query.filter.iter().find(|(f, _)| !descriptor.is_readable(f)) {
        return Err(ValidationError::unknown_field(field));
    }
    check_operators(&query.filter)?;

    if let Some(field) = query.sort.iter().map(|(f, _)| f).find(|f| !descriptor.is_readable(f)) {
        return Err(ValidationError::unknown_field(field));
    }

    if let Some(projection) = &query.projection {
        if let Some(field) = projection.fields().find(|f| !descriptor.is_readable(f)) {
            return Err(ValidationError::unknown_field(field));
        }
        if projection.is_mixed() {
            return Err(ValidationError::invalid_query(
                "Projection cannot mix inclusion and exclusion",
            ));
        }
    }

    Ok(())
}

/// Only the operators of [`Operators`](crate::core::query::Operators) may
/// reach a store
fn check_operators(filter: &Filter) -> Result<(), ValidationError> {
    for (field, condition) in filter.iter() {
        if let Condition::Operators(ops) = condition
            && ops.is_empty()
        {
            return Err(ValidationError::invalid_query(format!(
                "Empty operator object for '{}'",
                field
            )));
        }
        if let Some(operator) = condition.unsupported_operator() {
            return Err(ValidationError::invalid_query(format!(
                "Unsupported operator '{}' on '{}'",
                operator, field
            )));
        }
    }
    Ok(())
}

/// Map population requests onto the entity's declared references
///
/// The referenced ids are matched on `id`, so a `match` clause may not
/// constrain it.
pub fn resolve_population(
    descriptor: &EntityDescriptor,
    requests: &[PopulateRequest],
) -> Result<Vec<Populate>, ValidationError> {
    requests
        .iter()
        .map(|request| {
            let reference = descriptor.reference(request.path()).ok_or_else(|| {
                ValidationError::invalid_query(format!(
                    "'{}' is not a reference of {}",
                    request.path(),
                    descriptor.name()
                ))
            })?;
            let filter = request.filter().cloned().unwrap_or_default();
            check_operators(&filter)?;
            if filter.iter().any(|(field, _)| field == ID_FIELD) {
                return Err(ValidationError::invalid_query(format!(
                    "Population of '{}' cannot match on '{}'",
                    reference.field, ID_FIELD
                )));
            }
            Ok(Populate {
                path: reference.field.clone(),
                collection: reference.collection.clone(),
                filter,
                select: request.select().cloned(),
            })
        })
        .collect()
}
