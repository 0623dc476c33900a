//! Field policy checks
//!
//! Both checks are strict and fail fast: the first violation is returned and
//! nothing is silently dropped. Neither mutates the caller's record.

use crate::core::error::{ApiError, ValidationError};
use crate::core::registry::{EmptyCollectionPolicy, EntityDescriptor, EntityRegistry, FieldConstraint};
use crate::core::store::Document;
use serde_json::Value;

/// Reject values outside a field's constraint, then fields outside the
/// writable set
///
/// Constraints are evaluated first so that a bad `role` is reported as an
/// invalid value even when other fields are unknown. A constrained field
/// holding `null` or a non-string is outside the set.
pub fn check_allowed(descriptor: &EntityDescriptor, partial: &Document) -> Result<(), ValidationError> {
    for constraint in descriptor.constraints() {
        match constraint {
            FieldConstraint::OneOf { field, allowed } => {
                if let Some(value) = partial.get(field) {
                    let accepted = value
                        .as_str()
                        .is_some_and(|v| allowed.iter().any(|a| a == v));
                    if !accepted {
                        return Err(ValidationError::invalid_enum(field, allowed));
                    }
                }
            }
        }
    }

    match partial.keys().find(|key| !descriptor.is_writable(key)) {
        Some(unknown) => Err(ValidationError::unknown_field(unknown)),
        None => Ok(()),
    }
}

/// Check every required field, in declaration order
pub fn check_required(descriptor: &EntityDescriptor, partial: &Document) -> Result<(), ValidationError> {
    let working: Document = partial
        .iter()
        .filter(|(key, _)| descriptor.required().contains(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for field in descriptor.required() {
        match working.get(field) {
            None => return Err(ValidationError::missing_field(field)),
            Some(Value::Null) => return Err(ValidationError::null_field(field)),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::empty_string(field));
            }
            Some(Value::Array(items))
                if items.is_empty()
                    && descriptor.empty_collections() == EmptyCollectionPolicy::Reject =>
            {
                return Err(ValidationError::empty_collection(field));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Validate a partial record against an entity's writable set and
/// constraints, handing it back unchanged
pub fn restrict_to_allowed(
    registry: &EntityRegistry,
    entity: &str,
    partial: Document,
) -> Result<Document, ApiError> {
    check_allowed(registry.describe(entity)?, &partial)?;
    Ok(partial)
}

/// Validate that a partial record carries every required field of an entity,
/// handing it back unchanged
pub fn enforce_required(
    registry: &EntityRegistry,
    entity: &str,
    partial: Document,
) -> Result<Document, ApiError> {
    check_required(registry.describe(entity)?, &partial)?;
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ValidationKind;
    use serde_json::json;

    fn registry(policy: EmptyCollectionPolicy) -> EntityRegistry {
        EntityRegistry::new().with(
            EntityDescriptor::builder("users")
                .writable(&["name", "email", "role", "image", "tags"])
                .required(&["name", "image", "tags"])
                .readable(&["name", "email", "role", "image", "tags"])
                .one_of("role", &["ADMIN", "JUNIOR", "CURATOR"])
                .empty_collections(policy)
                .build()
                .unwrap(),
        )
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn kind_of(result: Result<Document, ApiError>) -> Option<(ValidationKind, Option<String>)> {
        match result {
            Err(ApiError::Validation(e)) => Some((e.kind, e.field)),
            _ => None,
        }
    }

    #[test]
    fn test_restrict_accepts_writable_subset_unchanged() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let input = doc(json!({"name": "Ana", "email": "ana@example.com", "role": "JUNIOR"}));
        let output = restrict_to_allowed(&registry, "users", input.clone()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_restrict_rejects_unknown_field() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let result = restrict_to_allowed(&registry, "users", doc(json!({"name": "Ana", "isAdmin": true})));
        assert_eq!(
            kind_of(result),
            Some((ValidationKind::UnknownField, Some("isAdmin".to_string())))
        );
    }

    #[test]
    fn test_restrict_reports_first_unknown_field_in_input_order() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let result = restrict_to_allowed(&registry, "users", doc(json!({"zeta": 1, "alpha": 2})));
        assert_eq!(
            kind_of(result),
            Some((ValidationKind::UnknownField, Some("zeta".to_string())))
        );
    }

    #[test]
    fn test_role_checked_before_unknown_fields() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let result = restrict_to_allowed(&registry, "users", doc(json!({"bogus": 1, "role": "OWNER"})));
        assert_eq!(
            kind_of(result),
            Some((ValidationKind::InvalidEnum, Some("role".to_string())))
        );
    }

    #[test]
    fn test_role_values() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        for role in ["ADMIN", "JUNIOR", "CURATOR"] {
            assert!(restrict_to_allowed(&registry, "users", doc(json!({"role": role}))).is_ok());
        }
        for role in [json!("admin"), json!("JUN"), json!(""), json!(null), json!(1)] {
            let result = restrict_to_allowed(&registry, "users", doc(json!({"role": role})));
            assert_eq!(
                kind_of(result),
                Some((ValidationKind::InvalidEnum, Some("role".to_string())))
            );
        }
    }

    #[test]
    fn test_unknown_entity_is_configuration_error() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let result = restrict_to_allowed(&registry, "ghosts", Document::new());
        assert!(matches!(result, Err(ApiError::Configuration(_))));
    }

    #[test]
    fn test_required_missing_null_empty() {
        let registry = registry(EmptyCollectionPolicy::Ignore);

        let result = enforce_required(&registry, "users", doc(json!({"image": "i", "tags": ["a"]})));
        assert_eq!(kind_of(result), Some((ValidationKind::MissingField, Some("name".into()))));

        let result = enforce_required(
            &registry,
            "users",
            doc(json!({"name": null, "image": "i", "tags": ["a"]})),
        );
        assert_eq!(kind_of(result), Some((ValidationKind::NullField, Some("name".into()))));

        let result = enforce_required(
            &registry,
            "users",
            doc(json!({"name": "Ana", "image": "", "tags": ["a"]})),
        );
        assert_eq!(kind_of(result), Some((ValidationKind::EmptyString, Some("image".into()))));
    }

    #[test]
    fn test_required_follows_declared_order() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let result = enforce_required(&registry, "users", doc(json!({"image": null})));
        assert_eq!(kind_of(result), Some((ValidationKind::MissingField, Some("name".into()))));
    }

    #[test]
    fn test_required_returns_input_unchanged() {
        let registry = registry(EmptyCollectionPolicy::Ignore);
        let input = doc(json!({"name": "Ana", "image": "i", "tags": ["a"], "email": "e"}));
        let output = enforce_required(&registry, "users", input.clone()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_empty_collection_policy() {
        let input = doc(json!({"name": "Ana", "image": "i", "tags": []}));

        let lenient = registry(EmptyCollectionPolicy::Ignore);
        assert!(enforce_required(&lenient, "users", input.clone()).is_ok());

        let strict = registry(EmptyCollectionPolicy::Reject);
        let result = enforce_required(&strict, "users", input);
        assert_eq!(kind_of(result), Some((ValidationKind::EmptyCollection, Some("tags".into()))));
    }
}
