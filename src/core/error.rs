//! Typed error handling for fieldgate
//!
//! Every failure that can reach an HTTP caller is an [`ApiError`]. The
//! variants map one-to-one onto the status classes the API exposes:
//!
//! - [`ApiError::Validation`]: unknown field, invalid enum value, missing /
//!   null / empty required field, malformed query (400)
//! - [`ApiError::Authentication`]: missing or rejected bearer credential (401)
//! - [`ApiError::NotFound`]: record absent (404), propagated verbatim
//! - [`ApiError::Conflict`]: record already exists (409)
//! - [`ApiError::Persistence`]: store failure, cause kept for logs only (500)
//! - [`ApiError::Configuration`]: unknown entity, inconsistent policy (500)
//!
//! # Example
//!
//! ```rust,ignore
//! match repository.get_one(&id).await {
//!     Ok(user) => println!("{}", user["name"]),
//!     Err(ApiError::NotFound(message)) => println!("{}", message),
//!     Err(e) => eprintln!("other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crate::core::store::StoreError;
use serde::Serialize;
use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Payload or query rejected by the field policy
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Caller could not be authenticated
    #[error("{0}")]
    Authentication(String),

    /// Requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Record already exists
    #[error("{0}")]
    Conflict(String),

    /// The persistence layer failed
    ///
    /// `context` is what the caller sees; `source` is only logged.
    #[error("{context}")]
    Persistence {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Registry or policy misconfiguration
    #[error("{0}")]
    Configuration(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Wrap a lower-level failure as a persistence error
    pub fn persistence(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ApiError::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::Authentication(message.into())
    }

    /// Keep client errors as they are and report everything else as a
    /// persistence failure of the named operation
    ///
    /// Repository operations funnel every failure through this so that a
    /// classified 404 is never rewrapped as a 500.
    pub fn or_persistence(self, context: &str) -> Self {
        match self {
            ApiError::NotFound(_) | ApiError::Validation(_) | ApiError::Conflict(_) => self,
            ApiError::Persistence { source, .. } => ApiError::Persistence {
                context: context.to_string(),
                source,
            },
            other => ApiError::persistence(context, other.to_string()),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(e) => e.kind.error_code(),
            ApiError::Authentication(_) => "UNAUTHENTICATED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Persistence { .. } => "PERSISTENCE_ERROR",
            ApiError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Validation(ValidationError {
                field: Some(field),
                kind,
                ..
            }) => Some(serde_json::json!({ "field": field, "kind": kind })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Persistence { context, source } => {
                tracing::error!(error = %source, "{}", context);
            }
            ApiError::Configuration(message) => {
                tracing::error!("configuration error: {}", message);
            }
            _ => {}
        }

        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// What a validation failure was about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationKind {
    /// Field is not in the entity's writable (or readable) set
    UnknownField,
    /// Value is outside the field's enumerated set
    InvalidEnum,
    /// Required field absent
    MissingField,
    /// Required field present but null
    NullField,
    /// Required field is an empty string
    EmptyString,
    /// Required field is an empty array
    EmptyCollection,
    /// Query descriptor is malformed
    InvalidQuery,
    /// Request body is not a JSON object
    InvalidPayload,
}

impl ValidationKind {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationKind::UnknownField => "UNKNOWN_FIELD",
            ValidationKind::InvalidEnum => "INVALID_ENUM",
            ValidationKind::MissingField => "MISSING_FIELD",
            ValidationKind::NullField => "NULL_FIELD",
            ValidationKind::EmptyString => "EMPTY_STRING",
            ValidationKind::EmptyCollection => "EMPTY_COLLECTION",
            ValidationKind::InvalidQuery => "INVALID_QUERY",
            ValidationKind::InvalidPayload => "INVALID_PAYLOAD",
        }
    }
}

/// A single, fail-fast validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn unknown_field(field: &str) -> Self {
        Self {
            kind: ValidationKind::UnknownField,
            field: Some(field.to_string()),
            message: format!("The property '{}' is not valid", field),
        }
    }

    pub fn invalid_enum(field: &str, allowed: &[String]) -> Self {
        Self {
            kind: ValidationKind::InvalidEnum,
            field: Some(field.to_string()),
            message: format!("'{}' must be one of {}", field, allowed.join(", ")),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self {
            kind: ValidationKind::MissingField,
            field: Some(field.to_string()),
            message: format!("The property '{}' is required", field),
        }
    }

    pub fn null_field(field: &str) -> Self {
        Self {
            kind: ValidationKind::NullField,
            field: Some(field.to_string()),
            message: format!("The property '{}' cannot be null", field),
        }
    }

    pub fn empty_string(field: &str) -> Self {
        Self {
            kind: ValidationKind::EmptyString,
            field: Some(field.to_string()),
            message: format!("The property '{}' cannot be an empty string", field),
        }
    }

    pub fn empty_collection(field: &str) -> Self {
        Self {
            kind: ValidationKind::EmptyCollection,
            field: Some(field.to_string()),
            message: format!("The property '{}' cannot be an empty array", field),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationKind::InvalidQuery,
            field: None,
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationKind::InvalidPayload,
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::persistence("Database error", err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(ValidationError::invalid_payload(format!(
            "Invalid JSON: {}",
            err
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from(ValidationError::unknown_field("foo")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::authentication("no token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::persistence("Failed to list users", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Configuration("Invalid route".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_persistence_hides_cause() {
        let err = ApiError::persistence("Failed to update user", "connection reset by peer");
        let response = err.to_response();
        assert_eq!(response.code, "PERSISTENCE_ERROR");
        assert_eq!(response.message, "Failed to update user");
        assert!(!response.message.contains("connection reset"));
    }

    #[test]
    fn test_or_persistence_renames_store_failures() {
        let err = ApiError::from(StoreError::Malformed("bad id".into())).or_persistence("Failed to delete user");
        let response = err.to_response();
        assert_eq!(response.code, "PERSISTENCE_ERROR");
        assert_eq!(response.message, "Failed to delete user");
    }

    #[test]
    fn test_or_persistence_keeps_not_found() {
        let err = ApiError::not_found("Could not find user for id: 42").or_persistence("ctx");
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = ApiError::Configuration("bad".into()).or_persistence("Failed to get user");
        match err {
            ApiError::Persistence { context, .. } => assert_eq!(context, "Failed to get user"),
            other => panic!("Expected Persistence, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_details() {
        let err = ApiError::from(ValidationError::missing_field("name"));
        let response = err.to_response();
        assert_eq!(response.code, "MISSING_FIELD");
        let details = response.details.expect("details should be present");
        assert_eq!(details["field"], "name");
        assert_eq!(details["kind"], "MISSING_FIELD");
    }

    #[test]
    fn test_invalid_enum_message_lists_allowed_values() {
        let err = ValidationError::invalid_enum("role", &["ADMIN".into(), "JUNIOR".into()]);
        assert_eq!(err.message, "'role' must be one of ADMIN, JUNIOR");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ApiError = json_err.into();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError {
                kind: ValidationKind::InvalidPayload,
                ..
            })
        ));
    }
}
