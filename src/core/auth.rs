//! Caller authentication
//!
//! [`authenticate`] runs in front of every gated route: it verifies the
//! bearer credential with the identity provider, resolves the caller's user
//! record by subject id and attaches a [`Principal`] to the request
//! extensions. Handlers take the principal with the [`Principal`] extractor.

use crate::core::error::ApiError;
use crate::core::identity::IdentityProvider;
use crate::core::query::{Filter, Projection};
use crate::core::store::{DocumentStore, FindOptions, ID_FIELD};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Field linking a user record to its identity-provider subject
pub const SUBJECT_FIELD: &str = "subjectId";

/// Application role
///
/// `JUN` and `CUN` are accepted when reading stored records and claims
/// written by older deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    #[serde(alias = "JUN")]
    Junior,
    #[serde(alias = "CUN")]
    Curator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Junior, Role::Curator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Junior => "JUNIOR",
            Role::Curator => "CURATOR",
        }
    }

    /// Canonical role names, in declaration order
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Role::as_str).collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "JUNIOR" | "JUN" => Ok(Role::Junior),
            "CURATOR" | "CUN" => Ok(Role::Curator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// The authenticated caller
///
/// `internal_id` and `role` are `None` when the subject has no user record
/// yet (for instance right before `POST /users/create`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub subject_id: String,
    pub role: Option<Role>,
    pub internal_id: Option<String>,
    pub email: Option<String>,
}

/// State needed by [`authenticate`]
#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn DocumentStore>,
    /// Collection holding user records
    pub users: String,
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::authentication("Missing authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| ApiError::authentication("Malformed authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::authentication("Expected a bearer credential")),
    }
}

/// Authentication middleware
///
/// ```rust,ignore
/// let gated = Router::new()
///     .route("/users/getAuthUser", get(get_auth_user))
///     .route_layer(middleware::from_fn_with_state(auth_state, authenticate));
/// ```
pub async fn authenticate(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let token = bearer_token(&parts)?;

    let identity = state.identity.verify_token(token).await.map_err(|e| {
        tracing::warn!(error = %e, "rejected bearer credential");
        ApiError::authentication("Invalid credential")
    })?;

    let options = FindOptions::default().with_projection(Projection::include(&[
        ID_FIELD,
        "role",
        "email",
    ]));
    let record = state
        .store
        .find_one(
            &state.users,
            &Filter::eq(SUBJECT_FIELD, identity.subject_id.as_str()),
            &options,
        )
        .await
        .map_err(|e| ApiError::persistence("Failed to resolve authenticated user", e))?;

    let principal = match record {
        Some(record) => Principal {
            role: record
                .get("role")
                .and_then(|r| r.as_str())
                .and_then(|r| r.parse().ok()),
            internal_id: record
                .get(ID_FIELD)
                .and_then(|id| id.as_str())
                .map(str::to_string),
            email: identity.email.or_else(|| {
                record
                    .get("email")
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
            }),
            subject_id: identity.subject_id,
        },
        None => Principal {
            subject_id: identity.subject_id,
            role: None,
            internal_id: None,
            email: identity.email,
        },
    };

    tracing::debug!(subject_id = %principal.subject_id, "authenticated request");
    parts.extensions.insert(principal);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::authentication("Request is not authenticated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder().uri("/users/getAuthUser");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_role_parse_accepts_legacy_names() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("JUN".parse::<Role>(), Ok(Role::Junior));
        assert_eq!("CUN".parse::<Role>(), Ok(Role::Curator));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_value(Role::Curator).unwrap(), "CURATOR");
        let role: Role = serde_json::from_value(serde_json::json!("JUN")).unwrap();
        assert_eq!(role, Role::Junior);
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(
            bearer_token(&parts_with(Some("Bearer abc123"))).ok(),
            Some("abc123")
        );
        assert_eq!(
            bearer_token(&parts_with(Some("bearer abc123"))).ok(),
            Some("abc123")
        );
    }

    #[test]
    fn test_bearer_token_rejections() {
        for header in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("abc123")] {
            assert!(matches!(
                bearer_token(&parts_with(header)),
                Err(ApiError::Authentication(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_principal_extractor_requires_middleware() {
        let mut parts = parts_with(None);
        let result = Principal::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Authentication(_))));

        parts.extensions.insert(Principal {
            subject_id: "sub-1".to_string(),
            role: Some(Role::Admin),
            internal_id: Some("u-1".to_string()),
            email: None,
        });
        let principal = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal.subject_id, "sub-1");
    }
}
