//! Identity provider abstraction and claims propagation
//!
//! Authentication is delegated to an external provider. The provider is
//! injected as a trait object at construction; nothing here reaches for a
//! process-wide client.

use crate::core::events::{ClaimsEvent, EventBus, ServiceEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Identity asserted by a verified bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Custom claims stored on the provider side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub role: String,
    pub internal_id: String,
}

/// Errors raised by an identity provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credential: {0}")]
    InvalidToken(String),

    #[error("unknown subject '{0}'")]
    UnknownSubject(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer credential and return the identity it asserts
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Replace the custom claims of a subject
    async fn set_claims(&self, subject_id: &str, claims: &Claims) -> Result<(), IdentityError>;

    /// Remove a subject from the provider
    async fn delete_subject(&self, subject_id: &str) -> Result<(), IdentityError>;
}

/// Pushes claims to the identity provider in the background
///
/// The request that triggered the update never waits for the provider. The
/// outcome is logged and published on the event bus.
#[derive(Clone)]
pub struct ClaimsPropagator {
    provider: Arc<dyn IdentityProvider>,
    event_bus: EventBus,
}

impl ClaimsPropagator {
    pub fn new(provider: Arc<dyn IdentityProvider>, event_bus: EventBus) -> Self {
        Self {
            provider,
            event_bus,
        }
    }

    /// Spawn the provider call as a detached task
    ///
    /// The handle is returned for callers (tests, shutdown hooks) that want
    /// to observe completion; dropping it does not cancel the task.
    pub fn dispatch(&self, subject_id: String, claims: Claims) -> JoinHandle<()> {
        let provider = self.provider.clone();
        let event_bus = self.event_bus.clone();

        tokio::spawn(async move {
            let event = match provider.set_claims(&subject_id, &claims).await {
                Ok(()) => {
                    tracing::info!(
                        subject_id = %subject_id,
                        role = %claims.role,
                        internal_id = %claims.internal_id,
                        "claims propagated"
                    );
                    ClaimsEvent::Propagated {
                        subject_id,
                        role: claims.role,
                        internal_id: claims.internal_id,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        subject_id = %subject_id,
                        role = %claims.role,
                        internal_id = %claims.internal_id,
                        error = %e,
                        "claims propagation failed"
                    );
                    ClaimsEvent::Failed {
                        subject_id,
                        role: claims.role,
                        internal_id: claims.internal_id,
                        error: e.to_string(),
                    }
                }
            };
            event_bus.publish(ServiceEvent::Claims(event));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(String, Claims)>>,
        fail: bool,
    }

    #[async_trait]
    impl IdentityProvider for RecordingProvider {
        async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
            Err(IdentityError::InvalidToken(token.to_string()))
        }

        async fn set_claims(&self, subject_id: &str, claims: &Claims) -> Result<(), IdentityError> {
            self.calls
                .lock()
                .unwrap()
                .push((subject_id.to_string(), claims.clone()));
            if self.fail {
                Err(IdentityError::Unavailable("offline".to_string()))
            } else {
                Ok(())
            }
        }

        async fn delete_subject(&self, _subject_id: &str) -> Result<(), IdentityError> {
            Ok(())
        }
    }

    fn claims() -> Claims {
        Claims {
            role: "ADMIN".to_string(),
            internal_id: "u-1".to_string(),
        }
    }

    #[test]
    fn test_claims_serialize_camel_case() {
        let json = serde_json::to_value(claims()).unwrap();
        assert_eq!(json, serde_json::json!({"role": "ADMIN", "internalId": "u-1"}));
    }

    #[tokio::test]
    async fn test_dispatch_success_publishes_propagated() {
        let provider = Arc::new(RecordingProvider::default());
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let propagator = ClaimsPropagator::new(provider.clone(), bus);

        propagator
            .dispatch("sub-1".to_string(), claims())
            .await
            .unwrap();

        assert_eq!(
            provider.calls.lock().unwrap().as_slice(),
            &[("sub-1".to_string(), claims())]
        );
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.action(), "propagated");
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_published_not_raised() {
        let provider = Arc::new(RecordingProvider {
            fail: true,
            ..Default::default()
        });
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let propagator = ClaimsPropagator::new(provider.clone(), bus);

        propagator
            .dispatch("sub-1".to_string(), claims())
            .await
            .unwrap();

        assert_eq!(provider.calls.lock().unwrap().len(), 1);
        match rx.recv().await.unwrap().event {
            ServiceEvent::Claims(ClaimsEvent::Failed { error, .. }) => {
                assert!(error.contains("offline"))
            }
            other => panic!("Expected claims failure, got {:?}", other),
        }
    }
}
