//! In-memory IdentityProvider for development and testing
//!
//! Tokens are looked up in a static table (usually loaded from the
//! `identity.tokens` section of the configuration). Claim updates are kept
//! so callers can inspect what would have been pushed to a real provider.

use crate::core::identity::{Claims, IdentityError, IdentityProvider, VerifiedIdentity};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct InMemoryIdentityProvider {
    tokens: RwLock<HashMap<String, VerifiedIdentity>>,
    claims: RwLock<HashMap<String, Claims>>,
    calls: RwLock<Vec<(String, Claims)>>,
    fail_claims: AtomicBool,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add_token`](Self::add_token)
    pub fn with_token(self, token: &str, subject_id: &str, email: Option<&str>) -> Self {
        self.add_token(token, subject_id, email);
        self
    }

    /// Accept `token` as a credential for `subject_id`
    pub fn add_token(&self, token: &str, subject_id: &str, email: Option<&str>) {
        let identity = VerifiedIdentity {
            subject_id: subject_id.to_string(),
            email: email.map(str::to_string),
        };
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.to_string(), identity);
        }
    }

    /// Make every subsequent `set_claims` call fail (it is still recorded)
    pub fn fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::SeqCst);
    }

    /// Claims currently held for a subject
    pub fn claims_for(&self, subject_id: &str) -> Option<Claims> {
        self.claims.read().ok()?.get(subject_id).cloned()
    }

    /// Every `set_claims` call received, in order
    pub fn claim_calls(&self) -> Vec<(String, Claims)> {
        self.calls.read().map(|calls| calls.clone()).unwrap_or_default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> IdentityError {
    IdentityError::Unavailable(format!("lock poisoned: {}", e))
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let tokens = self.tokens.read().map_err(poisoned)?;
        tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("token not recognised".to_string()))
    }

    async fn set_claims(&self, subject_id: &str, claims: &Claims) -> Result<(), IdentityError> {
        self.calls
            .write()
            .map_err(poisoned)?
            .push((subject_id.to_string(), claims.clone()));

        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable(
                "claims update rejected".to_string(),
            ));
        }

        self.claims
            .write()
            .map_err(poisoned)?
            .insert(subject_id.to_string(), claims.clone());
        Ok(())
    }

    async fn delete_subject(&self, subject_id: &str) -> Result<(), IdentityError> {
        let mut tokens = self.tokens.write().map_err(poisoned)?;
        let before = tokens.len();
        tokens.retain(|_, identity| identity.subject_id != subject_id);
        if tokens.len() == before {
            return Err(IdentityError::UnknownSubject(subject_id.to_string()));
        }
        drop(tokens);

        self.claims.write().map_err(poisoned)?.remove(subject_id);
        tracing::info!(subject_id, "deleted identity subject");
        Ok(())
    }
}
