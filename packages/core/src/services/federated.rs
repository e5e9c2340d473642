//! Federated identity: JWT verification against a refreshed key set.
//!
//! The key refresher worker periodically replaces the key snapshot; sign-in
//! verifies the presented token against every current key and accepts if any
//! verifier accepts. Readers hold a snapshot only for the duration of one
//! verification.

use std::sync::RwLock;

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::Deserialize;

use super::ServiceError;

/// Claims extracted from an accepted identity token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Atomically replaceable set of issuer public keys.
pub struct FederatedKeys {
    keys: RwLock<Vec<DecodingKey>>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl FederatedKeys {
    pub fn new(issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            keys: RwLock::new(Vec::new()),
            issuer,
            audience,
        }
    }

    /// Replace the whole key set with a fresh snapshot.
    pub fn set_keys(&self, keys: Vec<DecodingKey>) {
        *self.keys.write().expect("key set poisoned") = keys;
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().expect("key set poisoned").is_empty()
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }

    /// Verify `token` against all current keys; any accepting key suffices.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, ServiceError> {
        let keys = self.keys.read().expect("key set poisoned");
        if keys.is_empty() {
            return Err(ServiceError::authentication(
                "no federated issuer keys available",
            ));
        }
        let validation = self.validation();
        for key in keys.iter() {
            if let Ok(TokenData { claims, .. }) = decode::<IdentityClaims>(token, key, &validation)
            {
                return Ok(claims);
            }
        }
        Err(ServiceError::authentication("identity token rejected"))
    }
}
