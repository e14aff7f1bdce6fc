//! Credential classification and the authenticated principal model.
//!
//! Two bearer credential kinds exist: interactive session credentials issued
//! by the external identity provider, and API tokens minted by this service.
//! Either resolves to a flat [`Principal`]; authorization does not
//! distinguish between them.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::token::SECRET_PREFIX;

/// The authenticated identity attributed to a request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub uid: String,
    pub kind: CredentialKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    Session,
    ApiToken { token_id: Uuid },
}

/// A bearer credential, split by kind before verification.
#[derive(Debug, PartialEq, Eq)]
pub enum Credential<'a> {
    Session(&'a str),
    ApiToken(&'a str),
}

impl<'a> Credential<'a> {
    /// Classify a raw bearer string. API tokens carry the `fg_` prefix;
    /// everything else is treated as a session credential.
    pub fn classify(raw: &'a str) -> Credential<'a> {
        if raw.starts_with(SECRET_PREFIX) {
            Credential::ApiToken(raw)
        } else {
            Credential::Session(raw)
        }
    }
}

/// Opaque check of an interactive session credential. The identity provider
/// is a black box: a credential either resolves to a principal uid or it
/// does not.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, raw: &str) -> Option<String>;
}

#[derive(Deserialize)]
struct SessionClaims {
    sub: String,
}

/// Validates session credentials as RS256 JWTs against the identity
/// provider's published public key. With no key configured, every session
/// credential is invalid.
pub struct JwtSessionVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtSessionVerifier {
    pub fn new(public_key_pem: Option<&str>) -> anyhow::Result<Self> {
        let key = match public_key_pem {
            Some(pem) => Some(DecodingKey::from_rsa_pem(pem.as_bytes())?),
            None => None,
        };
        Ok(Self {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, raw: &str) -> Option<String> {
        let key = self.key.as_ref()?;
        match jsonwebtoken::decode::<SessionClaims>(raw, key, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(e) => {
                tracing::debug!("session credential rejected: {}", e);
                None
            }
        }
    }
}

/// Extract the bearer credential from an `Authorization` header value.
pub fn bearer(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
