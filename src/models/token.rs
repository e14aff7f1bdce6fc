use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Marks a bearer credential as an API token rather than a session credential.
pub const SECRET_PREFIX: &str = "fg_";

const SECRET_BYTES: usize = 32;

/// API token metadata as exposed over the API. The verifier hash never
/// appears here; the plaintext secret exists only in `IssuedToken`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToken {
    pub id: Uuid,
    pub name: String,
    pub created_by_uid: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Creation result: metadata plus the one-time plaintext secret.
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    #[serde(flatten)]
    pub meta: ApiToken,
    /// Plaintext secret. Returned exactly once; only its hash is persisted.
    pub token: String,
}

/// Generate a fresh secret and its verifier hash.
pub fn generate_secret() -> (String, String) {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let plaintext = format!(
        "{}{}",
        SECRET_PREFIX,
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    );
    let hash = hash_secret(&plaintext);
    (plaintext, hash)
}

/// SHA-256 hex of the presented secret, prefix included.
pub fn hash_secret(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of a candidate hash against the stored verifier.
pub fn verifier_matches(candidate_hash: &str, stored_hash: &str) -> bool {
    candidate_hash
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}
