//! Session model - one refresh token per (user, device).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub user_id: Uuid,
    pub device_id: String,
    pub refresh_token_hash: String,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        device_id: impl Into<String>,
        refresh_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            device_id: device_id.into(),
            refresh_token_hash: Self::hash_token(refresh_token),
            expires_utc,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_utc <= Utc::now()
    }

    /// Constant-time comparison against a presented refresh token.
    pub fn matches(&self, refresh_token: &str) -> bool {
        let presented = Self::hash_token(refresh_token);
        presented
            .as_bytes()
            .ct_eq(self.refresh_token_hash.as_bytes())
            .into()
    }
}
