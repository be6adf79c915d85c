//! Anti-CSRF action tokens.
//!
//! A token is derived from the action scope, a 12-hour time factor and a
//! per-site secret. Tokens from the current and the previous time factor are
//! accepted, so a token lives between 12 and 24 hours.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::CoreError;
use super::store::Store;

/// Seconds per time factor step
pub const TOKEN_WINDOW_SECS: i64 = 86_400 / 2;

const SECRET_SETTING: &str = "token_secret";

/// Scope used by content upgrade progress calls
pub const CONTENT_UPGRADE_SCOPE: &str = "contentupgrade";

/// Scope used when toggling restriction of one library
pub fn library_scope(library_id: impl std::fmt::Display) -> String {
    format!("library_{}", library_id)
}

/// Creates and validates action tokens
#[derive(Debug, Clone)]
pub struct TokenService {
    secret: String,
}

impl TokenService {
    /// Build a service with an explicit secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Load the site secret from the store, generating it on first use
    pub fn from_store(store: &Store) -> Result<Self, CoreError> {
        if let Some(secret) = store.setting(SECRET_SETTING)? {
            return Ok(Self::new(secret));
        }

        let secret = Uuid::new_v4().simple().to_string();
        store.set_setting(SECRET_SETTING, &secret)?;
        Ok(Self::new(secret))
    }

    /// Create a token for `scope` valid from now
    pub fn create_token(&self, scope: &str) -> String {
        self.create_token_at(scope, Utc::now())
    }

    /// Check a token for `scope` against the current time
    pub fn valid_token(&self, scope: &str, token: &str) -> bool {
        self.valid_token_at(scope, token, Utc::now())
    }

    pub fn create_token_at(&self, scope: &str, now: DateTime<Utc>) -> String {
        self.hash_token(scope, time_factor(now))
    }

    pub fn valid_token_at(&self, scope: &str, token: &str, now: DateTime<Utc>) -> bool {
        let factor = time_factor(now);
        token == self.hash_token(scope, factor) || token == self.hash_token(scope, factor - 1)
    }

    /// Validate or fail with an auth error
    pub fn require(&self, scope: &str, token: &str) -> Result<(), CoreError> {
        if self.valid_token(scope, token) {
            Ok(())
        } else {
            Err(CoreError::Auth {
                scope: scope.to_string(),
            })
        }
    }

    fn hash_token(&self, scope: &str, factor: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(scope.as_bytes());
        hasher.update(factor.to_string().as_bytes());
        hasher.update(self.secret.as_bytes());
        let digest = hex::encode(hasher.finalize());

        // 13 chars taken from the last 16
        let start = digest.len() - 16;
        digest[start..start + 13].to_string()
    }
}

/// `ceil(unix_seconds / 43200)`
fn time_factor(now: DateTime<Utc>) -> i64 {
    let secs = now.timestamp();
    (secs + TOKEN_WINDOW_SECS - 1).div_euclid(TOKEN_WINDOW_SECS)
}
