//! In-process collaborator implementations.
//!
//! Real deployments delegate authentication and rate limiting to the
//! platform; these implementations back local runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use skillforge_core::error::EngineError;
use skillforge_core::traits::{Authenticator, Claims, Principal, RateLimiter, Role};

/// Token-table authenticator.
#[derive(Default)]
pub struct StaticAuthenticator {
    /// token -> uid
    tokens: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: &str, uid: &str) -> Self {
        self.tokens.insert(token.to_string(), uid.to_string());
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn assert_authenticated(&self, principal: &Principal) -> Result<String, EngineError> {
        self.tokens
            .get(&principal.token)
            .cloned()
            .ok_or_else(|| EngineError::Auth("unrecognized token".into()))
    }

    fn assert_role(&self, uid: &str, claims: &Claims, required: Role) -> Result<(), EngineError> {
        if claims.roles.contains(&required) {
            Ok(())
        } else {
            Err(EngineError::Permission(format!(
                "user {uid} lacks role {required:?}"
            )))
        }
    }
}

/// Fixed-window in-memory rate limiter.
pub struct FixedWindowRateLimiter {
    /// (uid, action) -> (window bucket, count)
    windows: Mutex<HashMap<(String, String), (u64, u32)>>,
}

impl FixedWindowRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn enforce(
        &self,
        uid: &str,
        action_key: &str,
        max: u32,
        window_secs: u64,
    ) -> Result<(), EngineError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let bucket = now / window_secs.max(1);

        let mut windows = self.windows.lock().unwrap();
        let entry = windows
            .entry((uid.to_string(), action_key.to_string()))
            .or_insert((bucket, 0));
        if entry.0 != bucket {
            *entry = (bucket, 0);
        }
        entry.1 += 1;
        if entry.1 > max {
            return Err(EngineError::ResourceExhausted {
                action: action_key.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticator_resolves_known_tokens() {
        let auth = StaticAuthenticator::new().with_user("tok-1", "amara");
        let uid = auth
            .assert_authenticated(&Principal {
                token: "tok-1".into(),
            })
            .unwrap();
        assert_eq!(uid, "amara");

        let err = auth
            .assert_authenticated(&Principal {
                token: "tok-9".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), "auth_error");
    }

    #[test]
    fn role_assertion_checks_claims() {
        let auth = StaticAuthenticator::new();
        let claims = Claims {
            roles: vec![Role::Student],
        };
        auth.assert_role("amara", &claims, Role::Student).unwrap();
        let err = auth
            .assert_role("amara", &claims, Role::Instructor)
            .unwrap_err();
        assert_eq!(err.code(), "permission_error");
    }

    #[tokio::test]
    async fn rate_limiter_exhausts_within_window() {
        let limiter = FixedWindowRateLimiter::new();
        limiter.enforce("u1", "grade_answer", 2, 3600).await.unwrap();
        limiter.enforce("u1", "grade_answer", 2, 3600).await.unwrap();
        let err = limiter
            .enforce("u1", "grade_answer", 2, 3600)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resource_exhausted");

        // Another user is unaffected.
        limiter.enforce("u2", "grade_answer", 2, 3600).await.unwrap();
    }
}
