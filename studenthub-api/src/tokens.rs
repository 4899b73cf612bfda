use moka::{Expiry, future::Cache};
use std::{
    fmt::{Debug, Formatter},
    time::{Duration, Instant},
};
use studenthub_common::{
    model::{
        Id,
        auth::{Claims, JwtKeys, TokenError, TokenKind, TokenPair},
        user::UserMarker,
    },
    util::PositiveDuration,
};
use thiserror::Error;
use time::UtcDateTime;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Token has been revoked")]
    Revoked,
    #[error("Expected {expected:?} token, got {actual:?} token")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
}

/// Keeps a revoked token id around exactly as long as the token would have been valid.
struct UntilTokenExpiry;

impl Expiry<String, Duration> for UntilTokenExpiry {
    fn expire_after_create(
        &self,
        _token_id: &String,
        remaining: &Duration,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(*remaining)
    }
}

/// Issues and checks the JWTs of the API.
pub struct TokenService {
    keys: JwtKeys,
    access_ttl: PositiveDuration,
    refresh_ttl: PositiveDuration,
    revoked: Cache<String, Duration>,
}

impl TokenService {
    #[must_use]
    pub fn new(keys: JwtKeys, access_ttl: PositiveDuration, refresh_ttl: PositiveDuration) -> Self {
        // No size bound, entries only leave once their token has expired.
        let revoked = Cache::builder().expire_after(UntilTokenExpiry).build();

        Self {
            keys,
            access_ttl,
            refresh_ttl,
            revoked,
        }
    }

    pub fn issue_pair(&self, user: Id<UserMarker>) -> Result<TokenPair, TokenError> {
        let (access_token, _) = self.keys.issue(user, TokenKind::Access, self.access_ttl)?;
        let (refresh_token, _) = self.keys.issue(user, TokenKind::Refresh, self.refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    pub fn issue_access(&self, user: Id<UserMarker>) -> Result<String, TokenError> {
        let (access_token, _) = self.keys.issue(user, TokenKind::Access, self.access_ttl)?;
        Ok(access_token)
    }

    pub fn authenticate(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.keys.decode(token)?;

        if claims.kind != expected {
            return Err(AuthError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        if self.revoked.contains_key(&claims.jti) {
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }

    /// Rejects the token behind `claims` for the rest of its lifetime.
    pub async fn revoke(&self, claims: &Claims) {
        let remaining = claims.remaining_seconds(UtcDateTime::now());
        if remaining == 0 {
            return;
        }

        self.revoked
            .insert(claims.jti.clone(), Duration::from_secs(remaining))
            .await;
        debug!(user_id = %claims.sub, kind = ?claims.kind, "Revoked token");
    }
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("revoked", &self.revoked.entry_count())
            .finish_non_exhaustive()
    }
}
