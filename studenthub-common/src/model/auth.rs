use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::UtcDateTime;

pub const PASSWORD_SALT_LEN: usize = 16;
pub const TOKEN_ID_LEN: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordError(password_hash::Error);

/// PHC-formatted argon2 hash of a user password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn hash(password: &str) -> Result<Self, PasswordError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordError)?;

        let digest = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordError)?;

        Ok(Self(digest.to_string()))
    }

    #[must_use]
    pub fn from_stored(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        let Ok(parsed) = argon2::PasswordHash::new(&self.0) else {
            return false;
        };

        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for PasswordDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordDigest").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Credentials {
    pub user: Id<UserMarker>,
    pub password: PasswordDigest,
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Debug for LoginRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id<UserMarker>,
    pub jti: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Seconds until the token expires, zero if it already has.
    #[must_use]
    pub fn remaining_seconds(&self, now: UtcDateTime) -> u64 {
        u64::try_from(self.exp - now.unix_timestamp()).unwrap_or(0)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Token is invalid: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("Token could not be signed: {0}")]
    Encode(jsonwebtoken::errors::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// HS256 signing and verification keys.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue_at(
        &self,
        user: Id<UserMarker>,
        kind: TokenKind,
        lifetime: PositiveDuration,
        now: UtcDateTime,
    ) -> Result<(String, Claims), TokenError> {
        let token_id: [u8; TOKEN_ID_LEN] = rand::random();
        let issued_at = now.unix_timestamp();

        let claims = Claims {
            sub: user,
            jti: BASE64_URL_SAFE_NO_PAD.encode(token_id),
            kind,
            iat: issued_at,
            exp: issued_at + lifetime.whole_seconds(),
        };

        let token =
            encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Encode)?;
        Ok((token, claims))
    }

    pub fn issue(
        &self,
        user: Id<UserMarker>,
        kind: TokenKind,
        lifetime: PositiveDuration,
    ) -> Result<(String, Claims), TokenError> {
        self.issue_at(user, kind, lifetime, UtcDateTime::now())
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err),
            })
    }
}

impl Debug for JwtKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}
