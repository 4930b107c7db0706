//! Password hashing and bearer tokens
//!
//! Pure functions only; HTTP middleware lives in the API crate.
//!
//! - Passwords are hashed with Argon2id (PHC string format)
//! - Tokens are HS256 JWTs carrying the user id and role
//! - Access tokens default to 30 minutes, refresh tokens last 7 days

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;
use crate::{Error, Result};

/// Refresh token lifetime
pub const REFRESH_TOKEN_DAYS: i64 = 7;

// ========================================
// Passwords
// ========================================

/// Hash a password with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored hash; malformed hashes never verify
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Random 64-character hex secret for token signing
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ========================================
// Tokens
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Auth("Malformed token subject".to_string()))
    }
}

/// Issues and verifies signed tokens
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    access_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, access_token_minutes: i64) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(Error::Config("Token secret must not be empty".to_string()));
        }
        if access_token_minutes <= 0 {
            return Err(Error::Config(
                "access_token_expire_minutes must be positive".to_string(),
            ));
        }
        Ok(Self {
            secret,
            access_ttl: chrono::Duration::minutes(access_token_minutes),
        })
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issue_access(&self, user_id: Uuid, role: Role) -> Result<String> {
        self.issue(user_id, role, TokenType::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self, user_id: Uuid, role: Role) -> Result<String> {
        self.issue(
            user_id,
            role,
            TokenType::Refresh,
            chrono::Duration::days(REFRESH_TOKEN_DAYS),
        )
    }

    fn issue(
        &self,
        user_id: Uuid,
        role: Role,
        token_type: TokenType,
        ttl: chrono::Duration,
    ) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            token_type,
            iat: now,
            exp: now + ttl.num_seconds(),
        };
        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature, expiry and token type
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            let reason = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid signature",
                ErrorKind::InvalidToken => "Invalid token",
                _ => "Token validation failed",
            };
            Error::Auth(reason.to_string())
        })?;

        if data.claims.token_type != expected {
            return Err(Error::Auth("Wrong token type".to_string()));
        }
        Ok(data.claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
