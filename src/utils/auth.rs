use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::constants::MIN_JWT_SECRET_LENGTH;
use crate::models::{Actor, Role, User};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} characters")]
    WeakSecret,

    #[error("JWT_SECRET is required in production")]
    MissingSecret,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

/// Claims carried in the bearer token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl From<&Claims> for Actor {
    fn from(claims: &Claims) -> Self {
        Actor {
            user_id: claims.sub.clone(),
            user_name: claims.name.clone(),
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
    pub expires_in: i64,
}

/// HS256 token issuing and verification
#[derive(Clone)]
pub struct AuthService {
    secret: String,
    duration: Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("duration_hours", &self.duration.num_hours())
            .finish()
    }
}

impl AuthService {
    /// Without a configured secret an ephemeral one is generated, except in
    /// production where a secret is mandatory.
    pub fn new(secret: Option<&str>, duration_hours: i64, production: bool) -> Result<Self, AuthError> {
        let secret = match secret {
            Some(secret) if secret.len() >= MIN_JWT_SECRET_LENGTH => secret.to_string(),
            Some(_) => return Err(AuthError::WeakSecret),
            None if production => return Err(AuthError::MissingSecret),
            None => {
                warn!("⚠️ JWT_SECRET not set - using an ephemeral secret, tokens will not survive a restart");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect()
            }
        };

        Ok(Self {
            secret,
            duration: Duration::hours(duration_hours),
        })
    }

    pub fn generate_token(&self, user: &User) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.duration;
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            expires_in: self.duration.num_seconds(),
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "an-adequately-long-test-secret-value-123";

    fn user() -> User {
        User {
            id: "admin".to_string(),
            name: "Admin".to_string(),
            pin: String::new(),
            role: Role::Admin,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let auth = AuthService::new(Some(SECRET), 8, false).unwrap();
        let issued = auth.generate_token(&user()).unwrap();
        assert_eq!(issued.expires_in, 8 * 3600);

        let claims = auth.verify_token(&issued.token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, Role::Admin);
        assert!(Actor::from(&claims).is_admin());
    }

    #[test]
    fn test_foreign_token_rejected() {
        let ours = AuthService::new(Some(SECRET), 8, false).unwrap();
        let theirs = AuthService::new(None, 8, false).unwrap();
        let token = theirs.generate_token(&user()).unwrap().token;
        assert!(matches!(ours.verify_token(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(ours.verify_token("garbage"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token() {
        let auth = AuthService::new(Some(SECRET), -1, false).unwrap();
        let token = auth.generate_token(&user()).unwrap().token;
        assert!(matches!(auth.verify_token(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_secret_rules() {
        assert!(matches!(AuthService::new(Some("short"), 8, false), Err(AuthError::WeakSecret)));
        assert!(matches!(AuthService::new(None, 8, true), Err(AuthError::MissingSecret)));
    }
}
