//! Service tokens.
//!
//! Tokens are HS256-signed JWTs carrying [`Claims`]. The engine mints a
//! short-lived `service` token for every action execution and hands it to
//! the rule body; the HTTP layer validates bearer tokens with the same key.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of tokens minted for rule bodies.
pub const SERVICE_ROLE: &str = "service";
/// Role of operator tokens.
pub const ADMIN_ROLE: &str = "admin";

/// JWT claims embedded in every token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject: `<board>/<action>` for service tokens, an operator id otherwise.
    pub sub: String,
    /// Role name (`"service"`, `"admin"`, ...).
    pub role: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier.
    pub jti: String,
}

impl Claims {
    /// Privileged callers bypass per-card tokens.
    pub fn is_privileged(&self) -> bool {
        self.role == SERVICE_ROLE || self.role == ADMIN_ROLE
    }
}

/// Who is asking to read or run a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Service or admin bearer, or an in-process nested call.
    Privileged,
    /// Anonymous caller with an optional per-card token.
    Token(Option<String>),
}

impl Access {
    /// Whether this caller may pass a card gated by `required`.
    /// A card without a token is ungated.
    pub fn permits(&self, required: Option<&str>) -> bool {
        match (self, required) {
            (_, None) | (Self::Privileged, _) => true,
            (Self::Token(given), Some(required)) => given.as_deref() == Some(required),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSigner {
    secret: String,
    expiry_mins: i64,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>, expiry_mins: i64) -> Self {
        Self {
            secret: secret.into(),
            expiry_mins,
        }
    }

    /// Sign a token for `sub` with `role`.
    pub fn generate(&self, sub: &str, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: now + self.expiry_mins * 60,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Token handed to the body of `board/action`.
    pub fn service_token(&self, board: &str, action: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.generate(&format!("{board}/{action}"), SERVICE_ROLE)
    }

    /// Validate signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_tokens_validate_as_privileged() {
        let signer = TokenSigner::new("s3cret", 15);
        let token = signer.service_token("demo", "counter").unwrap();
        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, "demo/counter");
        assert!(claims.is_privileged());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = TokenSigner::new("a", 15).generate("op", "viewer").unwrap();
        assert!(TokenSigner::new("b", 15).validate(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let signer = TokenSigner::new("s3cret", -10);
        let token = signer.generate("op", ADMIN_ROLE).unwrap();
        assert!(signer.validate(&token).is_err());
    }

    #[test]
    fn access_gating() {
        assert!(Access::Token(None).permits(None));
        assert!(Access::Privileged.permits(Some("x")));
        assert!(Access::Token(Some("x".into())).permits(Some("x")));
        assert!(!Access::Token(Some("y".into())).permits(Some("x")));
        assert!(!Access::Token(None).permits(Some("x")));
    }

    #[test]
    fn plain_roles_are_not_privileged() {
        let signer = TokenSigner::new("s3cret", 15);
        let claims = signer.validate(&signer.generate("op", "viewer").unwrap()).unwrap();
        assert!(!claims.is_privileged());
    }
}
