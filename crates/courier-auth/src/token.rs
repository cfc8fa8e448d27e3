//! Signed identity tokens.
//!
//! A token is an HS256 JWT whose only domain claim is `login`. Validation
//! yields an [`Assertion`] or fails closed; callers never see raw claims.

use std::time::Duration;

use courier_core::UserId;
use courier_settings::AuthSettings;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AuthError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    login: String,
    iat: i64,
    exp: i64,
}

/// A verified identity: the subject a valid token was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
    subject: UserId,
}

impl Assertion {
    /// Wrap a verified subject.
    pub fn new(subject: UserId) -> Self {
        Self { subject }
    }

    /// The authenticated user.
    pub fn subject(&self) -> &UserId {
        &self.subject
    }
}

/// Validates an opaque token into an [`Assertion`].
pub trait TokenValidator: Send + Sync {
    /// Verify `token`. Any decode, signature, expiry or claim failure is an error.
    fn validate(&self, token: &str) -> Result<Assertion>;
}

/// Issues and validates HS256 tokens with a shared secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer. An empty secret is replaced with 32 random bytes,
    /// so tokens do not survive a restart.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let secret = if secret.is_empty() {
            warn!("no jwt secret configured, using a random per-process secret");
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes.to_vec()
        } else {
            secret.as_bytes().to_vec()
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            validation,
            ttl,
        }
    }

    /// Build an issuer from settings.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(
            &settings.jwt_secret,
            Duration::from_secs(settings.token_ttl_secs),
        )
    }

    /// Issue a token for `login`.
    pub fn issue(&self, login: &str) -> Result<String> {
        let iat = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            login: login.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl TokenValidator for TokenIssuer {
    fn validate(&self, token: &str) -> Result<Assertion> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if data.claims.login.is_empty() {
            return Err(AuthError::InvalidToken("empty login claim".into()));
        }
        Ok(Assertion::new(UserId::new(data.claims.login)))
    }
}
