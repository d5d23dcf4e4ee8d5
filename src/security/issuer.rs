use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::security::claims::{Claims, CHECKIN_SCOPE};
use crate::security::settings::TokenSettings;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    #[error("expiry overflows: issued at {issued_at} with lifetime {lifetime_secs}s")]
    ExpiryOverflow { issued_at: i64, lifetime_secs: i64 },
}

/// A freshly minted token, ready to be rendered into a QR code.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
    #[serde(skip)]
    pub claims: Claims,
}

/// Mints HS256 tokens. Holds only immutable state and is safe to share.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    header: Header,
    issuer: String,
    lifetime_secs: i64,
}

impl TokenIssuer {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            key: EncodingKey::from_secret(settings.key.as_bytes()),
            header: Header::new(Algorithm::HS256),
            issuer: settings.issuer.clone(),
            lifetime_secs: settings.lifetime_secs,
        }
    }

    pub fn issue(&self) -> Result<IssuedToken, TokenError> {
        self.issue_at(Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, now: i64) -> Result<IssuedToken, TokenError> {
        let exp = now
            .checked_add(self.lifetime_secs)
            .ok_or(TokenError::ExpiryOverflow {
                issued_at: now,
                lifetime_secs: self.lifetime_secs,
            })?;
        let claims = Claims {
            iss: self.issuer.clone(),
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
            scope: CHECKIN_SCOPE.to_string(),
        };
        let token = encode(&self.header, &claims, &self.key)?;

        Ok(IssuedToken {
            token,
            expires_in: self.lifetime_secs,
            claims,
        })
    }
}
