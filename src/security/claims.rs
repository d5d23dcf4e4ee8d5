use serde::{Deserialize, Serialize};

/// The only action a QR token authorizes.
pub const CHECKIN_SCOPE: &str = "attendance:checkin";

/// Claims minted into every QR token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per issuance, kept for auditing. Never checked for reuse.
    pub jti: String,
    pub scope: String,
}

/// Claims as found in an untrusted token. Presence is checked after the
/// signature, so every field is optional here.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawClaims {
    pub iss: Option<String>,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
    pub jti: Option<String>,
    pub scope: Option<String>,
}
