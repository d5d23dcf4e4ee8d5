pub mod audit_log;
pub mod claims;
pub mod issuer;
pub mod settings;
pub mod verifier;

pub use claims::{Claims, CHECKIN_SCOPE};
pub use issuer::{IssuedToken, TokenError, TokenIssuer};
pub use settings::{SigningKey, TokenSettings, DEFAULT_ISSUER};
pub use verifier::{Rejection, TokenVerifier, Verification, VerifiedClaims};
