use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::security::claims::RawClaims;
use crate::security::settings::TokenSettings;

/// Why a token was refused. The display strings are what callers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Missing token")]
    MissingToken,
    #[error("QR expired")]
    Expired,
    #[error("Invalid issuer")]
    InvalidIssuer,
    /// Undecodable, badly signed, or missing required claims. Deliberately
    /// not broken down further.
    #[error("Invalid token")]
    Malformed,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingToken => "missing_token",
            Rejection::Expired => "expired",
            Rejection::InvalidIssuer => "invalid_issuer",
            Rejection::Malformed => "malformed",
        }
    }
}

/// Claims exposed to the caller once a token is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    pub scope: Option<String>,
    #[serde(skip)]
    pub token_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted(VerifiedClaims),
    Rejected(Rejection),
}

impl Verification {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verification::Accepted(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Verification::Rejected(r) => Some(*r),
            Verification::Accepted(_) => None,
        }
    }
}

/// Checks HS256 tokens against the shared key and issuer.
///
/// Verification never consumes a token: a valid token is accepted for every
/// call strictly before `exp + leeway`.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    issuer: String,
    leeway_secs: i64,
}

impl TokenVerifier {
    pub fn new(settings: &TokenSettings) -> Self {
        // Only the signature and algorithm are left to the decoder; time and
        // issuer checks run below against an explicit clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(settings.key.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            leeway_secs: settings.leeway_secs,
        }
    }

    pub fn verify(&self, token: Option<&str>) -> Verification {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify `token` as if the current time were `now` (unix seconds).
    pub fn verify_at(&self, token: Option<&str>, now: i64) -> Verification {
        match self.check(token, now) {
            Ok(claims) => Verification::Accepted(claims),
            Err(rejection) => Verification::Rejected(rejection),
        }
    }

    fn check(&self, token: Option<&str>, now: i64) -> Result<VerifiedClaims, Rejection> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(Rejection::MissingToken),
        };

        let data = decode::<RawClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "token failed to decode");
            Rejection::Malformed
        })?;
        let claims = data.claims;

        let (Some(exp), Some(iss), Some(iat)) = (claims.exp, claims.iss, claims.iat) else {
            debug!("token is missing a required claim");
            return Err(Rejection::Malformed);
        };

        if iat.saturating_sub(now) > self.leeway_secs {
            debug!(iat, now, "token issued in the future");
            return Err(Rejection::Malformed);
        }

        // Expired once `now` reaches `exp + leeway`.
        if now.saturating_sub(exp) >= self.leeway_secs {
            return Err(Rejection::Expired);
        }

        if iss != self.issuer {
            return Err(Rejection::InvalidIssuer);
        }

        Ok(VerifiedClaims {
            expires_at: exp,
            issued_at: iat,
            scope: claims.scope,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::claims::Claims;
    use crate::security::issuer::TokenIssuer;
    use crate::security::settings::SigningKey;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const TEST_SECRET: &[u8] = b"test-secret-key-for-signing";

    fn settings() -> TokenSettings {
        TokenSettings::new(SigningKey::new(TEST_SECRET))
    }

    fn sign(payload: &serde_json::Value, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            payload,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_accepted() {
        let issued = TokenIssuer::new(&settings()).issue().unwrap();
        let result = TokenVerifier::new(&settings()).verify(Some(&issued.token));
        match result {
            Verification::Accepted(claims) => {
                assert_eq!(claims.scope.as_deref(), Some("attendance:checkin"));
                assert_eq!(claims.expires_at, issued.claims.exp);
                assert_eq!(claims.issued_at, issued.claims.iat);
                assert_eq!(claims.token_id.as_deref(), Some(issued.claims.jti.as_str()));
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_is_repeatable() {
        let issued = TokenIssuer::new(&settings()).issue_at(1000).unwrap();
        let verifier = TokenVerifier::new(&settings());
        for now in [1000, 1001, 1100, 1300] {
            assert!(verifier.verify_at(Some(&issued.token), now).is_accepted());
        }
    }

    #[test]
    fn test_expiry_boundary_with_leeway() {
        let issued = TokenIssuer::new(&settings()).issue_at(1000).unwrap();
        assert_eq!(issued.claims.exp, 1300);
        let verifier = TokenVerifier::new(&settings());

        assert!(verifier.verify_at(Some(&issued.token), 1300).is_accepted());
        assert_eq!(
            verifier.verify_at(Some(&issued.token), 1301).rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn test_zero_leeway_expires_at_exp() {
        let settings = settings().with_leeway(0);
        let issued = TokenIssuer::new(&settings).issue_at(1000).unwrap();
        let verifier = TokenVerifier::new(&settings);
        assert!(verifier.verify_at(Some(&issued.token), 1299).is_accepted());
        assert_eq!(
            verifier.verify_at(Some(&issued.token), 1300).rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn test_extreme_claim_values_are_classified() {
        let verifier = TokenVerifier::new(&settings());
        let cases = [
            (json!({"iss": "attendance-app", "iat": 1000, "exp": i64::MAX}), None),
            (
                json!({"iss": "attendance-app", "iat": i64::MIN, "exp": 1300}),
                None,
            ),
            (
                json!({"iss": "attendance-app", "iat": 1000, "exp": i64::MIN}),
                Some(Rejection::Expired),
            ),
            (
                json!({"iss": "attendance-app", "iat": 1000, "exp": -5}),
                Some(Rejection::Expired),
            ),
            (
                json!({"iss": "attendance-app", "iat": i64::MAX, "exp": i64::MAX}),
                Some(Rejection::Malformed),
            ),
            (
                json!({"iss": "attendance-app", "iat": i64::MIN, "exp": i64::MIN}),
                Some(Rejection::Expired),
            ),
        ];
        for (payload, expected) in cases {
            let token = sign(&payload, TEST_SECRET);
            for now in [i64::MIN, 0, 1000, i64::MAX] {
                // Must classify, never overflow.
                let _ = verifier.verify_at(Some(&token), now);
            }
            assert_eq!(
                verifier.verify_at(Some(&token), 1000).rejection(),
                expected,
                "payload {}",
                payload
            );
        }
    }

    #[test]
    fn test_missing_token() {
        let verifier = TokenVerifier::new(&settings());
        assert_eq!(verifier.verify(None).rejection(), Some(Rejection::MissingToken));
        assert_eq!(verifier.verify(Some("")).rejection(), Some(Rejection::MissingToken));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let verifier = TokenVerifier::new(&settings());
        for token in ["not-a-token", "a.b.c", "....", "eyJhbGciOiJIUzI1NiJ9"] {
            assert_eq!(
                verifier.verify(Some(token)).rejection(),
                Some(Rejection::Malformed),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_tampered_signature_is_malformed() {
        let issued = TokenIssuer::new(&settings()).issue_at(1000).unwrap();
        let verifier = TokenVerifier::new(&settings());
        let sig_start = issued.token.rfind('.').unwrap() + 1;

        for i in sig_start..issued.token.len() {
            let mut bytes = issued.token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                verifier.verify_at(Some(&tampered), 1000).rejection(),
                Some(Rejection::Malformed),
                "flipped signature char at {}",
                i
            );
        }
    }

    #[test]
    fn test_tampered_payload_is_malformed() {
        let issued = TokenIssuer::new(&settings()).issue_at(1000).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let forged_claims = Claims {
            exp: 99_999_999_999,
            ..issued.claims.clone()
        };
        let forged = sign(&serde_json::to_value(&forged_claims).unwrap(), b"other-key");
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let verifier = TokenVerifier::new(&settings());
        assert_eq!(
            verifier.verify_at(Some(&spliced), 1000).rejection(),
            Some(Rejection::Malformed)
        );
    }

    #[test]
    fn test_wrong_key_is_malformed() {
        let other = TokenSettings::new(SigningKey::new("a-completely-different-secret"));
        let issued = TokenIssuer::new(&other).issue().unwrap();
        let result = TokenVerifier::new(&settings()).verify(Some(&issued.token));
        assert_eq!(result.rejection(), Some(Rejection::Malformed));
    }

    #[test]
    fn test_other_issuer_is_rejected() {
        let foreign = settings().with_issuer("someone-else");
        let issued = TokenIssuer::new(&foreign).issue().unwrap();
        let result = TokenVerifier::new(&settings()).verify(Some(&issued.token));
        assert_eq!(result.rejection(), Some(Rejection::InvalidIssuer));
    }

    #[test]
    fn test_expiry_checked_before_issuer() {
        let foreign = settings().with_issuer("someone-else");
        let issued = TokenIssuer::new(&foreign).issue_at(1000).unwrap();
        let result = TokenVerifier::new(&settings()).verify_at(Some(&issued.token), 5000);
        assert_eq!(result.rejection(), Some(Rejection::Expired));
    }

    #[test]
    fn test_required_claims() {
        let verifier = TokenVerifier::new(&settings());
        let cases = [
            json!({"iss": "attendance-app", "iat": 1000}),
            json!({"iss": "attendance-app", "exp": 1300}),
            json!({"iat": 1000, "exp": 1300}),
        ];
        for payload in cases {
            let token = sign(&payload, TEST_SECRET);
            assert_eq!(
                verifier.verify_at(Some(&token), 1000).rejection(),
                Some(Rejection::Malformed),
                "payload {}",
                payload
            );
        }
    }

    #[test]
    fn test_wrongly_typed_claim_is_malformed() {
        let token = sign(
            &json!({"iss": "attendance-app", "iat": 1000, "exp": "1300"}),
            TEST_SECRET,
        );
        let result = TokenVerifier::new(&settings()).verify_at(Some(&token), 1000);
        assert_eq!(result.rejection(), Some(Rejection::Malformed));
    }

    #[test]
    fn test_float_times_and_numeric_issuer_are_malformed() {
        let verifier = TokenVerifier::new(&settings());
        for payload in [
            json!({"iss": "attendance-app", "iat": 1000, "exp": 1300.5}),
            json!({"iss": "attendance-app", "iat": 1000.0, "exp": 1300}),
            json!({"iss": 42, "iat": 1000, "exp": 1300}),
        ] {
            let token = sign(&payload, TEST_SECRET);
            assert_eq!(
                verifier.verify_at(Some(&token), 1000).rejection(),
                Some(Rejection::Malformed),
                "payload {}",
                payload
            );
        }
    }

    #[test]
    fn test_scope_is_optional() {
        let token = sign(
            &json!({"iss": "attendance-app", "iat": 1000, "exp": 1300}),
            TEST_SECRET,
        );
        match TokenVerifier::new(&settings()).verify_at(Some(&token), 1000) {
            Verification::Accepted(claims) => {
                assert_eq!(claims.scope, None);
                assert_eq!(claims.token_id, None);
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_issued_in_future_beyond_leeway() {
        let issued = TokenIssuer::new(&settings()).issue_at(1000).unwrap();
        let verifier = TokenVerifier::new(&settings());
        assert!(verifier.verify_at(Some(&issued.token), 999).is_accepted());
        assert_eq!(
            verifier.verify_at(Some(&issued.token), 998).rejection(),
            Some(Rejection::Malformed)
        );
    }

    #[test]
    fn test_other_algorithms_are_refused() {
        let payload = json!({"iss": "attendance-app", "iat": 1000, "exp": 1300});
        let token = encode(
            &Header::new(Algorithm::HS512),
            &payload,
            &EncodingKey::from_secret(TEST_SECRET),
        )
        .unwrap();
        let result = TokenVerifier::new(&settings()).verify_at(Some(&token), 1000);
        assert_eq!(result.rejection(), Some(Rejection::Malformed));
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(Rejection::MissingToken.to_string(), "Missing token");
        assert_eq!(Rejection::Expired.to_string(), "QR expired");
        assert_eq!(Rejection::InvalidIssuer.to_string(), "Invalid issuer");
        assert_eq!(Rejection::Malformed.to_string(), "Invalid token");
    }
}
