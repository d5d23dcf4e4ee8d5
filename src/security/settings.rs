use std::fmt;

/// Issuer identity stamped into every token unless overridden.
pub const DEFAULT_ISSUER: &str = "attendance-app";
/// Default token lifetime in seconds (five minutes).
pub const DEFAULT_LIFETIME_SECS: i64 = 300;
/// Default clock skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: i64 = 1;
/// Longest lifetime a deployment may configure (one day).
pub const MAX_LIFETIME_SECS: i64 = 86_400;
/// Largest clock skew tolerance a deployment may configure.
pub const MAX_LEEWAY_SECS: i64 = 3_600;

/// Shared HMAC secret. Loaded once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED; {} bytes])", self.0.len())
    }
}

/// Token parameters shared by the issuer and the verifier.
///
/// Both sides of the protocol must agree on `key` and `issuer`; lifetime only
/// matters to the issuer and leeway only to the verifier.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub key: SigningKey,
    pub issuer: String,
    pub lifetime_secs: i64,
    pub leeway_secs: i64,
}

impl TokenSettings {
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            issuer: DEFAULT_ISSUER.to_string(),
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            leeway_secs: DEFAULT_LEEWAY_SECS,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_lifetime(mut self, secs: i64) -> Self {
        self.lifetime_secs = secs;
        self
    }

    pub fn with_leeway(mut self, secs: i64) -> Self {
        self.leeway_secs = secs;
        self
    }
}
