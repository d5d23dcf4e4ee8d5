use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::security::settings::{
    SigningKey, TokenSettings, DEFAULT_ISSUER, DEFAULT_LEEWAY_SECS, DEFAULT_LIFETIME_SECS,
    MAX_LEEWAY_SECS, MAX_LIFETIME_SECS,
};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_FRONTEND_ORIGINS: &str =
    "https://attendencefrontend.vercel.app,http://localhost:3000";
pub const DEFAULT_ORIGIN_PATTERNS: &str = r"^https://.*\.vercel\.app$";

/// Secrets below this length are accepted but logged as weak.
pub const MIN_SECRET_LEN: usize = 32;
/// `gen-secret` refuses to print anything shorter than this.
pub const MIN_GENERATED_SECRET_LEN: usize = 16;

const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "changeme", "secret"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("QR_JWT_SECRET is not set")]
    MissingSecret,

    #[error("QR_JWT_SECRET is a placeholder value; generate one with `qr-attend gen-secret`")]
    PlaceholderSecret,

    #[error("{var} must be an integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} is out of range: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },

    #[error("invalid origin pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Origins allowed to call the `/qr` routes from a browser.
#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub origins: Vec<String>,
    pub patterns: Vec<Regex>,
}

impl CorsSettings {
    pub fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin) || self.patterns.iter().any(|p| p.is_match(origin))
    }
}

/// Process configuration, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: TokenSettings,
    pub cors: CorsSettings,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("QR_JWT_SECRET").ok_or(ConfigError::MissingSecret)?;
        let key = parse_secret(&secret)?;

        let issuer = lookup("QR_JWT_ISSUER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        let lifetime = parse_int(&lookup, "QR_TOKEN_LIFETIME_SECONDS", DEFAULT_LIFETIME_SECS)?;
        if lifetime <= 0 {
            return Err(ConfigError::OutOfRange {
                var: "QR_TOKEN_LIFETIME_SECONDS",
                reason: "must be positive",
            });
        }
        if lifetime > MAX_LIFETIME_SECS {
            return Err(ConfigError::OutOfRange {
                var: "QR_TOKEN_LIFETIME_SECONDS",
                reason: "must not exceed 86400",
            });
        }

        let leeway = parse_int(&lookup, "QR_TOKEN_LEEWAY_SECONDS", DEFAULT_LEEWAY_SECS)?;
        if leeway < 0 {
            return Err(ConfigError::OutOfRange {
                var: "QR_TOKEN_LEEWAY_SECONDS",
                reason: "must not be negative",
            });
        }
        if leeway > MAX_LEEWAY_SECS {
            return Err(ConfigError::OutOfRange {
                var: "QR_TOKEN_LEEWAY_SECONDS",
                reason: "must not exceed 3600",
            });
        }

        let port = parse_int(&lookup, "PORT", i64::from(DEFAULT_PORT))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::OutOfRange {
            var: "PORT",
            reason: "must fit in 0..=65535",
        })?;

        let origins = split_list(
            &lookup("FRONTEND_ORIGINS").unwrap_or_else(|| DEFAULT_FRONTEND_ORIGINS.to_string()),
        );
        let patterns = split_list(
            &lookup("FRONTEND_ORIGIN_PATTERNS")
                .unwrap_or_else(|| DEFAULT_ORIGIN_PATTERNS.to_string()),
        )
        .into_iter()
        .map(|pattern| {
            Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern { pattern, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            token: TokenSettings::new(key)
                .with_issuer(issuer)
                .with_lifetime(lifetime)
                .with_leeway(leeway),
            cors: CorsSettings { origins, patterns },
            port,
        })
    }
}

fn parse_secret(raw: &str) -> Result<SigningKey, ConfigError> {
    let secret = raw.trim();
    if secret.is_empty() {
        return Err(ConfigError::MissingSecret);
    }
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|p| secret.eq_ignore_ascii_case(p))
    {
        return Err(ConfigError::PlaceholderSecret);
    }
    if secret.len() < MIN_SECRET_LEN {
        warn!(
            len = secret.len(),
            min = MIN_SECRET_LEN,
            "QR_JWT_SECRET is shorter than recommended"
        );
    }
    Ok(SigningKey::new(secret.as_bytes()))
}

fn parse_int<F>(lookup: &F, var: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
