use tracing::{error, info, warn};

use crate::security::verifier::Rejection;

/// Structured audit trail for the token lifecycle, emitted under the `audit`
/// tracing target.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn token_issued(&self, token_id: &str, expires_at: i64) {
        info!(target: "audit", event = "token_issued", token_id, expires_at);
    }

    pub fn token_accepted(&self, token_id: Option<&str>, expires_at: i64) {
        info!(target: "audit", event = "token_accepted", token_id = token_id.unwrap_or(""), expires_at);
    }

    pub fn token_rejected(&self, client_ip: Option<&str>, rejection: Rejection) {
        warn!(target: "audit", event = "token_rejected", client_ip = client_ip.unwrap_or(""), reason = rejection.as_str());
    }

    pub fn internal_error(&self, error_msg: &str) {
        error!(target: "audit", event = "internal_error", error = error_msg);
    }
}
