use crate::constants::audit::TARGET;
use crate::transport::AuthToken;
use sha2::{Digest, Sha256};

/// Event classes of the security audit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Auth,
    TrustBoundary,
    InstructionValidation,
    TokenRedaction,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::TrustBoundary => "trust-boundary",
            Self::InstructionValidation => "instruction-validation",
            Self::TokenRedaction => "token-redaction",
        }
    }
}

/// One structured audit record. Attributes must never carry token bytes or
/// instruction content; hashes and lengths only.
pub struct AuditRecord<'a> {
    pub event: AuditEvent,
    pub action: &'a str,
    pub message: &'a str,
    pub attributes: &'a [(&'a str, String)],
}

impl AuditRecord<'_> {
    fn attributes_line(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn info(&self) {
        tracing::info!(
            target: TARGET,
            event = self.event.as_str(),
            action = self.action,
            attributes = %self.attributes_line(),
            "{}",
            self.message
        );
    }

    pub fn warn(&self) {
        tracing::warn!(
            target: TARGET,
            event = self.event.as_str(),
            action = self.action,
            attributes = %self.attributes_line(),
            "{}",
            self.message
        );
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The only representation of a token that may appear in audit records.
pub fn token_hash(token: &AuthToken) -> String {
    sha256_hex(token.expose().as_bytes())
}

/// Strip any literal token occurrence from outbound content. Model output
/// and report bodies must never carry the token even if it was echoed back.
pub fn redact_token(text: &str, token: &AuthToken) -> String {
    if token.is_empty() || !text.contains(token.expose()) {
        return text.to_string();
    }
    let occurrences = text.matches(token.expose()).count();
    let redacted = text.replace(token.expose(), "[redacted]");
    AuditRecord {
        event: AuditEvent::TokenRedaction,
        action: "redact",
        message: "token bytes removed from outbound content",
        attributes: &[
            ("sha256", token_hash(token)),
            ("occurrences", occurrences.to_string()),
        ],
    }
    .warn();
    redacted
}
