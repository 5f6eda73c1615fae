mod audit;
mod validator;

pub use audit::{redact_token, sha256_hex, token_hash, AuditEvent, AuditRecord};
pub use validator::{validate, RuleClass, Validation};
