use crate::safety::audit::{AuditEvent, AuditRecord};
use once_cell::sync::Lazy;
use regex::RegexBuilder;
use unicode_normalization::UnicodeNormalization;

/// Rule classes of the suspicious-pattern denylist. Rejection reasons name
/// the class, never the matched literal, so callers cannot probe for the
/// exact pattern boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleClass {
    OverrideInjection,
    ExfiltrationRequest,
    DelimiterInjection,
    InjectionSentinel,
}

impl RuleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OverrideInjection => "override-injection",
            Self::ExfiltrationRequest => "exfiltration-request",
            Self::DelimiterInjection => "delimiter-injection",
            Self::InjectionSentinel => "injection-sentinel",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "override-injection" => Some(Self::OverrideInjection),
            "exfiltration-request" => Some(Self::ExfiltrationRequest),
            "delimiter-injection" => Some(Self::DelimiterInjection),
            "injection-sentinel" => Some(Self::InjectionSentinel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub safe: bool,
    pub reason: Option<RuleClass>,
}

impl Validation {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(rule: RuleClass) -> Self {
        Self {
            safe: false,
            reason: Some(rule),
        }
    }
}

static DENYLIST: Lazy<Vec<(RuleClass, regex::Regex)>> = Lazy::new(|| {
    parse_denylist(include_str!("denylist.txt"))
});

fn parse_denylist(resource: &str) -> Vec<(RuleClass, regex::Regex)> {
    let mut rules = Vec::new();
    for line in resource.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((class, pattern)) = line.split_once(':') else {
            continue;
        };
        let Some(class) = RuleClass::parse(class.trim()) else {
            continue;
        };
        match RegexBuilder::new(pattern.trim()).case_insensitive(true).build() {
            Ok(re) => rules.push((class, re)),
            Err(e) => tracing::warn!("skipping malformed denylist rule ({class:?}): {e}"),
        }
    }
    rules
}

/// Scan one custom instruction for prompt-injection patterns.
///
/// Input is NFKC-normalized first so homoglyph-equivalent forms match the
/// same rules. Target-discovered instructions only reach this point when the
/// trust flag is set; explicit-path instructions always do. Every rejection
/// emits an audit record carrying the source path, rule class, trust flag,
/// and byte length, never the content.
pub fn validate(content: &str, source_path: &str, trusted: bool) -> Validation {
    let normalized: String = content.nfkc().collect();

    for (class, pattern) in DENYLIST.iter() {
        if pattern.is_match(&normalized) {
            AuditRecord {
                event: AuditEvent::InstructionValidation,
                action: "reject",
                message: "unsafe custom instruction rejected",
                attributes: &[
                    ("source", source_path.to_string()),
                    ("rule_class", class.as_str().to_string()),
                    ("trusted", trusted.to_string()),
                    ("bytes", content.len().to_string()),
                ],
            }
            .warn();
            return Validation::unsafe_because(*class);
        }
    }

    Validation::safe()
}
