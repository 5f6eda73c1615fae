use crate::constants::prompt as markers;

/// Labeled regions of a composed system prompt. Untrusted content renders
/// only inside its boundary; nothing user-supplied is ever spliced into the
/// trusted segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Role,
    FocusGuidance,
    OutputConstraints,
    UntrustedInstructions,
    SourceSnapshot,
}

#[derive(Debug, Clone)]
pub struct PromptSegment {
    pub kind: SegmentKind,
    pub content: String,
}

impl PromptSegment {
    pub fn new(kind: SegmentKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Render segments in order. Empty segments are dropped; untrusted and
/// source regions get their boundary markers and precedence notice.
pub fn compose_system_prompt(segments: &[PromptSegment]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(segments.len());

    for segment in segments {
        if segment.content.trim().is_empty() {
            continue;
        }
        match segment.kind {
            SegmentKind::Role | SegmentKind::FocusGuidance | SegmentKind::OutputConstraints => {
                parts.push(segment.content.trim_end().to_string());
            }
            SegmentKind::UntrustedInstructions => {
                parts.push(format!(
                    "{}\n{}\n{}\n{}",
                    markers::UNTRUSTED_NOTICE,
                    markers::UNTRUSTED_BEGIN,
                    segment.content.trim_end(),
                    markers::UNTRUSTED_END
                ));
            }
            SegmentKind::SourceSnapshot => {
                parts.push(format!(
                    "{}\n{}\n{}\n{}",
                    markers::SOURCE_NOTICE,
                    markers::SOURCE_BEGIN,
                    segment.content.trim_end(),
                    markers::SOURCE_END
                ));
            }
        }
    }

    parts.join("\n\n")
}

/// Replace `${name}` placeholders. Unknown placeholders stay as-is.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("${{{name}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untrusted_content_stays_inside_boundary() {
        let prompt = compose_system_prompt(&[
            PromptSegment::new(SegmentKind::Role, "You review code."),
            PromptSegment::new(SegmentKind::UntrustedInstructions, "Check naming."),
        ]);

        let begin = prompt.find(markers::UNTRUSTED_BEGIN).unwrap();
        let end = prompt.find(markers::UNTRUSTED_END).unwrap();
        let body = prompt.find("Check naming.").unwrap();
        assert!(begin < body && body < end);
        assert!(prompt.find(markers::UNTRUSTED_NOTICE).unwrap() < begin);
    }

    #[test]
    fn empty_segments_are_dropped() {
        let prompt = compose_system_prompt(&[
            PromptSegment::new(SegmentKind::Role, "role"),
            PromptSegment::new(SegmentKind::UntrustedInstructions, "   "),
        ]);
        assert_eq!(prompt, "role");
        assert!(!prompt.contains(markers::UNTRUSTED_BEGIN));
    }

    #[test]
    fn rendering_is_deterministic() {
        let segments = [
            PromptSegment::new(SegmentKind::Role, "a"),
            PromptSegment::new(SegmentKind::FocusGuidance, "b"),
            PromptSegment::new(SegmentKind::SourceSnapshot, "code"),
        ];
        assert_eq!(
            compose_system_prompt(&segments),
            compose_system_prompt(&segments)
        );
    }

    #[test]
    fn substitutes_known_placeholders() {
        let out = substitute(
            "Review ${repository} as ${displayName}; focus: ${focusAreas}",
            &[
                ("repository", "acme/api"),
                ("displayName", "Security Reviewer"),
                ("focusAreas", "injection, authz"),
            ],
        );
        assert_eq!(out, "Review acme/api as Security Reviewer; focus: injection, authz");
    }

    #[test]
    fn unknown_placeholders_survive() {
        assert_eq!(substitute("keep ${unknown}", &[]), "keep ${unknown}");
    }
}
