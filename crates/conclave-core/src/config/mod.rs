mod agents;
mod instructions;
mod settings;

pub use agents::load_agents;
pub use instructions::load_instructions;
pub use settings::{
    FeatureFlags, LocalFileSettings, OpResilience, ResilienceSettings, Settings, SummarySettings,
};

/// Split optional YAML front-matter (`---` fenced) from a Markdown document.
/// Returns `(front_matter, body)`.
pub(crate) fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let rest = match text.strip_prefix("---") {
        Some(r) if r.starts_with('\n') || r.starts_with("\r\n") => r,
        _ => return (None, text),
    };
    let Some(end) = rest.find("\n---") else {
        return (None, text);
    };
    let front = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    (Some(front), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_fenced_front_matter() {
        let doc = "---\nname: security\n---\nBody text";
        let (front, body) = split_front_matter(doc);
        assert_eq!(front, Some("\nname: security"));
        assert_eq!(body, "Body text");
    }

    #[test]
    fn no_front_matter_passes_through() {
        let doc = "Just a body";
        assert_eq!(split_front_matter(doc), (None, doc));
    }
}
