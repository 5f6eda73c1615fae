use once_cell::sync::Lazy;
use regex::Regex;

/// Acknowledgment lines models like to open with before the actual report.
static PREAMBLE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(here('s| is| are)\b|i('ll| will| am going to)\b|i analyzed\b|certainly\b|sure\b|of course\b|okay\b|let me\b|as requested\b|below (is|are)\b)",
    )
    .expect("preamble pattern")
});

static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#{1,6}\s").expect("heading pattern"));

/// Reasoning envelopes and "thinking out loud" prefixes, removed in one pass.
static CHAIN_OF_THOUGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ism)<think>.*?</think>\s*|<thinking>.*?</thinking>\s*|<reasoning>.*?</reasoning>\s*|<scratchpad>.*?</scratchpad>\s*|^let me think\b[^\n]*\n?|^\s*```think(?:ing)?\s*\n.*?^\s*```\s*\n?",
    )
    .expect("chain-of-thought pattern")
});

static DANGEROUS_HTML: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<script\b[^>]*>.*?</script\s*>|<script\b[^>]*/?>|<iframe\b[^>]*>.*?</iframe\s*>|<iframe\b[^>]*/?>|\son\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)|javascript:|data:[^,"'\s]{0,64}base64,"#,
    )
    .expect("dangerous html pattern")
});

static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:#x?[0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").expect("entity pattern"));

static TRAILING_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("trailing spaces pattern"));

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run pattern"));

/// Clean a raw LLM response for downstream parsing and report embedding.
/// Total: never fails, and `sanitize(sanitize(t)) == sanitize(t)`.
///
/// The rule pipeline repeats until a fixpoint. One round is not enough on its
/// own: stripping a reasoning envelope can expose a preamble behind it, and
/// removing a nested `<scr<script>..</script>ipt>` leaves a reassembled tag
/// that only the next round sees. Every rule strictly shrinks the text, so
/// the loop terminates.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.to_string();
    loop {
        let next = sanitize_round(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn sanitize_round(input: &str) -> String {
    let mut text = input.to_string();

    if starts_with_preamble(&text) {
        text = strip_preamble(&text);
    }

    // Entity-encoded markers must not slip past the reasoning/HTML rules, so
    // decode first, but only when decoding actually exposes a marker, which
    // keeps benign entities (and therefore idempotence) intact.
    if HTML_ENTITY.is_match(&text) {
        let decoded = deep_decode(&text);
        if decoded != text
            && (CHAIN_OF_THOUGHT.is_match(&decoded) || DANGEROUS_HTML.is_match(&decoded))
        {
            text = decoded;
        }
    }

    if CHAIN_OF_THOUGHT.is_match(&text) {
        text = CHAIN_OF_THOUGHT.replace_all(&text, "").into_owned();
    }

    if DANGEROUS_HTML.is_match(&text) {
        text = DANGEROUS_HTML.replace_all(&text, "").into_owned();
    }

    if TRAILING_SPACES.is_match(&text) {
        text = TRAILING_SPACES.replace_all(&text, "").into_owned();
    }
    if BLANK_RUNS.is_match(&text) {
        text = BLANK_RUNS.replace_all(&text, "\n\n").into_owned();
    }

    text.trim_end().to_string()
}

/// Decode entities to a fixpoint so double-encoded markers cannot hide one
/// layer down. Bounded: decoding only ever shrinks the text.
fn deep_decode(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..4 {
        let decoded = html_escape::decode_html_entities(&current).into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn starts_with_preamble(text: &str) -> bool {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| PREAMBLE_START.is_match(l) && !HEADING_LINE.is_match(l))
        .unwrap_or(false)
}

/// Drop acknowledgment lines from the top, up to the first Markdown heading.
/// Without any heading, only the leading run of acknowledgment lines goes.
fn strip_preamble(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    if let Some(heading_idx) = lines.iter().position(|l| HEADING_LINE.is_match(l)) {
        return lines[heading_idx..].join("\n");
    }

    let mut start = 0;
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() || PREAMBLE_START.is_match(line) {
            start = i + 1;
        } else {
            break;
        }
    }
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_preamble_before_heading() {
        let raw = "Here's my analysis of the code!\n\n### 1. SQL injection\nbody";
        let clean = sanitize(raw);
        assert!(clean.starts_with("### 1. SQL injection"));
        assert!(clean.contains("body"));
    }

    #[test]
    fn keeps_text_without_preamble() {
        let raw = "### 1. Finding\nNo acknowledgment here.";
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn strips_script_blocks() {
        let raw = "### 1. XSS\n<script>alert(1)</script>\ndetails";
        let clean = sanitize(raw);
        assert!(!clean.contains("<script>"));
        assert!(!clean.contains("alert(1)"));
        assert!(clean.contains("details"));
    }

    #[test]
    fn strips_inline_handlers_and_uris() {
        let raw = r#"see <img src=x onerror="alert(1)"> and javascript:void(0) and data:text/html;base64,AAAA"#;
        let clean = sanitize(raw);
        assert!(!clean.contains("onerror"));
        assert!(!clean.contains("javascript:"));
        assert!(!clean.contains("base64,"));
    }

    #[test]
    fn strips_reasoning_envelopes() {
        let raw = "<think>step by step...</think>### 1. Finding\nbody";
        let clean = sanitize(raw);
        assert!(!clean.contains("step by step"));
        assert!(clean.contains("### 1. Finding"));
    }

    #[test]
    fn decodes_entity_encoded_markers() {
        let raw = "&lt;think&gt;hidden&lt;/think&gt;### 1. Finding";
        let clean = sanitize(raw);
        assert!(!clean.contains("hidden"));
        assert!(!clean.contains("<think>"));
    }

    #[test]
    fn leaves_benign_entities_alone() {
        let raw = "Fish &amp; chips";
        assert_eq!(sanitize(raw), "Fish &amp; chips");
    }

    #[test]
    fn collapses_blank_runs() {
        let raw = "a\n\n\n\n\nb";
        assert_eq!(sanitize(raw), "a\n\nb");
    }

    #[test]
    fn idempotent_on_adversarial_inputs() {
        let samples = [
            "Here's the report\n\n### 1. A | Priority: High | Location: x\n\n\n\nbody  ",
            "&lt;script&gt;x&lt;/script&gt;<script>y</script>### 1. A",
            "<thinking>a</thinking>Let me think about this\n### 1. B",
            "plain text, no markers &amp; an entity",
            "",
        ];
        for raw in samples {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn mixed_literal_and_encoded_markers_all_removed() {
        let raw = "<script>a</script> and &lt;script&gt;b&lt;/script&gt; rest";
        let once = sanitize(raw);
        assert!(!once.to_lowercase().contains("<script"));
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn nested_tags_cannot_reassemble() {
        let raw = "<scr<script>x</script>ipt>alert(2)</script> tail";
        let clean = sanitize(raw);
        assert!(!clean.to_lowercase().contains("<script"));
        assert!(!clean.contains("alert(2)"));
        assert!(clean.contains("tail"));
    }

    #[test]
    fn double_encoded_markers_are_removed() {
        let raw = "&amp;lt;script&amp;gt;alert(3)&amp;lt;/script&amp;gt; body";
        let clean = sanitize(raw);
        assert!(!clean.to_lowercase().contains("<script"));
        assert!(!clean.contains("alert(3)"));
        assert_eq!(sanitize(&clean), clean);
    }

    #[test]
    fn preamble_exposed_by_reasoning_strip_is_removed() {
        let raw = "<thinking>plan</thinking>Let me think about this\n### 1. B | Priority: Low";
        let clean = sanitize(raw);
        assert!(clean.starts_with("### 1. B"));
        assert_eq!(sanitize(&clean), clean);
    }
}
