use once_cell::sync::Lazy;
use regex::Regex;

/// Finding priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" | "blocker" => Some(Self::Critical),
            "high" | "major" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" | "minor" | "info" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// One issue extracted from a sanitized agent response.
#[derive(Debug, Clone)]
pub struct Finding {
    pub title: String,
    pub priority: Priority,
    pub summary: String,
    pub location: String,
    /// Attribute rows beyond the modeled ones (impact, recommended action,
    /// benefit), kept for faithful re-rendering.
    pub extras: Vec<(String, String)>,
    /// Free-form text after the header block.
    pub body: String,
}

/// Canonical identity of a finding across passes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupKey {
    pub priority: String,
    pub title: String,
    pub location: String,
}

impl Finding {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            priority: self.priority.as_str().to_lowercase(),
            title: canonical_text(&self.title),
            location: canonical_text(&self.location),
        }
    }
}

static FINDING_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^###\s*(\d+)[.)]\s*(.+)$").expect("finding header pattern"));

static ATTR_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\|\s*\*{0,2}([^|*]+?)\*{0,2}\s*\|\s*(.*?)\s*\|?\s*$").expect("attr row pattern")
});

static TABLE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|?[\s:|-]+\|?\s*$").expect("table rule pattern"));

static INLINE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z /-]*?)\s*:\s*(.+?)\s*$").expect("inline attr"));

/// Lowercase, strip Markdown formatting characters, collapse pipes, slashes
/// and middle dots into spaces, collapse internal whitespace.
pub fn canonical_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' | '`' | '_' | '[' | ']' | '#' | '~' => {}
            '|' | '/' | '\\' | '·' => out.push(' '),
            _ => out.extend(c.to_lowercase()),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract structured findings from sanitized Markdown. Text without any
/// finding header yields an empty list; the merger then treats the whole
/// content as a fallback block.
pub fn parse_findings(text: &str) -> Vec<Finding> {
    let headers: Vec<(usize, usize, &str)> = FINDING_HEADER
        .captures_iter(text)
        .map(|cap| {
            let m = cap.get(0).expect("whole match");
            (m.start(), m.end(), cap.get(2).expect("title").as_str())
        })
        .collect();

    let mut findings = Vec::with_capacity(headers.len());
    for (i, &(_, header_end, title_line)) in headers.iter().enumerate() {
        let section_end = headers
            .get(i + 1)
            .map(|&(next_start, _, _)| next_start)
            .unwrap_or(text.len());
        let section = &text[header_end..section_end];
        findings.push(parse_section(title_line, section));
    }
    findings
}

fn parse_section(title_line: &str, section: &str) -> Finding {
    let mut priority = None;
    let mut summary = String::new();
    let mut location = String::new();
    let mut extras = Vec::new();

    // The header line may carry inline `Key: value` segments after pipes.
    let mut parts = title_line.split('|');
    let title = parts.next().unwrap_or("").trim().to_string();
    for part in parts {
        if let Some(cap) = INLINE_ATTR.captures(part) {
            apply_attribute(
                &cap[1],
                &cap[2],
                &mut priority,
                &mut summary,
                &mut location,
                &mut extras,
            );
        }
    }

    let mut body_lines: Vec<&str> = Vec::new();
    for line in section.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            body_lines.push(line);
            continue;
        }
        if TABLE_RULE.is_match(trimmed) {
            continue;
        }
        if let Some(cap) = ATTR_ROW.captures(trimmed) {
            let key = cap[1].trim().to_string();
            let value = cap[2].trim().to_string();
            // A two-column header row ("Key | Value") is table furniture.
            if key.eq_ignore_ascii_case("key") || key.eq_ignore_ascii_case("attribute") {
                continue;
            }
            apply_attribute(
                &key,
                &value,
                &mut priority,
                &mut summary,
                &mut location,
                &mut extras,
            );
            continue;
        }
        body_lines.push(line);
    }

    let body = body_lines.join("\n").trim().to_string();

    Finding {
        title,
        priority: priority.unwrap_or(Priority::Medium),
        summary,
        location,
        extras,
        body,
    }
}

fn apply_attribute(
    key: &str,
    value: &str,
    priority: &mut Option<Priority>,
    summary: &mut String,
    location: &mut String,
    extras: &mut Vec<(String, String)>,
) {
    let canonical_key = key.trim().to_lowercase();
    match canonical_key.as_str() {
        "priority" | "severity" => {
            if let Some(p) = Priority::parse(value) {
                *priority = Some(p);
            }
        }
        "summary" | "description" => *summary = value.trim().to_string(),
        "location" | "file" | "where" => *location = value.trim().to_string(),
        _ => extras.push((key.trim().to_string(), value.trim().to_string())),
    }
}
