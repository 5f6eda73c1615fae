use crate::constants::merging::{SIMILARITY_THRESHOLD, TITLE_PREFIX_LEN};
use crate::review::context::{AgentResult, PassProvenance, PassResult};
use crate::review::findings::{canonical_text, parse_findings, DedupKey, Finding};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A finding plus every pass that observed it. Grows monotonically while one
/// agent's passes merge.
#[derive(Debug, Clone)]
pub struct AggregatedFinding {
    pub finding: Finding,
    pub passes: BTreeSet<usize>,
    pub locations: BTreeSet<String>,
}

struct Aggregate {
    findings: Vec<AggregatedFinding>,
    by_key: HashMap<DedupKey, usize>,
    /// Inverted index `(priority, canonical-title prefix) -> finding indices`
    /// so near-duplicate checks avoid an all-pairs scan.
    by_prefix: HashMap<(String, String), Vec<usize>>,
    fallback_blocks: Vec<(String, BTreeSet<usize>)>,
}

impl Aggregate {
    fn new() -> Self {
        Self {
            findings: Vec::new(),
            by_key: HashMap::new(),
            by_prefix: HashMap::new(),
            fallback_blocks: Vec::new(),
        }
    }

    fn add_finding(&mut self, finding: Finding, pass: usize) {
        let key = finding.dedup_key();

        if let Some(&idx) = self.by_key.get(&key) {
            let agg = &mut self.findings[idx];
            agg.passes.insert(pass);
            if !finding.location.trim().is_empty() {
                agg.locations.insert(finding.location);
            }
            return;
        }

        if let Some(idx) = self.find_near_duplicate(&key) {
            let agg = &mut self.findings[idx];
            agg.passes.insert(pass);
            if !finding.location.trim().is_empty() {
                agg.locations.insert(finding.location);
            }
            // The alias key now resolves to the same aggregate, so later
            // exact hits stay cheap.
            self.by_key.insert(key, idx);
            return;
        }

        let idx = self.findings.len();
        let mut locations = BTreeSet::new();
        if !finding.location.trim().is_empty() {
            locations.insert(finding.location.clone());
        }
        let mut passes = BTreeSet::new();
        passes.insert(pass);
        self.by_prefix
            .entry(prefix_key(&key))
            .or_default()
            .push(idx);
        self.by_key.insert(key, idx);
        self.findings.push(AggregatedFinding {
            finding,
            passes,
            locations,
        });
    }

    fn find_near_duplicate(&self, key: &DedupKey) -> Option<usize> {
        let candidates = self.by_prefix.get(&prefix_key(key))?;
        let probe_tokens = similarity_tokens(&key.title, &key.location);

        let mut best: Option<(usize, f64)> = None;
        for &idx in candidates {
            let existing = &self.findings[idx];
            let existing_key = existing.finding.dedup_key();
            let candidate_tokens = similarity_tokens(&existing_key.title, &existing_key.location);
            let score = jaccard(&probe_tokens, &candidate_tokens);
            if score >= SIMILARITY_THRESHOLD
                && best.map(|(_, s)| score > s).unwrap_or(true)
            {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn add_fallback(&mut self, content: &str, pass: usize) {
        let normalized = content.trim().to_string();
        if normalized.is_empty() {
            return;
        }
        if let Some((_, passes)) = self
            .fallback_blocks
            .iter_mut()
            .find(|(text, _)| *text == normalized)
        {
            passes.insert(pass);
        } else {
            let mut passes = BTreeSet::new();
            passes.insert(pass);
            self.fallback_blocks.push((normalized, passes));
        }
    }
}

fn prefix_key(key: &DedupKey) -> (String, String) {
    let prefix: String = key.title.chars().take(TITLE_PREFIX_LEN).collect();
    (key.priority.clone(), prefix)
}

fn similarity_tokens(title: &str, location: &str) -> HashSet<String> {
    canonical_text(&format!("{title} {location}"))
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Merge one agent's pass results into a single `AgentResult`.
///
/// Passes are processed in pass-ordinal order regardless of how the caller
/// collected them, so the aggregated key set, the per-key pass unions, and
/// the emitted numbering are identical for every permutation of the input.
pub fn merge_agent_passes(agent_name: &str, mut pass_results: Vec<PassResult>) -> AgentResult {
    pass_results.sort_by_key(|p| p.pass);

    let provenance: Vec<PassProvenance> = pass_results
        .iter()
        .map(|p| PassProvenance {
            pass: p.pass,
            success: p.success,
            duration: p.duration,
            error: p.error.clone(),
        })
        .collect();

    // Zero passes means the agent was skipped, not that it failed.
    if pass_results.is_empty() {
        return AgentResult {
            agent_name: agent_name.to_string(),
            success: true,
            content: String::new(),
            passes: provenance,
            error: None,
        };
    }

    if pass_results.iter().all(|p| !p.success) {
        let last_error = pass_results
            .iter()
            .rev()
            .find_map(|p| p.error.clone())
            .unwrap_or_else(|| "all passes failed".to_string());
        return AgentResult {
            agent_name: agent_name.to_string(),
            success: false,
            content: String::new(),
            passes: provenance,
            error: Some(last_error),
        };
    }

    let mut aggregate = Aggregate::new();
    for pass_result in pass_results.iter().filter(|p| p.success) {
        let findings = parse_findings(&pass_result.content);
        if findings.is_empty() {
            aggregate.add_fallback(&pass_result.content, pass_result.pass);
            continue;
        }
        for finding in findings {
            aggregate.add_finding(finding, pass_result.pass);
        }
    }

    AgentResult {
        agent_name: agent_name.to_string(),
        success: true,
        content: render_merged(&aggregate),
        passes: provenance,
        error: None,
    }
}

/// Render findings renumbered in first-seen order, each annotated with its
/// detection passes when observed more than once; deduplicated fallback
/// blocks follow.
fn render_merged(aggregate: &Aggregate) -> String {
    let mut out = String::new();

    for (i, agg) in aggregate.findings.iter().enumerate() {
        let f = &agg.finding;
        out.push_str(&format!("### {}. {}\n", i + 1, f.title));
        out.push_str(&format!("| **Priority** | {} |\n", f.priority.as_str()));
        if !f.summary.is_empty() {
            out.push_str(&format!("| **Summary** | {} |\n", f.summary));
        }
        if !agg.locations.is_empty() {
            let joined = agg
                .locations
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("; ");
            out.push_str(&format!("| **Location** | {joined} |\n"));
        }
        for (key, value) in &f.extras {
            out.push_str(&format!("| **{key}** | {value} |\n"));
        }
        if !f.body.is_empty() {
            out.push('\n');
            out.push_str(&f.body);
            out.push('\n');
        }
        if agg.passes.len() > 1 {
            let passes = agg
                .passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("\n_detection passes: {passes}_\n"));
        }
        out.push('\n');
    }

    for (block, _) in &aggregate.fallback_blocks {
        out.push_str(block);
        out.push_str("\n\n");
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pass(n: usize, content: &str) -> PassResult {
        PassResult::succeeded("agent", n, content.to_string(), Duration::from_millis(5))
    }

    fn failed_pass(n: usize, error: &str) -> PassResult {
        PassResult::failed("agent", n, error.to_string(), Duration::from_millis(5))
    }

    const FINDING: &str = "### 1. SQL injection | Priority: High | Location: src/A.java L10";

    #[test]
    fn identical_findings_merge_with_pass_annotation() {
        let result = merge_agent_passes("agent", vec![pass(1, FINDING), pass(2, FINDING)]);
        assert!(result.success);
        assert_eq!(result.content.matches("SQL injection").count(), 1);
        assert_eq!(result.content.matches("_detection passes: 1, 2_").count(), 1);
    }

    #[test]
    fn single_pass_findings_carry_no_annotation() {
        let result = merge_agent_passes("agent", vec![pass(1, FINDING)]);
        assert!(!result.content.contains("detection passes"));
    }

    #[test]
    fn near_duplicates_collapse() {
        let a = "### 1. SQL injection in user query | Priority: High | Location: src/A.java L10";
        let b = "### 1. SQL injection in user query handler | Priority: High | Location: src/A.java L10";
        let result = merge_agent_passes("agent", vec![pass(1, a), pass(2, b)]);
        assert_eq!(result.content.matches("### 1.").count(), 1);
        assert!(!result.content.contains("### 2."));
        assert!(result.content.contains("_detection passes: 1, 2_"));
    }

    #[test]
    fn distinct_findings_are_renumbered_in_first_seen_order() {
        let p1 = "### 1. Hardcoded credential | Priority: Critical | Location: cfg.rs\n\n### 2. Weak hash | Priority: Medium | Location: auth.rs";
        let p2 = "### 1. Missing rate limit | Priority: Low | Location: api.rs";
        let result = merge_agent_passes("agent", vec![pass(1, p1), pass(2, p2)]);
        let first = result.content.find("Hardcoded credential").unwrap();
        let second = result.content.find("Weak hash").unwrap();
        let third = result.content.find("Missing rate limit").unwrap();
        assert!(first < second && second < third);
        assert!(result.content.contains("### 3. Missing rate limit"));
    }

    #[test]
    fn merge_is_order_independent() {
        let p1 = pass(1, "### 1. A issue | Priority: High | Location: a.rs");
        let p2 = pass(2, FINDING);
        let p3 = pass(3, FINDING);

        let forward = merge_agent_passes("agent", vec![p1.clone(), p2.clone(), p3.clone()]);
        let backward = merge_agent_passes("agent", vec![p3, p2, p1]);

        assert_eq!(forward.content, backward.content);
    }

    #[test]
    fn all_failed_passes_yield_failed_result_with_last_error() {
        let result = merge_agent_passes(
            "agent",
            vec![failed_pass(1, "first error"), failed_pass(2, "second error")],
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("second error"));
        assert!(result.content.is_empty());
        assert_eq!(result.passes.len(), 2);
    }

    #[test]
    fn fallback_blocks_deduplicate_by_full_text() {
        let result = merge_agent_passes(
            "agent",
            vec![pass(1, "no findings"), pass(2, "no findings"), pass(3, FINDING)],
        );
        assert!(result.success);
        assert_eq!(result.content.matches("no findings").count(), 1);
        assert!(result.content.contains("SQL injection"));
    }

    #[test]
    fn mixed_failure_and_success_still_merges() {
        let result = merge_agent_passes(
            "agent",
            vec![failed_pass(1, "transient"), pass(2, FINDING)],
        );
        assert!(result.success);
        assert!(result.content.contains("SQL injection"));
        assert!(result.error.is_none());
    }

    #[test]
    fn zero_passes_is_a_silent_skip() {
        let result = merge_agent_passes("agent", Vec::new());
        assert!(result.success);
        assert!(result.content.is_empty());
        assert!(result.passes.is_empty());
    }
}
