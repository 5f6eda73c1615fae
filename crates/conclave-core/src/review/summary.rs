use crate::constants::summary as defaults;
use crate::resilience::OpClass;
use crate::review::context::{AgentResult, ReviewContext};
use crate::review::exec::execute_attempt;
use crate::resilience;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Per-agent character budget in the summary prompt.
    pub max_content_per_agent: usize,
    /// Global character budget across all agents.
    pub max_total_prompt_content: usize,
    /// Excerpt length per agent in the deterministic fallback.
    pub fallback_excerpt_length: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_content_per_agent: defaults::DEFAULT_MAX_CONTENT_PER_AGENT,
            max_total_prompt_content: defaults::DEFAULT_MAX_TOTAL_PROMPT_CONTENT,
            fallback_excerpt_length: defaults::DEFAULT_FALLBACK_EXCERPT_LENGTH,
        }
    }
}

const SUMMARY_ROLE: &str = "You are an engineering lead condensing several specialist code \
reviews into one executive summary. Highlight the most severe findings first, group related \
issues, and keep the result under two pages of Markdown.";

/// Builds the executive summary once all agents completed. Runs through the
/// same session/retry path as a review pass but under the `summary` operation
/// class; persistent failure degrades to a deterministic Markdown fallback.
pub struct ExecutiveSummarizer {
    ctx: Arc<ReviewContext>,
    config: SummaryConfig,
    model: String,
}

impl ExecutiveSummarizer {
    pub fn new(ctx: Arc<ReviewContext>, config: SummaryConfig, model: impl Into<String>) -> Self {
        Self {
            ctx,
            config,
            model: model.into(),
        }
    }

    pub async fn summarize(&self, results: &[AgentResult], target_display: &str) -> String {
        let breaker = self.ctx.breakers.for_class(OpClass::Summary);
        if !breaker.admit() {
            tracing::warn!("summary circuit open; using deterministic fallback");
            return self.fallback_markdown(results, target_display);
        }

        let user_prompt = self.build_prompt(results, target_display);
        let outcome = resilience::retry_with_backoff(
            self.ctx.retry_for(OpClass::Summary),
            "summary",
            |_attempt| {
                execute_attempt(
                    &self.ctx,
                    &self.model,
                    SUMMARY_ROLE.to_string(),
                    user_prompt.clone(),
                    self.ctx.attempt_timeout_for(OpClass::Summary),
                )
            },
        )
        .await;

        breaker.record(outcome.is_ok());
        match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed; using fallback");
                self.fallback_markdown(results, target_display)
            }
        }
    }

    /// Concatenate per-agent merged content under the two character budgets:
    /// each agent's content is tail-truncated at the per-agent cap, and whole
    /// agents drop once the global cap is reached, with both cuts marked.
    fn build_prompt(&self, results: &[AgentResult], target_display: &str) -> String {
        let mut prompt = format!("Review target: {target_display}\n\n");
        let mut used = 0usize;
        let mut omitted: Vec<&str> = Vec::new();

        for result in results {
            if !result.success || result.content.is_empty() {
                prompt.push_str(&format!(
                    "## Agent: {} (failed: {})\n\n",
                    result.agent_name,
                    result.error.as_deref().unwrap_or("no output")
                ));
                continue;
            }

            if used >= self.config.max_total_prompt_content {
                omitted.push(&result.agent_name);
                continue;
            }

            let budget = self
                .config
                .max_content_per_agent
                .min(self.config.max_total_prompt_content - used);
            let (slice, truncated) = truncate_chars(&result.content, budget);
            used += slice.len();

            prompt.push_str(&format!("## Agent: {}\n\n{slice}\n", result.agent_name));
            if truncated {
                prompt.push_str("\n[content truncated]\n");
            }
            prompt.push('\n');
        }

        if !omitted.is_empty() {
            prompt.push_str(&format!(
                "Note: content from {} omitted for length.\n",
                omitted.join(", ")
            ));
        }

        prompt.push_str(
            "\nWrite the executive summary now, ordered by severity, with a short \
per-agent verdict table at the end.",
        );
        prompt
    }

    /// Deterministic Markdown assembled without the transport.
    fn fallback_markdown(&self, results: &[AgentResult], target_display: &str) -> String {
        let successful = results.iter().filter(|r| r.success).count();
        let mut out = format!(
            "# Executive Summary\n\nTarget: {target_display}\n\nAgents: {} total, {} successful, {} failed.\n\n_Generated without model assistance after summary attempts were exhausted._\n\n",
            results.len(),
            successful,
            results.len() - successful,
        );

        for result in results {
            out.push_str(&format!("## {}\n\n", result.agent_name));
            if result.success {
                let (excerpt, truncated) =
                    truncate_chars(&result.content, self.config.fallback_excerpt_length);
                out.push_str(excerpt.trim_end());
                if truncated {
                    out.push_str("\n\n[excerpt truncated]");
                }
            } else {
                out.push_str(&format!(
                    "Review failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            out.push_str("\n\n");
        }

        out.trim_end().to_string()
    }
}

/// Cut at a char boundary without splitting a code point.
fn truncate_chars(s: &str, max_chars: usize) -> (&str, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&s[..byte_idx], true),
        None => (s, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConclaveError, Result};
    use crate::resilience::{BreakerRegistry, RetryPolicy, WatchdogScheduler};
    use crate::review::context::PassProvenance;
    use crate::transport::{AuthToken, Session, SessionRequest, TransportClient};
    use std::time::Duration;

    struct FailingTransport;

    #[async_trait::async_trait]
    impl TransportClient for FailingTransport {
        async fn open_session(&self, _request: SessionRequest) -> Result<Session> {
            Err(ConclaveError::SessionStart("down".to_string()))
        }
    }

    fn ctx() -> Arc<ReviewContext> {
        Arc::new(ReviewContext {
            transport: Arc::new(FailingTransport),
            agent_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_millis(100),
            summary_timeout: Duration::from_millis(100),
            review_retry: RetryPolicy::default(),
            summary_retry: RetryPolicy {
                max_attempts: 1,
                backoff_base: Duration::from_millis(1),
                backoff_cap: Duration::from_millis(2),
            },
            skill_retry: RetryPolicy::default(),
            reasoning_effort: None,
            output_constraints: String::new(),
            mcp_servers: Vec::new(),
            scheduler: Arc::new(WatchdogScheduler::new()),
            breakers: Arc::new(BreakerRegistry::default()),
            instructions: Vec::new(),
            auth_token: AuthToken::new("t"),
        })
    }

    fn agent_result(name: &str, content: &str) -> AgentResult {
        AgentResult {
            agent_name: name.to_string(),
            success: true,
            content: content.to_string(),
            passes: vec![PassProvenance {
                pass: 1,
                success: true,
                duration: Duration::from_millis(3),
                error: None,
            }],
            error: None,
        }
    }

    #[tokio::test]
    async fn falls_back_when_transport_is_down() {
        let summarizer = ExecutiveSummarizer::new(ctx(), SummaryConfig::default(), "model");
        let results = vec![agent_result("security", "### 1. Issue | Priority: High")];
        let summary = summarizer.summarize(&results, "acme/api").await;
        assert!(summary.contains("# Executive Summary"));
        assert!(summary.contains("security"));
        assert!(summary.contains("1 successful"));
    }

    #[test]
    fn per_agent_budget_truncates_with_marker() {
        let summarizer = ExecutiveSummarizer::new(
            ctx(),
            SummaryConfig {
                max_content_per_agent: 10,
                max_total_prompt_content: 1000,
                fallback_excerpt_length: 10,
            },
            "model",
        );
        let results = vec![agent_result("a", &"x".repeat(100))];
        let prompt = summarizer.build_prompt(&results, "t");
        assert!(prompt.contains("[content truncated]"));
        assert!(!prompt.contains(&"x".repeat(11)));
    }

    #[test]
    fn global_budget_drops_trailing_agents_with_note() {
        let summarizer = ExecutiveSummarizer::new(
            ctx(),
            SummaryConfig {
                max_content_per_agent: 100,
                max_total_prompt_content: 50,
                fallback_excerpt_length: 10,
            },
            "model",
        );
        let results = vec![
            agent_result("first", &"a".repeat(80)),
            agent_result("second", &"b".repeat(80)),
        ];
        let prompt = summarizer.build_prompt(&results, "t");
        assert!(prompt.contains("## Agent: first"));
        assert!(!prompt.contains("## Agent: second"));
        assert!(prompt.contains("content from second omitted"));
    }

    #[test]
    fn fallback_reports_failed_agents() {
        let summarizer = ExecutiveSummarizer::new(ctx(), SummaryConfig::default(), "model");
        let failed = AgentResult {
            agent_name: "style".to_string(),
            success: false,
            content: String::new(),
            passes: Vec::new(),
            error: Some("circuit open for review operations".to_string()),
        };
        let out = summarizer.fallback_markdown(&[failed], "t");
        assert!(out.contains("Review failed: circuit open"));
    }
}
