use crate::error::ConclaveError;
use crate::resilience::OpClass;
use crate::review::context::{AgentConfig, PassResult, ReviewContext, ReviewTarget};
use crate::review::exec::execute_attempt;
use crate::{prompt, resilience};
use std::sync::Arc;
use std::time::Instant;

/// Executes one agent's review passes. Constructed once per agent per run;
/// every pass still opens a fresh transport session so a poisoned session
/// cannot leak into the next pass.
pub struct AgentReviewer {
    agent: AgentConfig,
    ctx: Arc<ReviewContext>,
}

impl AgentReviewer {
    pub fn new(agent: AgentConfig, ctx: Arc<ReviewContext>) -> Self {
        Self { agent, ctx }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent.name
    }

    /// Run `pass_count` passes sequentially. A zero pass count silently skips
    /// the agent with an empty list; callers must not read that as failure.
    pub async fn review_passes(
        &self,
        target: &ReviewTarget,
        pass_count: usize,
    ) -> Vec<PassResult> {
        let mut results = Vec::with_capacity(pass_count);
        for pass in 1..=pass_count {
            results.push(self.run_pass(target, pass).await);
        }
        results
    }

    /// Run a single pass: breaker admission, then the retry loop around
    /// fresh-session attempts, then breaker recording. Never panics and never
    /// returns an error; failures become failed `PassResult`s.
    pub async fn run_pass(&self, target: &ReviewTarget, pass: usize) -> PassResult {
        let started = Instant::now();
        let breaker = self.ctx.breakers.for_class(OpClass::Review);

        if !breaker.admit() {
            tracing::warn!(agent = %self.agent.name, pass, "pass rejected: review circuit open");
            return PassResult::failed(
                &self.agent.name,
                pass,
                ConclaveError::CircuitOpen(OpClass::Review).to_string(),
                started.elapsed(),
            );
        }

        let (system_prompt, user_prompt) = self.compose_prompts(target);
        let outcome = resilience::retry_with_backoff(
            self.ctx.retry_for(OpClass::Review),
            &format!("review:{}", self.agent.name),
            |attempt| {
                tracing::debug!(agent = %self.agent.name, pass, attempt, "starting attempt");
                execute_attempt(
                    &self.ctx,
                    &self.agent.model,
                    system_prompt.clone(),
                    user_prompt.clone(),
                    self.ctx.attempt_timeout_for(OpClass::Review),
                )
            },
        )
        .await;

        breaker.record(outcome.is_ok());

        match outcome {
            Ok(content) => {
                tracing::info!(
                    agent = %self.agent.name,
                    pass,
                    bytes = content.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pass completed"
                );
                PassResult::succeeded(&self.agent.name, pass, content, started.elapsed())
            }
            Err(e) => {
                tracing::warn!(agent = %self.agent.name, pass, error = %e, "pass failed");
                PassResult::failed(&self.agent.name, pass, e.to_string(), started.elapsed())
            }
        }
    }

    /// Build (system, user) prompts. The system prompt is a deterministic
    /// sequence of labeled segments; custom instructions only ever appear
    /// inside the untrusted boundary, and local-target source inside the
    /// source boundary.
    fn compose_prompts(&self, target: &ReviewTarget) -> (String, String) {
        let focus = self.agent.focus_areas.join(", ");

        let mut constraints = self.ctx.output_constraints.clone();
        if !self.agent.output_format.trim().is_empty() {
            if !constraints.is_empty() {
                constraints.push_str("\n\n");
            }
            constraints.push_str(&self.agent.output_format);
        }

        let mut segments = vec![
            prompt::PromptSegment::new(prompt::SegmentKind::Role, self.agent.role_prompt.clone()),
            prompt::PromptSegment::new(
                prompt::SegmentKind::FocusGuidance,
                if focus.is_empty() {
                    String::new()
                } else {
                    format!("Focus areas: {focus}")
                },
            ),
            prompt::PromptSegment::new(prompt::SegmentKind::OutputConstraints, constraints),
        ];

        if !self.ctx.instructions.is_empty() {
            let joined = self
                .ctx
                .instructions
                .iter()
                .map(|i| {
                    let mut block = format!("[{}]", i.source_path);
                    if let Some(ref scope) = i.apply_to {
                        block.push_str(&format!(" (applies to: {scope})"));
                    }
                    block.push('\n');
                    block.push_str(&i.content);
                    block
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            segments.push(prompt::PromptSegment::new(
                prompt::SegmentKind::UntrustedInstructions,
                joined,
            ));
        }

        match target {
            ReviewTarget::LocalDirectory { source, .. } => {
                segments.push(prompt::PromptSegment::new(
                    prompt::SegmentKind::SourceSnapshot,
                    source.content.clone(),
                ));
            }
            ReviewTarget::Repository { .. } => {}
        }

        let system_prompt = prompt::compose_system_prompt(&segments);
        let user_prompt = prompt::substitute(
            &self.agent.instruction_template,
            &[
                ("repository", target.display_name().as_str()),
                ("displayName", self.agent.display_name.as_str()),
                ("focusAreas", focus.as_str()),
            ],
        );

        (system_prompt, user_prompt)
    }
}
