use crate::error::{ConclaveError, Result};
use crate::resilience::{self, OpClass};
use crate::review::context::ReviewContext;
use crate::review::exec::execute_attempt;

const SKILL_ROLE: &str = "You are a focused assistant executing a single ad-hoc prompt. \
Answer directly in Markdown.";

/// Single-shot prompt execution. Reuses the transport, sanitizer, retry
/// policy and the `skill` circuit class; no scheduler, no merging.
pub async fn run_skill(ctx: &ReviewContext, model: &str, prompt: &str) -> Result<String> {
    let breaker = ctx.breakers.for_class(OpClass::Skill);
    if !breaker.admit() {
        return Err(ConclaveError::CircuitOpen(OpClass::Skill));
    }

    let outcome = resilience::retry_with_backoff(ctx.retry_for(OpClass::Skill), "skill", |_| {
        execute_attempt(
            ctx,
            model,
            SKILL_ROLE.to_string(),
            prompt.to_string(),
            ctx.attempt_timeout_for(OpClass::Skill),
        )
    })
    .await;

    breaker.record(outcome.is_ok());
    outcome
}
