use crate::error::{ConclaveError, Result};
use crate::resilience::Watchdog;
use crate::review::context::ReviewContext;
use crate::sanitize::sanitize;
use crate::transport::{SessionEvent, SessionRequest};
use std::time::Duration;

/// One transport attempt: open a fresh session, stream the response under an
/// idle watchdog, race against the attempt deadline, then sanitize.
///
/// Partial text present when the watchdog or the deadline fires is discarded;
/// the attempt fails with its transient classification and the retry policy
/// decides what happens next.
pub(crate) async fn execute_attempt(
    ctx: &ReviewContext,
    model: &str,
    system_prompt: String,
    user_prompt: String,
    attempt_timeout: Duration,
) -> Result<String> {
    let request = SessionRequest {
        system_prompt,
        user_prompt,
        model: model.to_string(),
        reasoning_effort: ctx.reasoning_effort.clone(),
        mcp_servers: ctx.mcp_servers.clone(),
        auth_token: ctx.auth_token.clone(),
    };

    let mut session = match ctx.transport.open_session(request).await {
        Ok(s) => s,
        // Authentication and permanent-close failures keep their fatal
        // classification; everything else is a session-establishment failure.
        Err(e @ (ConclaveError::Auth(_) | ConclaveError::TransportClosed(_))) => return Err(e),
        Err(ConclaveError::SessionStart(m)) => return Err(ConclaveError::SessionStart(m)),
        Err(e) => return Err(ConclaveError::SessionStart(e.to_string())),
    };

    let watchdog = Watchdog::arm(&ctx.scheduler, ctx.idle_timeout, session.cancel_handle());

    let read = async {
        let mut content = String::new();
        loop {
            match session.next_event().await {
                Some(SessionEvent::TextChunk(chunk)) => {
                    watchdog.touch();
                    content.push_str(&chunk);
                }
                // Tool activity counts as progress even without text.
                Some(SessionEvent::ToolCall { .. }) => watchdog.touch(),
                Some(SessionEvent::Done) | None => return Ok(content),
                Some(SessionEvent::Error { kind, message }) => {
                    return Err(kind.into_error(message))
                }
            }
        }
    };

    let raced = tokio::time::timeout(attempt_timeout, read).await;
    let outcome = match raced {
        Ok(result) => result,
        Err(_) => {
            session.cancel();
            Err(ConclaveError::DeadlineExceeded)
        }
    };
    watchdog.disarm();

    let outcome = match outcome {
        Err(ConclaveError::Cancelled) if watchdog.fired() => Err(ConclaveError::IdleTimeout),
        other => other,
    };
    session.close();

    let content = outcome?;
    if content.trim().is_empty() {
        return Err(ConclaveError::EmptyResponse);
    }
    Ok(sanitize(&content))
}
