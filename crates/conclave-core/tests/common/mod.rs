//! Shared test fixtures: a scripted mock transport and context builders.
#![allow(dead_code)]

use conclave_core::error::{ConclaveError, Result};
use conclave_core::resilience::{BreakerRegistry, RetryPolicy, WatchdogScheduler};
use conclave_core::review::{AgentConfig, ReviewContext};
use conclave_core::transport::{
    AuthToken, CancelHandle, Session, SessionEvent, SessionRequest, TransportClient,
    TransportErrorKind,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One scripted transport interaction. Consumed per `open_session` call in
/// call order; the fallback is replayed once the script runs dry.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    /// Stream the text (as two chunks) after `delay`, then `Done`.
    Text { content: String, delay: Duration },
    /// Open the session, then emit a session error event.
    SessionError {
        kind: TransportErrorKind,
        message: String,
    },
    /// Refuse to open the session at all.
    StartFailure(String),
    /// Refuse with an authentication failure.
    AuthFailure(String),
    /// Open the session and never send anything; the sender is parked so the
    /// channel stays open until cancellation.
    Stall,
}

impl ScriptedCall {
    pub fn text(content: &str) -> Self {
        Self::Text {
            content: content.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn text_after(content: &str, delay: Duration) -> Self {
        Self::Text {
            content: content.to_string(),
            delay,
        }
    }
}

pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedCall>>,
    fallback: ScriptedCall,
    calls: Arc<AtomicUsize>,
    concurrent: Arc<AtomicUsize>,
    high_water: Arc<AtomicUsize>,
    parked_senders: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl MockTransport {
    pub fn new(script: Vec<ScriptedCall>, fallback: ScriptedCall) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            concurrent: Arc::new(AtomicUsize::new(0)),
            high_water: Arc::new(AtomicUsize::new(0)),
            parked_senders: Mutex::new(Vec::new()),
        }
    }

    pub fn replaying(fallback: ScriptedCall) -> Self {
        Self::new(Vec::new(), fallback)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of sessions streaming at the same time.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TransportClient for MockTransport {
    async fn open_session(&self, _request: SessionRequest) -> Result<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match call {
            ScriptedCall::StartFailure(message) => Err(ConclaveError::SessionStart(message)),
            ScriptedCall::AuthFailure(message) => Err(ConclaveError::Auth(message)),
            ScriptedCall::Stall => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.parked_senders.lock().unwrap().push(tx);
                Ok(Session::new(rx, CancelHandle::new()))
            }
            ScriptedCall::SessionError { kind, message } => {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(SessionEvent::Error { kind, message });
                Ok(Session::new(rx, CancelHandle::new()))
            }
            ScriptedCall::Text { content, delay } => {
                let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.high_water.fetch_max(current, Ordering::SeqCst);

                let (tx, rx) = mpsc::unbounded_channel();
                let concurrent = self.concurrent.clone();
                tokio::spawn(async move {
                    if delay > Duration::ZERO {
                        tokio::time::sleep(delay).await;
                    }
                    let mid = content.len() / 2;
                    let (head, tail) = content.split_at(mid);
                    if !head.is_empty() {
                        let _ = tx.send(SessionEvent::TextChunk(head.to_string()));
                    }
                    if !tail.is_empty() {
                        let _ = tx.send(SessionEvent::TextChunk(tail.to_string()));
                    }
                    let _ = tx.send(SessionEvent::Done);
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                });
                Ok(Session::new(rx, CancelHandle::new()))
            }
        }
    }
}

pub struct ContextOptions {
    pub agent_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_attempts: u32,
    pub token: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(5),
            max_attempts: 0,
            token: "test-token".to_string(),
        }
    }
}

pub fn context_with(
    transport: Arc<MockTransport>,
    breakers: Arc<BreakerRegistry>,
    options: ContextOptions,
) -> Arc<ReviewContext> {
    let retry = RetryPolicy {
        max_attempts: options.max_attempts,
        backoff_base: Duration::from_millis(2),
        backoff_cap: Duration::from_millis(8),
    };
    Arc::new(ReviewContext {
        transport,
        agent_timeout: options.agent_timeout,
        idle_timeout: options.idle_timeout,
        summary_timeout: options.agent_timeout,
        review_retry: retry.clone(),
        summary_retry: retry.clone(),
        skill_retry: retry,
        reasoning_effort: None,
        output_constraints: "Report findings as numbered `###` sections.".to_string(),
        mcp_servers: Vec::new(),
        scheduler: Arc::new(WatchdogScheduler::new()),
        breakers,
        instructions: Vec::new(),
        auth_token: AuthToken::new(options.token),
    })
}

pub fn test_context(transport: Arc<MockTransport>) -> Arc<ReviewContext> {
    context_with(
        transport,
        Arc::new(BreakerRegistry::default()),
        ContextOptions::default(),
    )
}

pub fn agent(name: &str) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        display_name: format!("{name} reviewer"),
        model: "test-model".to_string(),
        role_prompt: format!("You are the {name} reviewer."),
        instruction_template: "Review ${repository} as ${displayName}.".to_string(),
        focus_areas: vec!["correctness".to_string()],
        output_format: String::new(),
    }
}
