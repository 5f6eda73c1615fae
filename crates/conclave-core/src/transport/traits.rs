use crate::error::{ConclaveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// An authentication token. Debug and Display never reveal the bytes; audit
/// records may only carry the SHA-256 hex digest.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for injection into a transport request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([redacted])")
    }
}

/// Descriptor for an MCP server made available to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
}

/// Everything a transport needs to open one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub mcp_servers: Vec<McpServerConfig>,
    pub auth_token: AuthToken,
}

/// Error classes a session can report; drives retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Transient,
    RateLimited,
    Auth,
    Closed,
    Cancelled,
}

/// Events emitted on a session's stream.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TextChunk(String),
    ToolCall { name: String, arguments: String },
    Done,
    Error {
        kind: TransportErrorKind,
        message: String,
    },
}

/// Cancellation handle shared between a session, its watchdog, and the
/// transport reader task. `cancel()` is idempotent.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. Safe to await repeatedly.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register with the notifier before re-checking the flag; a cancel
        // landing between the check and the first poll would otherwise be
        // missed, since notify_waiters only wakes already-registered waiters.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One open exchange against the transport. Sessions are short-lived and
/// exclusively owned by the opener; cancel and close are idempotent.
pub struct Session {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancelHandle,
}

impl Session {
    pub fn new(events: mpsc::UnboundedReceiver<SessionEvent>, cancel: CancelHandle) -> Self {
        Self { events, cancel }
    }

    /// Next typed event, or None once the stream is exhausted. A pending wait
    /// completes with a cancellation event once `cancel()` fires, regardless
    /// of the transport implementation behind the channel; queued events are
    /// still drained first.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            event = self.events.recv() => event,
            _ = self.cancel.cancelled() => Some(SessionEvent::Error {
                kind: TransportErrorKind::Cancelled,
                message: "session cancelled".to_string(),
            }),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The transport contract. One client lives for the whole run; sessions are
/// opened per pass with bounded start-up time.
#[async_trait::async_trait]
pub trait TransportClient: Send + Sync {
    async fn open_session(&self, request: SessionRequest) -> Result<Session>;
}

impl TransportErrorKind {
    /// Map a session error event to the run error taxonomy.
    pub fn into_error(self, message: String) -> ConclaveError {
        match self {
            Self::Transient | Self::RateLimited => ConclaveError::Transport(message),
            Self::Auth => ConclaveError::Auth(message),
            Self::Closed => ConclaveError::TransportClosed(message),
            Self::Cancelled => ConclaveError::Cancelled,
        }
    }
}
