use crate::resilience::OpClass;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConclaveError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport session could not be established: {0}")]
    SessionStart(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport closed permanently: {0}")]
    TransportClosed(String),

    #[error("no progress events within the idle window")]
    IdleTimeout,

    #[error("attempt deadline exceeded")]
    DeadlineExceeded,

    #[error("transport returned an empty response")]
    EmptyResponse,

    #[error("circuit open for {0} operations")]
    CircuitOpen(OpClass),

    #[error("unsafe instruction rejected ({rule}): {source_path}")]
    UnsafeInstruction { rule: String, source_path: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("agent definition error: {0}")]
    AgentDefinition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("run cancelled")]
    Cancelled,

    #[error("run interrupted: {0}")]
    Interrupted(String),

    #[error("{0}")]
    Other(String),
}

impl ConclaveError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether the retry policy may attempt the operation again.
    /// Everything not listed here aborts the attempt chain immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::IdleTimeout
            | Self::DeadlineExceeded
            | Self::EmptyResponse
            | Self::SessionStart(_)
            | Self::Transport(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConclaveError>;
