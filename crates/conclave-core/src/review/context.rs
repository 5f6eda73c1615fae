use crate::resilience::{BreakerRegistry, OpClass, RetryPolicy, WatchdogScheduler};
use crate::source::CollectionResult;
use crate::transport::{AuthToken, McpServerConfig, TransportClient};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What a run reviews. Created at run start and immutable for its duration;
/// the two variants differ in how the agent prompt embeds the source.
#[derive(Debug, Clone)]
pub enum ReviewTarget {
    Repository {
        slug: String,
    },
    LocalDirectory {
        path: PathBuf,
        source: CollectionResult,
    },
}

impl ReviewTarget {
    pub fn display_name(&self) -> String {
        match self {
            Self::Repository { slug } => slug.clone(),
            Self::LocalDirectory { path, .. } => path.display().to_string(),
        }
    }

    /// Directory component under the output base. Never empty, never
    /// absolute, never contains path separators from the target itself.
    pub fn subpath(&self) -> String {
        let raw = match self {
            Self::Repository { slug } => slug.clone(),
            Self::LocalDirectory { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "local".to_string()),
        };
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.is_empty() {
            "target".to_string()
        } else {
            cleaned
        }
    }
}

/// A loaded review agent. Immutable for the run; names are unique.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub display_name: String,
    pub model: String,
    /// System-prompt role text.
    pub role_prompt: String,
    /// User-prompt template with `${repository}`, `${displayName}`,
    /// `${focusAreas}` placeholders.
    pub instruction_template: String,
    pub focus_areas: Vec<String>,
    pub output_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSource {
    Explicit,
    Discovered,
}

/// A validated custom instruction. Content has passed the safety validator
/// before any of these reach the orchestrator.
#[derive(Debug, Clone)]
pub struct CustomInstruction {
    pub source_path: String,
    pub content: String,
    pub source: InstructionSource,
    /// Optional glob narrowing which files the instruction applies to.
    pub apply_to: Option<String>,
    pub description: Option<String>,
}

/// Shared, read-only state for all agent tasks of one run.
pub struct ReviewContext {
    pub transport: Arc<dyn TransportClient>,
    pub agent_timeout: Duration,
    pub idle_timeout: Duration,
    pub summary_timeout: Duration,
    pub review_retry: RetryPolicy,
    pub summary_retry: RetryPolicy,
    pub skill_retry: RetryPolicy,
    pub reasoning_effort: Option<String>,
    pub output_constraints: String,
    pub mcp_servers: Vec<McpServerConfig>,
    pub scheduler: Arc<WatchdogScheduler>,
    pub breakers: Arc<BreakerRegistry>,
    pub instructions: Vec<CustomInstruction>,
    pub auth_token: AuthToken,
}

impl ReviewContext {
    pub fn retry_for(&self, class: OpClass) -> &RetryPolicy {
        match class {
            OpClass::Review => &self.review_retry,
            OpClass::Summary => &self.summary_retry,
            OpClass::Skill => &self.skill_retry,
        }
    }

    pub fn attempt_timeout_for(&self, class: OpClass) -> Duration {
        match class {
            OpClass::Review | OpClass::Skill => self.agent_timeout,
            OpClass::Summary => self.summary_timeout,
        }
    }
}

/// Outcome of one pass of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct PassResult {
    pub agent_name: String,
    pub pass: usize,
    pub success: bool,
    /// Sanitized content; empty on failure.
    pub content: String,
    /// Non-empty exactly when the pass failed.
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub duration: Duration,
}

impl PassResult {
    pub fn succeeded(agent_name: &str, pass: usize, content: String, duration: Duration) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            pass,
            success: true,
            content,
            error: None,
            timestamp: chrono::Local::now(),
            duration,
        }
    }

    pub fn failed(agent_name: &str, pass: usize, error: String, duration: Duration) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            pass,
            success: false,
            content: String::new(),
            error: Some(error),
            timestamp: chrono::Local::now(),
            duration,
        }
    }
}

/// Provenance row kept per pass on the merged result.
#[derive(Debug, Clone, Serialize)]
pub struct PassProvenance {
    pub pass: usize,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// One agent's merged outcome across its passes.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub agent_name: String,
    /// True iff at least one pass succeeded (or the agent was skipped with
    /// zero passes).
    pub success: bool,
    pub content: String,
    pub passes: Vec<PassProvenance>,
    /// Last pass's error when every pass failed.
    pub error: Option<String>,
}
