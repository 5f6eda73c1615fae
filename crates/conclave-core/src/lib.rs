pub mod config;
pub mod constants;
pub mod error;
pub mod prompt;
pub mod report;
pub mod resilience;
pub mod review;
pub mod safety;
pub mod sanitize;
pub mod source;
pub mod transport;

// Re-export key types
pub use config::{load_agents, load_instructions, Settings};
pub use error::{ConclaveError, Result};
pub use report::{ReportWriter, RunStamp};
pub use resilience::{
    BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, OpClass, RetryPolicy, Watchdog,
    WatchdogScheduler,
};
pub use review::{
    run_skill, AgentConfig, AgentResult, AgentReviewer, CustomInstruction, ExecutionMode,
    ExecutiveSummarizer, Finding, InstructionSource, Orchestrator, PassResult, Priority,
    ReviewContext, ReviewTarget, SummaryConfig,
};
pub use sanitize::sanitize;
pub use source::{collect, CollectionConfig, CollectionResult};
pub use transport::{
    AuthToken, HttpTransport, McpServerConfig, Session, SessionEvent, SessionRequest,
    TransportClient, TransportErrorKind,
};
