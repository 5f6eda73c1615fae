mod context;
mod exec;
pub mod findings;
mod merge;
mod orchestrator;
mod reviewer;
mod skill;
mod summary;

pub use context::{
    AgentConfig, AgentResult, CustomInstruction, InstructionSource, PassProvenance, PassResult,
    ReviewContext, ReviewTarget,
};
pub use findings::{canonical_text, parse_findings, DedupKey, Finding, Priority};
pub use merge::{merge_agent_passes, AggregatedFinding};
pub use orchestrator::{ExecutionMode, Orchestrator};
pub use reviewer::AgentReviewer;
pub use skill::run_skill;
pub use summary::{ExecutiveSummarizer, SummaryConfig};
