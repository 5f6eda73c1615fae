use crate::error::{ConclaveError, Result};
use crate::review::context::{AgentConfig, AgentResult, PassResult, ReviewContext, ReviewTarget};
use crate::review::merge::merge_agent_passes;
use crate::review::reviewer::AgentReviewer;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// How the N×P fan-out executes. Outputs are equivalent; the modes differ in
/// how cancellation propagates: aborting spawned tasks versus dropping a
/// parent-owned future set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Tasks,
    Structured,
}

pub type PassObserver = Arc<dyn Fn(&PassResult) + Send + Sync>;

pub struct Orchestrator {
    ctx: Arc<ReviewContext>,
    parallelism: usize,
    passes: usize,
    mode: ExecutionMode,
    run_timeout: Duration,
    pass_observer: Option<PassObserver>,
}

impl Orchestrator {
    pub fn new(
        ctx: Arc<ReviewContext>,
        parallelism: usize,
        passes: usize,
        mode: ExecutionMode,
        run_timeout: Duration,
    ) -> Self {
        let per_agent_budget = ctx
            .agent_timeout
            .saturating_mul(ctx.review_retry.max_attempts + 1)
            .saturating_mul(passes.max(1) as u32);
        if run_timeout < per_agent_budget {
            tracing::warn!(
                run_timeout_secs = run_timeout.as_secs(),
                per_agent_budget_secs = per_agent_budget.as_secs(),
                "orchestrator timeout is below the worst-case per-agent budget"
            );
        }

        Self {
            ctx,
            parallelism: parallelism.max(1),
            passes,
            mode,
            run_timeout,
            pass_observer: None,
        }
    }

    /// Observe every collected pass result, e.g. to write checkpoint files.
    pub fn with_pass_observer(mut self, observer: PassObserver) -> Self {
        self.pass_observer = Some(observer);
        self
    }

    fn observe(&self, pass_result: &PassResult) {
        if let Some(ref observer) = self.pass_observer {
            observer(pass_result);
        }
    }

    /// Fan out every agent's passes under the concurrency semaphore, collect
    /// their results, and merge per agent. One agent failing never aborts the
    /// run; results come back in the caller's agent order.
    pub async fn execute_reviews(
        &self,
        agents: &[AgentConfig],
        target: &ReviewTarget,
    ) -> Result<Vec<AgentResult>> {
        if agents.is_empty() {
            return Err(ConclaveError::config("at least one agent is required"));
        }
        {
            let mut seen = std::collections::HashSet::new();
            for agent in agents {
                if !seen.insert(agent.name.as_str()) {
                    return Err(ConclaveError::config(format!(
                        "duplicate agent name: {}",
                        agent.name
                    )));
                }
            }
        }

        let deadline = Instant::now() + self.run_timeout;
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let reviewers: Vec<Arc<AgentReviewer>> = agents
            .iter()
            .map(|a| Arc::new(AgentReviewer::new(a.clone(), self.ctx.clone())))
            .collect();

        tracing::info!(
            agents = agents.len(),
            passes = self.passes,
            parallelism = self.parallelism,
            mode = ?self.mode,
            "starting review fan-out"
        );

        let collected = match self.mode {
            ExecutionMode::Tasks => {
                self.run_tasks(&reviewers, target, semaphore, deadline).await
            }
            ExecutionMode::Structured => {
                self.run_structured(&reviewers, target, semaphore, deadline)
                    .await
            }
        };

        let mut per_agent: HashMap<String, Vec<PassResult>> = HashMap::new();
        for pass_result in collected {
            per_agent
                .entry(pass_result.agent_name.clone())
                .or_default()
                .push(pass_result);
        }

        let results: Vec<AgentResult> = agents
            .iter()
            .map(|agent| {
                merge_agent_passes(&agent.name, per_agent.remove(&agent.name).unwrap_or_default())
            })
            .collect();

        let successful = results.iter().filter(|r| r.success).count();
        tracing::info!(
            total = results.len(),
            successful,
            failed = results.len() - successful,
            "review fan-out complete"
        );
        Ok(results)
    }

    /// Task-pool mode: every pass is a spawned task aborted on deadline.
    async fn run_tasks(
        &self,
        reviewers: &[Arc<AgentReviewer>],
        target: &ReviewTarget,
        semaphore: Arc<Semaphore>,
        deadline: Instant,
    ) -> Vec<PassResult> {
        let mut tasks: JoinSet<PassResult> = JoinSet::new();

        for reviewer in reviewers {
            for pass in 1..=self.passes {
                let reviewer = reviewer.clone();
                let target = target.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("review semaphore closed");
                    reviewer.run_pass(&target, pass).await
                });
            }
        }

        let mut collected = Vec::with_capacity(tasks.len());
        loop {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::error!("orchestrator timeout reached; aborting in-flight passes");
                    tasks.abort_all();
                    break;
                }
            };
            match joined {
                Some(Ok(pass_result)) => {
                    self.observe(&pass_result);
                    collected.push(pass_result);
                }
                Some(Err(join_error)) if join_error.is_cancelled() => {}
                Some(Err(join_error)) => {
                    tracing::error!(error = %join_error, "review task panicked");
                }
                None => break,
            }
        }
        collected
    }

    /// Structured mode: all passes run as futures owned by this call; dropping
    /// the set on deadline cancels every child as a group, which in turn drops
    /// and cancels any open sessions.
    async fn run_structured(
        &self,
        reviewers: &[Arc<AgentReviewer>],
        target: &ReviewTarget,
        semaphore: Arc<Semaphore>,
        deadline: Instant,
    ) -> Vec<PassResult> {
        let mut futures = FuturesUnordered::new();
        for reviewer in reviewers {
            for pass in 1..=self.passes {
                let reviewer = reviewer.clone();
                let semaphore = semaphore.clone();
                futures.push(async move {
                    let _permit = semaphore.acquire().await.expect("review semaphore closed");
                    reviewer.run_pass(target, pass).await
                });
            }
        }

        let mut collected = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, futures.next()).await {
                Ok(Some(pass_result)) => {
                    self.observe(&pass_result);
                    collected.push(pass_result);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::error!("orchestrator timeout reached; cancelling pass group");
                    break;
                }
            }
        }
        collected
    }
}
