use crate::constants::{collection, resilience, scheduling, summary};
use crate::resilience::{BreakerConfig, BreakerRegistry, OpClass, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Run configuration, layered: CLI flags > environment > config file >
/// built-in defaults. The CLI applies its flags after `load()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub parallelism: usize,
    pub review_passes: usize,
    pub orchestrator_timeout_secs: u64,
    pub agent_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub summary_timeout_secs: u64,
    pub max_retries: u32,
    pub resilience: ResilienceSettings,
    pub summary: SummarySettings,
    pub local_files: LocalFileSettings,
    pub feature_flags: FeatureFlags,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub review: OpResilience,
    pub summary: OpResilience,
    pub skill: OpResilience,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpResilience {
    pub threshold: u32,
    pub open_seconds: u64,
    /// Overrides the top-level `max_retries` for this class when set.
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for OpResilience {
    fn default() -> Self {
        Self {
            threshold: resilience::DEFAULT_FAILURE_THRESHOLD,
            open_seconds: resilience::DEFAULT_OPEN_SECONDS,
            max_attempts: None,
            backoff_base_ms: resilience::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: resilience::DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub max_content_per_agent: usize,
    pub max_total_prompt_content: usize,
    pub fallback_excerpt_length: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            max_content_per_agent: summary::DEFAULT_MAX_CONTENT_PER_AGENT,
            max_total_prompt_content: summary::DEFAULT_MAX_TOTAL_PROMPT_CONTENT,
            fallback_excerpt_length: summary::DEFAULT_FALLBACK_EXCERPT_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFileSettings {
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for LocalFileSettings {
    fn default() -> Self {
        Self {
            max_file_size: collection::DEFAULT_MAX_FILE_SIZE,
            max_total_size: collection::DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub structured_concurrency: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: scheduling::DEFAULT_PARALLELISM,
            review_passes: scheduling::DEFAULT_REVIEW_PASSES,
            orchestrator_timeout_secs: scheduling::DEFAULT_ORCHESTRATOR_TIMEOUT_SECS,
            agent_timeout_secs: scheduling::DEFAULT_AGENT_TIMEOUT_SECS,
            idle_timeout_secs: scheduling::DEFAULT_IDLE_TIMEOUT_SECS,
            summary_timeout_secs: scheduling::DEFAULT_SUMMARY_TIMEOUT_SECS,
            max_retries: scheduling::DEFAULT_MAX_RETRIES,
            resilience: ResilienceSettings::default(),
            summary: SummarySettings::default(),
            local_files: LocalFileSettings::default(),
            feature_flags: FeatureFlags::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conclave")
            .join("config.toml")
    }

    /// Built-in defaults overlaid with the config file, then the environment.
    pub fn load() -> Self {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        let mut settings = if config_path.exists() {
            match std::fs::read_to_string(&config_path)
                .map_err(|e| e.to_string())
                .and_then(|c| toml::from_str(&c).map_err(|e| e.to_string()))
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        path = %config_path.display(),
                        "config file unreadable ({e}); using defaults"
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        settings.apply_env();
        settings
    }

    /// `CONCLAVE_*` overrides, nested keys joined with underscores.
    pub fn apply_env(&mut self) {
        macro_rules! env_override {
            ($field:expr, $name:literal) => {
                if let Some(v) = env_parse($name) {
                    $field = v;
                }
            };
        }

        env_override!(self.parallelism, "CONCLAVE_PARALLELISM");
        env_override!(self.review_passes, "CONCLAVE_REVIEW_PASSES");
        env_override!(
            self.orchestrator_timeout_secs,
            "CONCLAVE_ORCHESTRATOR_TIMEOUT_SECS"
        );
        env_override!(self.agent_timeout_secs, "CONCLAVE_AGENT_TIMEOUT_SECS");
        env_override!(self.idle_timeout_secs, "CONCLAVE_IDLE_TIMEOUT_SECS");
        env_override!(self.summary_timeout_secs, "CONCLAVE_SUMMARY_TIMEOUT_SECS");
        env_override!(self.max_retries, "CONCLAVE_MAX_RETRIES");
        env_override!(
            self.summary.max_content_per_agent,
            "CONCLAVE_SUMMARY_MAX_CONTENT_PER_AGENT"
        );
        env_override!(
            self.summary.max_total_prompt_content,
            "CONCLAVE_SUMMARY_MAX_TOTAL_PROMPT_CONTENT"
        );
        env_override!(
            self.summary.fallback_excerpt_length,
            "CONCLAVE_SUMMARY_FALLBACK_EXCERPT_LENGTH"
        );
        env_override!(self.local_files.max_file_size, "CONCLAVE_LOCAL_FILES_MAX_FILE_SIZE");
        env_override!(
            self.local_files.max_total_size,
            "CONCLAVE_LOCAL_FILES_MAX_TOTAL_SIZE"
        );
        env_override!(
            self.feature_flags.structured_concurrency,
            "CONCLAVE_STRUCTURED_CONCURRENCY"
        );

        Self::apply_op_env(&mut self.resilience.review, "CONCLAVE_RESILIENCE_REVIEW");
        Self::apply_op_env(&mut self.resilience.summary, "CONCLAVE_RESILIENCE_SUMMARY");
        Self::apply_op_env(&mut self.resilience.skill, "CONCLAVE_RESILIENCE_SKILL");
    }

    fn apply_op_env(op: &mut OpResilience, prefix: &str) {
        if let Some(v) = env_parse(&format!("{prefix}_THRESHOLD")) {
            op.threshold = v;
        }
        if let Some(v) = env_parse(&format!("{prefix}_OPEN_SECONDS")) {
            op.open_seconds = v;
        }
        if let Some(v) = env_parse(&format!("{prefix}_MAX_ATTEMPTS")) {
            op.max_attempts = Some(v);
        }
        if let Some(v) = env_parse(&format!("{prefix}_BACKOFF_BASE_MS")) {
            op.backoff_base_ms = v;
        }
        if let Some(v) = env_parse(&format!("{prefix}_BACKOFF_CAP_MS")) {
            op.backoff_cap_ms = v;
        }
    }

    fn op_resilience(&self, class: OpClass) -> &OpResilience {
        match class {
            OpClass::Review => &self.resilience.review,
            OpClass::Summary => &self.resilience.summary,
            OpClass::Skill => &self.resilience.skill,
        }
    }

    pub fn retry_policy(&self, class: OpClass) -> RetryPolicy {
        let op = self.op_resilience(class);
        RetryPolicy {
            max_attempts: op.max_attempts.unwrap_or(self.max_retries),
            backoff_base: Duration::from_millis(op.backoff_base_ms),
            backoff_cap: Duration::from_millis(op.backoff_cap_ms),
        }
    }

    pub fn breaker_registry(&self) -> BreakerRegistry {
        let config_for = |op: &OpResilience| BreakerConfig {
            threshold: op.threshold,
            open_duration: Duration::from_secs(op.open_seconds),
            extension_factor: resilience::OPEN_EXTENSION_FACTOR,
            open_cap: Duration::from_secs(resilience::OPEN_DURATION_CAP_SECS),
        };
        BreakerRegistry::new(
            config_for(&self.resilience.review),
            config_for(&self.resilience.summary),
            config_for(&self.resilience.skill),
        )
    }

    pub fn orchestrator_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }
}
