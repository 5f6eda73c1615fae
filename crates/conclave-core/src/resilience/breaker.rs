use crate::constants::resilience as defaults;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Operation classes with independent breaker instances and retry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Review,
    Summary,
    Skill,
}

impl OpClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Summary => "summary",
            Self::Skill => "skill",
        }
    }
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED before the circuit opens.
    pub threshold: u32,
    /// Base open duration before a half-open probe is admitted.
    pub open_duration: Duration,
    /// Multiplier applied to the open duration per consecutive half-open failure.
    pub extension_factor: f64,
    /// Ceiling on the extended open duration.
    pub open_cap: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::DEFAULT_FAILURE_THRESHOLD,
            open_duration: Duration::from_secs(defaults::DEFAULT_OPEN_SECONDS),
            extension_factor: defaults::OPEN_EXTENSION_FACTOR,
            open_cap: Duration::from_secs(defaults::OPEN_DURATION_CAP_SECS),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_failures: u32,
    probe_inflight: bool,
}

/// Per-operation-class circuit breaker. `admit` and `record` are separate so
/// the caller classifies its own failure before updating state. All
/// transitions happen under the per-instance lock.
pub struct CircuitBreaker {
    class: OpClass,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(class: OpClass, config: BreakerConfig) -> Self {
        Self {
            class,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_failures: 0,
                probe_inflight: false,
            }),
        }
    }

    pub fn class(&self) -> OpClass {
        self.class
    }

    /// Whether a call may proceed. While OPEN this fails fast; once the open
    /// duration has elapsed exactly one probe is admitted.
    pub fn admit(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let open_for = self.open_duration_for(inner.half_open_failures);
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= open_for {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_inflight = true;
                    tracing::debug!(class = %self.class, "circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_inflight {
                    false
                } else {
                    inner.probe_inflight = true;
                    true
                }
            }
        }
    }

    /// Report the outcome of an admitted call.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                if success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        inner.consecutive_failures = 0;
                        tracing::warn!(class = %self.class, "circuit opened");
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_inflight = false;
                if success {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_failures = 0;
                    inner.opened_at = None;
                    tracing::info!(class = %self.class, "circuit closed after successful probe");
                } else {
                    inner.half_open_failures += 1;
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        class = %self.class,
                        extensions = inner.half_open_failures,
                        "probe failed, circuit re-opened"
                    );
                }
            }
            // A result arriving while OPEN (raced past a rejection) cannot
            // change state.
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    fn open_duration_for(&self, half_open_failures: u32) -> Duration {
        let factor = self.config.extension_factor.powi(half_open_failures as i32);
        let extended = self.config.open_duration.mul_f64(factor.max(1.0));
        extended.min(self.config.open_cap)
    }
}

/// All breaker instances of one process, keyed by operation class. Carried
/// through the `ReviewContext` rather than living in a global.
pub struct BreakerRegistry {
    review: CircuitBreaker,
    summary: CircuitBreaker,
    skill: CircuitBreaker,
}

impl BreakerRegistry {
    pub fn new(review: BreakerConfig, summary: BreakerConfig, skill: BreakerConfig) -> Self {
        Self {
            review: CircuitBreaker::new(OpClass::Review, review),
            summary: CircuitBreaker::new(OpClass::Summary, summary),
            skill: CircuitBreaker::new(OpClass::Skill, skill),
        }
    }

    pub fn for_class(&self, class: OpClass) -> &CircuitBreaker {
        match class {
            OpClass::Review => &self.review,
            OpClass::Summary => &self.summary,
            OpClass::Skill => &self.skill,
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(
            BreakerConfig::default(),
            BreakerConfig::default(),
            BreakerConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(threshold: u32, open_ms: u64) -> BreakerConfig {
        BreakerConfig {
            threshold,
            open_duration: Duration::from_millis(open_ms),
            extension_factor: 2.0,
            open_cap: Duration::from_millis(open_ms * 8),
        }
    }

    #[test]
    fn closed_success_resets_count() {
        let cb = CircuitBreaker::new(OpClass::Review, fast_config(2, 50));
        assert!(cb.admit());
        cb.record(false);
        assert!(cb.admit());
        cb.record(true);
        // The earlier failure no longer counts toward the threshold.
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new(OpClass::Review, fast_config(2, 5000));
        cb.record(false);
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.admit());
    }

    #[test]
    fn admits_single_probe_after_open_duration() {
        let cb = CircuitBreaker::new(OpClass::Review, fast_config(1, 10));
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.admit());
        // Second caller is rejected while the probe is in flight.
        assert!(!cb.admit());
        cb.record(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn probe_failure_extends_open_duration() {
        let cb = CircuitBreaker::new(OpClass::Review, fast_config(1, 20));
        cb.record(false);
        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.admit());
        cb.record(false);
        assert_eq!(cb.state(), CircuitState::Open);
        // Base duration has elapsed but the extended one has not.
        std::thread::sleep(Duration::from_millis(25));
        assert!(!cb.admit());
    }
}
