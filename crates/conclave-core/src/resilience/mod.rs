mod breaker;
mod retry;
mod watchdog;

pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, OpClass};
pub use retry::{equal_jitter, retry_with_backoff, RetryPolicy};
pub use watchdog::{Watchdog, WatchdogScheduler};
