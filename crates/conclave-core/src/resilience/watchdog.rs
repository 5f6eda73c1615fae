use crate::transport::CancelHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared scheduler handle for watchdog tasks. Once shut down, further arm
/// requests are refused and degrade to no-op watchdogs; a pass must never
/// fail only because its watchdog could not be armed.
pub struct WatchdogScheduler {
    shutdown: AtomicBool,
}

impl WatchdogScheduler {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for WatchdogScheduler {
    fn default() -> Self {
        Self::new()
    }
}

enum Signal {
    Touch,
    Disarm,
}

/// Armed idle watchdog for one transport session. `touch()` resets the idle
/// clock; if the idle window elapses untouched, the session's cancel handle
/// fires and `fired()` reports true.
pub struct Watchdog {
    tx: Option<mpsc::UnboundedSender<Signal>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    /// Arm a watchdog on the shared scheduler. A refused request (scheduler
    /// already shut down) yields a no-op handle; the per-attempt deadline is
    /// then the only safety net.
    pub fn arm(scheduler: &WatchdogScheduler, idle: Duration, cancel: CancelHandle) -> Self {
        let fired = Arc::new(AtomicBool::new(false));

        if scheduler.is_shutdown() {
            tracing::warn!(
                idle_ms = idle.as_millis() as u64,
                "watchdog scheduler unavailable; relying on the attempt deadline alone"
            );
            return Self { tx: None, fired };
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task_fired = fired.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(idle) => {
                        task_fired.store(true, Ordering::SeqCst);
                        cancel.cancel();
                        return;
                    }
                    signal = rx.recv() => match signal {
                        Some(Signal::Touch) => continue,
                        Some(Signal::Disarm) | None => return,
                    }
                }
            }
        });

        Self { tx: Some(tx), fired }
    }

    pub fn noop() -> Self {
        Self {
            tx: None,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reset the idle clock; called on every streamed progress event.
    pub fn touch(&self) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(Signal::Touch);
        }
    }

    /// Cancel a pending fire. Idempotent; safe on a no-op handle.
    pub fn disarm(&self) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(Signal::Disarm);
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_idle_window() {
        let scheduler = WatchdogScheduler::new();
        let cancel = CancelHandle::new();
        let wd = Watchdog::arm(&scheduler, Duration::from_millis(20), cancel.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(wd.fired());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn touch_defers_firing() {
        let scheduler = WatchdogScheduler::new();
        let cancel = CancelHandle::new();
        let wd = Watchdog::arm(&scheduler, Duration::from_millis(50), cancel.clone());

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            wd.touch();
        }
        assert!(!wd.fired());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn disarm_prevents_firing() {
        let scheduler = WatchdogScheduler::new();
        let cancel = CancelHandle::new();
        let wd = Watchdog::arm(&scheduler, Duration::from_millis(20), cancel.clone());
        wd.disarm();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!wd.fired());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_scheduler_yields_noop() {
        let scheduler = WatchdogScheduler::new();
        scheduler.shutdown();
        let cancel = CancelHandle::new();
        let wd = Watchdog::arm(&scheduler, Duration::from_millis(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!wd.fired());
        assert!(!cancel.is_cancelled());
        // touch/disarm on a no-op handle must not panic.
        wd.touch();
        wd.disarm();
    }
}
