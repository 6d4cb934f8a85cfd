use std::time::Duration;

use tokio::task::JoinHandle;

/// A cancellable one-shot timer.
///
/// Dropping or explicitly cancelling the timer aborts the underlying sleep
/// task before its callback fires. Callers are expected to arm a fresh timer
/// only after cancelling any previous one for the same purpose (e.g. on
/// every FSM state transition) — `OneShotTimer` itself does not track
/// "generations", it only guarantees that a cancelled timer cannot fire.
#[derive(Debug)]
pub struct OneShotTimer {
    handle: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    /// Schedule `callback` to run after `duration`. The callback runs on a
    /// spawned task; it must not block and should limit itself to posting
    /// an event back to the owning actor rather than mutating shared state
    /// directly.
    pub fn schedule<F>(duration: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            callback();
        });
        Self {
            handle: Some(handle),
        }
    }

    /// An already-cancelled timer, useful as a placeholder before the first
    /// real timer is armed.
    pub fn inert() -> Self {
        Self { handle: None }
    }

    /// Cancel the timer. Idempotent; safe to call on an inert timer.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_after_duration() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let _timer = OneShotTimer::schedule(Duration::from_millis(5), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_prevents_fire() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let mut timer = OneShotTimer::schedule(Duration::from_millis(20), move || {
            fired_clone.store(true, Ordering::SeqCst);
        });
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        {
            let _timer = OneShotTimer::schedule(Duration::from_millis(20), move || {
                fired_clone.store(true, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
