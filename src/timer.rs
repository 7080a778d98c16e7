//! Restartable single-shot timers.
//!
//! A [`DelayedAction`] owns at most one armed instance. Re-arming requires
//! the previous instance to be cancelled *and* joined first, so a superseded
//! timer can never fire after its replacement was started.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TimerError;

#[derive(Debug)]
pub struct DelayedAction {
    name: &'static str,
    armed: Option<Armed>,
}

#[derive(Debug)]
struct Armed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DelayedAction {
    pub fn new(name: &'static str) -> Self {
        Self { name, armed: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `action` once `delay` has elapsed unless cancelled first.
    /// Cancellation also interrupts an action that is still in flight.
    pub fn start<F>(&mut self, delay: Duration, action: F) -> Result<(), TimerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return Err(TimerError::AlreadyRunning(self.name));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!(timer = name, "timer cancelled"),
                _ = async {
                    sleep(delay).await;
                    debug!(timer = name, "timer fired");
                    action.await;
                } => {}
            }
        });
        debug!(timer = name, ?delay, "timer armed");
        self.armed = Some(Armed { cancel, handle });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|armed| !armed.handle.is_finished())
    }

    /// Request a stop. Idempotent.
    pub fn cancel(&self) {
        if let Some(armed) = &self.armed {
            armed.cancel.cancel();
        }
    }

    /// Wait until the armed instance has exited. Returns `false` when it had
    /// to be aborted because `limit` elapsed first.
    pub async fn join(&mut self, limit: Duration) -> bool {
        let Some(mut armed) = self.armed.take() else {
            return true;
        };
        match timeout(limit, &mut armed.handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(timer = self.name, ?limit, "timer did not stop in time; aborting");
                armed.cancel.cancel();
                armed.handle.abort();
                let _ = armed.handle.await;
                false
            }
        }
    }

    pub async fn cancel_and_join(&mut self, limit: Duration) -> bool {
        self.cancel();
        self.join(limit).await
    }
}

impl Drop for DelayedAction {
    fn drop(&mut self) {
        if let Some(armed) = &self.armed {
            armed.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JOIN: Duration = Duration::from_secs(1);

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fires_once_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DelayedAction::new("test");
        timer.start(Duration::from_millis(50), counting(&fired)).unwrap();
        assert!(timer.is_running());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(timer.join(JOIN).await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DelayedAction::new("test");
        timer.start(Duration::from_millis(100), counting(&fired)).unwrap();
        assert!(timer.cancel_and_join(JOIN).await);
        timer.cancel();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rearming_a_live_timer_is_refused() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DelayedAction::new("power-off");
        timer.start(Duration::from_secs(60), counting(&fired)).unwrap();

        let err = timer
            .start(Duration::from_secs(60), counting(&fired))
            .unwrap_err();
        assert!(matches!(err, TimerError::AlreadyRunning("power-off")));

        assert!(timer.cancel_and_join(JOIN).await);
        timer.start(Duration::from_millis(10), counting(&fired)).unwrap();
        assert!(timer.join(JOIN).await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_without_arming_is_immediate() {
        let mut timer = DelayedAction::new("idle");
        assert!(timer.join(Duration::ZERO).await);
        timer.cancel();
        assert!(!timer.is_running());
    }
}
