use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Token for cooperative cancellation of a run.
///
/// Clone is cheap and shares state. Cancelling wakes any thread blocked
/// in [`CancelToken::wait`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Create a new cancellation token (not cancelled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        *self.flag() = true;
        self.inner.1.notify_all();
    }

    /// Block for up to `timeout`. Returns true if the token was cancelled
    /// before or during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.flag();
        let (guard, _) = self
            .inner
            .1
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
