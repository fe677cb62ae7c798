use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a cancellable timed wait on a stop signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal fired before the timeout elapsed
    Signaled,
    /// The full timeout elapsed with the signal unset
    TimedOut,
    /// The wait primitive itself failed with the given code
    Error(i32),
}

/// Single-shot stop flag shared between the controller, the asynchronous
/// control handler and the maintenance loop. Setting is idempotent and
/// thread-safe; the flag is never cleared once set.
#[async_trait]
pub trait StopSignal: Send + Sync {
    fn set(&self);

    fn is_set(&self) -> bool;

    /// Waits until the signal is set or `timeout` elapses.
    async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome;
}

/// [`StopSignal`] backed by a [`CancellationToken`].
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StopSignal for CancellationSignal {
    fn set(&self) {
        self.token.cancel()
    }

    fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, self.token.cancelled()).await {
            Ok(_) => WaitOutcome::Signaled,
            Err(_) => WaitOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::signal::{CancellationSignal, StopSignal, WaitOutcome};
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_set());
        signal.set();
        signal.set();
        assert!(signal.is_set());
        assert_eq!(
            signal.wait_timeout(Duration::from_secs(60)).await,
            WaitOutcome::Signaled
        );
    }

    #[tokio::test]
    async fn test_wait_times_out_when_unset() {
        let signal = CancellationSignal::new();
        assert_eq!(
            signal.wait_timeout(Duration::from_millis(20)).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_set_during_wait_wakes_waiter() {
        let signal = CancellationSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait_timeout(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.set();
        assert_eq!(handle.await.unwrap(), WaitOutcome::Signaled);
    }
}
