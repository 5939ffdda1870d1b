//! Receive event: the blocking-wait primitive bound to a started channel.
//!
//! Auto-reset semantics: a `signal()` with nobody waiting is remembered and
//! consumed by the next `wait()`. `destroy()` fails current and future waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// How long a receive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Do not block.
    Poll,
    After(Duration),
    Forever,
}

impl Timeout {
    /// Millisecond sentinel meaning "wait indefinitely".
    pub const INFINITE_MS: u16 = 65535;

    /// Map a millisecond count: 0 polls, 65535 waits forever.
    pub fn from_millis(ms: u16) -> Self {
        match ms {
            0 => Timeout::Poll,
            Self::INFINITE_MS => Timeout::Forever,
            ms => Timeout::After(Duration::from_millis(u64::from(ms))),
        }
    }

    pub fn is_poll(self) -> bool {
        matches!(self, Timeout::Poll)
    }
}

/// Outcome of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
    /// The event was destroyed.
    Failed,
}

#[derive(Debug, Default)]
pub struct ReceiveEvent {
    notify: Notify,
    closed: AtomicBool,
}

impl ReceiveEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake one waiter, or the next one to arrive.
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Fail every pending and future wait.
    pub fn destroy(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_destroyed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn wait(&self, timeout: Timeout) -> WaitOutcome {
        let notified = self.notify.notified();
        if self.is_destroyed() {
            return WaitOutcome::Failed;
        }
        let signaled = match timeout {
            Timeout::Poll => false,
            Timeout::Forever => {
                notified.await;
                true
            }
            Timeout::After(limit) => tokio::time::timeout(limit, notified).await.is_ok(),
        };
        if self.is_destroyed() {
            WaitOutcome::Failed
        } else if signaled {
            WaitOutcome::Signaled
        } else {
            WaitOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn timeout_sentinels() {
        assert_eq!(Timeout::from_millis(0), Timeout::Poll);
        assert_eq!(Timeout::from_millis(65535), Timeout::Forever);
        assert_eq!(
            Timeout::from_millis(100),
            Timeout::After(Duration::from_millis(100))
        );
        assert!(Timeout::Poll.is_poll());
    }

    #[tokio::test]
    async fn signal_before_wait_is_remembered() {
        let event = ReceiveEvent::new();
        event.signal();
        assert_eq!(
            event.wait(Timeout::After(Duration::from_millis(10))).await,
            WaitOutcome::Signaled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let event = ReceiveEvent::new();
        assert_eq!(
            event.wait(Timeout::After(Duration::from_millis(50))).await,
            WaitOutcome::TimedOut
        );
        assert_eq!(event.wait(Timeout::Poll).await, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn signal_wakes_pending_waiter() {
        let event = Arc::new(ReceiveEvent::new());
        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.wait(Timeout::Forever).await })
        };
        tokio::task::yield_now().await;
        event.signal();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Signaled);
    }

    #[tokio::test]
    async fn destroy_fails_waiters() {
        let event = Arc::new(ReceiveEvent::new());
        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.wait(Timeout::Forever).await })
        };
        tokio::task::yield_now().await;
        event.destroy();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Failed);
        assert_eq!(event.wait(Timeout::Forever).await, WaitOutcome::Failed);
    }
}
