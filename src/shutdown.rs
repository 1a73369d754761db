//! Stop signal shared between a [`StateContext`](crate::StateContext) and
//! its driver task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

/// Cloneable stop flag with an async wait.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Idempotent.
    pub fn signal(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("State runtime shutting down");
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        // Register before checking the flag, or a signal landing in between is lost.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_returns_after_signal() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.wait().await });

        handle.signal();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter finished")
            .expect("task ok");
        assert!(handle.is_shutting_down());
    }

    #[tokio::test]
    async fn wait_after_signal_returns_immediately() {
        let handle = ShutdownHandle::new();
        handle.signal();
        handle.signal();
        handle.wait().await;
    }
}
