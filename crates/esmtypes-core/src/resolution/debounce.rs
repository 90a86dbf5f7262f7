//! Trailing-edge debouncer.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

/// Coalesces bursts of triggers into one call of an action.
///
/// The action runs once the window has passed with no further trigger.
/// Dropping the debouncer flushes a pending call and stops the task.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Spawn the timer task on `handle`.
    pub fn spawn<F>(handle: &Handle, window: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        handle.spawn(async move {
            // Idle until the first trigger of a burst
            while rx.recv().await.is_some() {
                let mut coalesced = 1usize;
                let closed = loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(())) => coalesced += 1,
                        Ok(None) => break true,
                        Err(_) => break false,
                    }
                };
                debug!(coalesced, "Debounce window elapsed");
                action();
                if closed {
                    break;
                }
            }
        });

        Self { tx }
    }

    /// Restart the quiet window.
    pub fn trigger(&self) {
        // A closed channel means the runtime is gone; nothing left to notify
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(window: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let debouncer = Debouncer::spawn(&Handle::current(), window, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_on_trailing_edge() {
        let (debouncer, fired) = counting(Duration::from_millis(300));

        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (debouncer, fired) = counting(Duration::from_millis(50));

        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.trigger();
        debouncer.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_trigger_never_fires() {
        let (_debouncer, fired) = counting(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
