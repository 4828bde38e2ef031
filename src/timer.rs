//! Cancellable one-shot timer for delays longer than a single platform timer.
//!
//! The delay is consumed in segments of at most [`MAX_SEGMENT`]; after each
//! segment the remainder is re-armed. An `active` flag is checked right before
//! the callback runs, so a cancelled timer never fires even if its last
//! segment already elapsed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;
use uuid::Uuid;

/// Longest single sleep, the largest signed 32-bit millisecond count.
pub const MAX_SEGMENT: Duration = Duration::from_millis(2_147_483_647);

#[derive(Debug)]
pub struct ExtendedTimeout {
    id: Uuid,
    label: String,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ExtendedTimeout {
    /// Run `callback` once after `delay` unless cancelled first.
    pub fn spawn<F, Fut>(delay: Duration, label: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_segment(delay, MAX_SEGMENT, label, callback)
    }

    pub fn spawn_with_segment<F, Fut>(
        delay: Duration,
        segment: Duration,
        label: impl Into<String>,
        callback: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let label = label.into();
        let active = Arc::new(AtomicBool::new(true));
        let segment = segment.max(Duration::from_millis(1));

        let task_active = active.clone();
        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut remaining = delay;
            loop {
                let step = remaining.min(segment);
                tokio::time::sleep(step).await;
                remaining -= step;
                if remaining.is_zero() {
                    break;
                }
                trace!(label = %task_label, remaining_ms = remaining.as_millis() as u64, "re-arming timeout");
            }
            // Claim the callback; a concurrent cancel loses or wins atomically.
            if task_active.swap(false, Ordering::SeqCst) {
                callback().await;
            }
        });

        Self {
            id,
            label,
            active,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `true` until the timer fires or is cancelled.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Prevent the callback from running. Safe to call any number of times;
    /// a callback that already started is left to finish.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(c: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let c = c.clone();
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_chained_segments() {
        let fired = counter();
        let t = ExtendedTimeout::spawn_with_segment(
            Duration::from_millis(250),
            Duration::from_millis(100),
            "chained",
            bump(&fired),
        );
        tokio::time::sleep(Duration::from_millis(249)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(t.is_active());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!t.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn honors_delays_beyond_one_segment() {
        let fired = counter();
        let delay = MAX_SEGMENT * 2 + Duration::from_millis(5);
        let _t = ExtendedTimeout::spawn(delay, "long", bump(&fired));

        tokio::time::sleep(MAX_SEGMENT * 2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_prevents_firing() {
        let fired = counter();
        let t = ExtendedTimeout::spawn_with_segment(
            Duration::from_millis(300),
            Duration::from_millis(100),
            "cancelled",
            bump(&fired),
        );
        // Cancel mid-chain.
        tokio::time::sleep(Duration::from_millis(150)).await;
        t.cancel();
        t.cancel();
        assert!(!t.is_active());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        t.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_can_still_be_cancelled_before_running() {
        let fired = counter();
        let t = ExtendedTimeout::spawn(Duration::ZERO, "immediate", bump(&fired));
        t.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
