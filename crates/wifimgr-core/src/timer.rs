//! Operation timeout timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::WifiMgrError;
use crate::events::{EventSink, WifiEvent};

/// One arming of an [`OpTimer`]. Stale once the timer is cancelled or armed
/// again.
#[derive(Debug, Clone)]
pub struct Expiry {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl Expiry {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }
}

/// A one-shot timer that posts an event on expiry.
///
/// At most one expiry is pending at a time; arming again replaces the
/// previous one. An expiry event already queued when the timer is cancelled
/// is discarded by the event receiver. Dropping the timer cancels it.
#[derive(Debug, Default)]
pub struct OpTimer {
    pending: Option<(&'static str, JoinHandle<()>)>,
    generation: Arc<AtomicU64>,
}

impl OpTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `event` to `sink` once `after` has elapsed. Must be called from
    /// within a tokio runtime.
    pub fn arm(&mut self, label: &'static str, after: Duration, sink: EventSink, event: WifiEvent) {
        self.cancel();
        let expiry = Expiry {
            generation: self.generation.load(Ordering::Acquire),
            current: self.generation.clone(),
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let error = WifiMgrError::Timeout(label.to_string());
            tracing::warn!(after_ms = after.as_millis() as u64, error = %error, "operation timed out");
            sink.notify_expiry(event, expiry);
        });
        tracing::trace!(timer = label, after_ms = after.as_millis() as u64, "timer armed");
        self.pending = Some((label, handle));
    }

    /// Disarm the timer. Returns `true` if an expiry was still pending.
    pub fn cancel(&mut self) -> bool {
        self.generation.fetch_add(1, Ordering::AcqRel);
        match self.pending.take() {
            Some((label, handle)) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    tracing::trace!(timer = label, "timer cancelled");
                }
                pending
            }
            None => false,
        }
    }

    /// Whether an expiry is still pending.
    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    pub fn label(&self) -> Option<&'static str> {
        self.pending.as_ref().map(|(label, _)| *label)
    }
}

impl Drop for OpTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires() {
        let (sink, mut rx) = EventSink::channel();
        let mut timer = OpTimer::new();
        timer.arm("scan", Duration::from_secs(10), sink, WifiEvent::ScanDone { result: -110 });
        assert!(timer.is_armed());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(rx.recv().await, Some(WifiEvent::ScanDone { result: -110 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_is_silent() {
        let (sink, mut rx) = EventSink::channel();
        let mut timer = OpTimer::new();
        timer.arm("connect", Duration::from_secs(5), sink, WifiEvent::Connect { status: -110 });
        assert!(timer.cancel());
        assert!(!timer.is_armed());
        assert!(!timer.cancel());

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending() {
        let (sink, mut rx) = EventSink::channel();
        let mut timer = OpTimer::new();
        timer.arm("a", Duration::from_secs(1), sink.clone(), WifiEvent::ScanDone { result: 1 });
        timer.arm("b", Duration::from_secs(2), sink, WifiEvent::ScanDone { result: 2 });
        assert_eq!(timer.label(), Some("b"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(rx.recv().await, Some(WifiEvent::ScanDone { result: 2 }));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_queued_before_cancel_is_discarded() {
        let (sink, mut rx) = EventSink::channel();
        let mut timer = OpTimer::new();
        timer.arm("scan", Duration::from_secs(1), sink, WifiEvent::ScanDone { result: -110 });

        tokio::time::advance(Duration::from_secs(2)).await;
        while timer.is_armed() {
            tokio::task::yield_now().await;
        }
        // The expiry is in the channel; the completion wins the race.
        assert!(!timer.cancel());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_live_scan_done_is_published() {
        use crate::events::{run_event_loop, EventDispatcher, EventKind};

        let dispatcher = Arc::new(EventDispatcher::new());
        let results = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = results.clone();
        dispatcher
            .subscribe(EventKind::ScanDone, "app", move |event| {
                seen.lock().push(event.clone());
                Ok(())
            })
            .unwrap();

        let (sink, rx) = EventSink::channel();
        let mut timer = OpTimer::new();
        let expired = WifiEvent::ScanDone { result: -110 };
        timer.arm("scan", Duration::from_secs(1), sink.clone(), expired);
        tokio::time::advance(Duration::from_secs(2)).await;
        while timer.is_armed() {
            tokio::task::yield_now().await;
        }

        // The real completion lands right behind the expiry.
        assert!(sink.notify(WifiEvent::ScanDone { result: 0 }));
        timer.cancel();
        drop(sink);
        drop(timer);

        run_event_loop(dispatcher, rx).await;
        assert_eq!(results.lock().as_slice(), [WifiEvent::ScanDone { result: 0 }]);
    }
}
