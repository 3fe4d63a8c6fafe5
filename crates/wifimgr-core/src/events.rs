//! Driver-originated events and their dispatcher.
//!
//! Driver callbacks never touch manager state. They push a [`WifiEvent`] into
//! an [`EventSink`]; a single dispatcher task drains the channel and calls
//! [`EventDispatcher::publish`], which fans the event out to every subscriber
//! of its kind in subscription order.
//!
//! Persistent and one-shot subscriptions live in separate collections. A
//! one-shot callback is an `FnOnce` and is moved out of the registry before it
//! runs, so it can neither run twice nor linger after a failed invocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, WifiMgrError};
use crate::timer::Expiry;
use crate::types::{MacAddr, ScanEntry};

/// Event kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ScanResult,
    ScanDone,
    Connect,
    Disconnect,
    NewStation,
    ApFailure,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::ScanResult => "scan_result",
            EventKind::ScanDone => "scan_done",
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::NewStation => "new_station",
            EventKind::ApFailure => "ap_failure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed driver notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WifiEvent {
    /// One discovered network.
    ScanResult(ScanEntry),
    /// End of a scan; `result` is 0 or a negative error number.
    ScanDone { result: i32 },
    /// Outcome of a connect attempt; `status` is 0 on success.
    Connect { status: i32 },
    /// Link loss, solicited or not.
    Disconnect { reason: i32 },
    /// A client joined (`connected`) or left the SoftAP.
    NewStation { connected: bool, mac: MacAddr },
    /// The SoftAP went down on its own.
    ApFailure { reason: i32 },
}

impl WifiEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WifiEvent::ScanResult(_) => EventKind::ScanResult,
            WifiEvent::ScanDone { .. } => EventKind::ScanDone,
            WifiEvent::Connect { .. } => EventKind::Connect,
            WifiEvent::Disconnect { .. } => EventKind::Disconnect,
            WifiEvent::NewStation { .. } => EventKind::NewStation,
            WifiEvent::ApFailure { .. } => EventKind::ApFailure,
        }
    }
}

/// An event on its way to the dispatcher. Timer expiries remember which
/// arming they belong to.
#[derive(Debug)]
struct Posted {
    event: WifiEvent,
    expiry: Option<Expiry>,
}

impl Posted {
    /// The event, unless it is the expiry of a timer cancelled since.
    fn into_live(self) -> Option<WifiEvent> {
        match &self.expiry {
            Some(expiry) if !expiry.is_current() => {
                tracing::debug!(event = %self.event.kind(), "stale timer expiry discarded");
                None
            }
            _ => Some(self.event),
        }
    }
}

/// Sending half of the event channel, handed to driver callbacks and timers.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Posted>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventReceiver { rx })
    }

    /// Queue an event for delivery. Returns `false` once the manager is gone.
    pub fn notify(&self, event: WifiEvent) -> bool {
        self.post(Posted {
            event,
            expiry: None,
        })
    }

    /// Queue the expiry event of a timer. It is dropped on receipt if the
    /// timer was cancelled or re-armed in the meantime.
    pub(crate) fn notify_expiry(&self, event: WifiEvent, expiry: Expiry) -> bool {
        self.post(Posted {
            event,
            expiry: Some(expiry),
        })
    }

    fn post(&self, posted: Posted) -> bool {
        let kind = posted.event.kind();
        match self.tx.send(posted) {
            Ok(()) => {
                tracing::trace!(event = %kind, "event queued");
                true
            }
            Err(_) => {
                tracing::debug!(event = %kind, "event dropped, dispatcher closed");
                false
            }
        }
    }
}

/// Receiving half of the event channel. Skips stale timer expiries.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Posted>,
}

impl EventReceiver {
    /// Next live event, or `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<WifiEvent> {
        while let Some(posted) = self.rx.recv().await {
            if let Some(event) = posted.into_live() {
                return Some(event);
            }
        }
        None
    }

    pub fn try_recv(&mut self) -> std::result::Result<WifiEvent, mpsc::error::TryRecvError> {
        loop {
            if let Some(event) = self.rx.try_recv()?.into_live() {
                return Ok(event);
            }
        }
    }
}

/// Identifies who registered a subscription.
pub type Owner = &'static str;

/// Callback of a persistent subscription.
pub type EventCallback = Arc<dyn Fn(&WifiEvent) -> Result<()> + Send + Sync>;

/// Callback of a one-shot subscription.
pub type OneShotCallback = Box<dyn FnOnce(&WifiEvent) -> Result<()> + Send>;

struct Persistent {
    seq: u64,
    owner: Owner,
    callback: EventCallback,
}

struct OneShot {
    seq: u64,
    owner: Owner,
    callback: OneShotCallback,
}

#[derive(Default)]
struct Subscriptions {
    persistent: HashMap<EventKind, Vec<Persistent>>,
    one_shot: HashMap<EventKind, Vec<OneShot>>,
    next_seq: u64,
}

impl Subscriptions {
    fn contains(&self, kind: EventKind, owner: Owner) -> bool {
        self.persistent
            .get(&kind)
            .is_some_and(|subs| subs.iter().any(|s| s.owner == owner))
            || self
                .one_shot
                .get(&kind)
                .is_some_and(|subs| subs.iter().any(|s| s.owner == owner))
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Invocation scheduled by one publish, in subscription order.
enum Delivery {
    Persistent(u64, Owner, EventCallback),
    OneShot(u64, Owner, OneShotCallback),
}

impl Delivery {
    fn seq(&self) -> u64 {
        match self {
            Delivery::Persistent(seq, ..) | Delivery::OneShot(seq, ..) => *seq,
        }
    }
}

/// Publish/subscribe registry keyed by event kind.
///
/// The registry lock is only held while the subscriber list is read or
/// changed, never while a callback runs, so callbacks may subscribe and
/// unsubscribe freely.
#[derive(Default)]
pub struct EventDispatcher {
    subs: Mutex<Subscriptions>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a persistent subscription, delivered once per published event of
    /// `kind` until removed.
    pub fn subscribe<F>(&self, kind: EventKind, owner: Owner, callback: F) -> Result<()>
    where
        F: Fn(&WifiEvent) -> Result<()> + Send + Sync + 'static,
    {
        let mut subs = self.subs.lock();
        if subs.contains(kind, owner) {
            return Err(already_registered(kind, owner));
        }
        let seq = subs.next_seq();
        subs.persistent.entry(kind).or_default().push(Persistent {
            seq,
            owner,
            callback: Arc::new(callback),
        });
        tracing::debug!(event = %kind, owner, "subscribed");
        Ok(())
    }

    /// Add a one-shot subscription, removed right after its first delivery.
    pub fn subscribe_once<F>(&self, kind: EventKind, owner: Owner, callback: F) -> Result<()>
    where
        F: FnOnce(&WifiEvent) -> Result<()> + Send + 'static,
    {
        let mut subs = self.subs.lock();
        if subs.contains(kind, owner) {
            return Err(already_registered(kind, owner));
        }
        let seq = subs.next_seq();
        subs.one_shot.entry(kind).or_default().push(OneShot {
            seq,
            owner,
            callback: Box::new(callback),
        });
        tracing::debug!(event = %kind, owner, "subscribed once");
        Ok(())
    }

    /// Remove the subscription of `owner` for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, owner: Owner) -> Result<()> {
        let mut subs = self.subs.lock();
        let mut removed = false;
        if let Some(list) = subs.persistent.get_mut(&kind) {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed |= list.len() != before;
        }
        if let Some(list) = subs.one_shot.get_mut(&kind) {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed |= list.len() != before;
        }
        if removed {
            tracing::debug!(event = %kind, owner, "unsubscribed");
            Ok(())
        } else {
            Err(WifiMgrError::NotFound(format!("{owner} subscription to {kind}")))
        }
    }

    /// Remove every subscription for `kind`. Returns how many were removed.
    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        let mut subs = self.subs.lock();
        let persistent = subs.persistent.remove(&kind).map_or(0, |l| l.len());
        let one_shot = subs.one_shot.remove(&kind).map_or(0, |l| l.len());
        persistent + one_shot
    }

    /// Remove every subscription of `owner`. Returns how many were removed.
    pub fn unsubscribe_owner(&self, owner: Owner) -> usize {
        let mut subs = self.subs.lock();
        let mut removed = 0;
        for list in subs.persistent.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed += before - list.len();
        }
        for list in subs.one_shot.values_mut() {
            let before = list.len();
            list.retain(|s| s.owner != owner);
            removed += before - list.len();
        }
        if removed > 0 {
            tracing::debug!(owner, removed, "owner unsubscribed");
        }
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let mut subs = self.subs.lock();
        subs.persistent.clear();
        subs.one_shot.clear();
    }

    pub fn is_subscribed(&self, kind: EventKind, owner: Owner) -> bool {
        self.subs.lock().contains(kind, owner)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let subs = self.subs.lock();
        subs.persistent.get(&kind).map_or(0, |l| l.len())
            + subs.one_shot.get(&kind).map_or(0, |l| l.len())
    }

    /// Deliver `event` to every current subscriber of its kind.
    ///
    /// Returns the number of callbacks invoked. Callback failures are logged
    /// and do not stop delivery to the remaining subscribers.
    pub fn publish(&self, event: &WifiEvent) -> usize {
        let kind = event.kind();
        let mut deliveries: Vec<Delivery> = {
            let mut subs = self.subs.lock();
            let mut deliveries: Vec<Delivery> = subs
                .persistent
                .get(&kind)
                .map(|list| {
                    list.iter()
                        .map(|s| Delivery::Persistent(s.seq, s.owner, s.callback.clone()))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(list) = subs.one_shot.remove(&kind) {
                deliveries.extend(
                    list.into_iter()
                        .map(|s| Delivery::OneShot(s.seq, s.owner, s.callback)),
                );
            }
            deliveries
        };

        if deliveries.is_empty() {
            tracing::trace!(event = %kind, "no subscribers");
            return 0;
        }
        deliveries.sort_by_key(Delivery::seq);

        let count = deliveries.len();
        for delivery in deliveries {
            let (owner, outcome) = match delivery {
                Delivery::Persistent(_, owner, callback) => (owner, callback(event)),
                Delivery::OneShot(_, owner, callback) => (owner, callback(event)),
            };
            if let Err(e) = outcome {
                tracing::warn!(event = %kind, owner, error = %e, "event callback failed");
            }
        }
        count
    }
}

fn already_registered(kind: EventKind, owner: Owner) -> WifiMgrError {
    WifiMgrError::AlreadyRegistered(format!("{owner} subscription to {kind}"))
}

/// Drain the event channel into the dispatcher until every sink is dropped.
pub async fn run_event_loop(dispatcher: Arc<EventDispatcher>, mut rx: EventReceiver) {
    tracing::debug!("event dispatcher started");
    while let Some(event) = rx.recv().await {
        let delivered = dispatcher.publish(&event);
        tracing::debug!(event = %event.kind(), delivered, "event published");
    }
    tracing::debug!("event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scan_done() -> WifiEvent {
        WifiEvent::ScanDone { result: 0 }
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.publish(&scan_done()), 0);
    }

    #[test]
    fn test_persistent_delivered_every_time() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher
            .subscribe(EventKind::ScanDone, "test", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        dispatcher.publish(&scan_done());
        dispatcher.publish(&scan_done());
        dispatcher.publish(&WifiEvent::Connect { status: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        dispatcher.unsubscribe(EventKind::ScanDone, "test").unwrap();
        dispatcher.publish(&scan_done());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_one_shot_removed_even_on_failure() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher
            .subscribe_once(EventKind::ScanDone, "test", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Err(WifiMgrError::invalid("boom"))
            })
            .unwrap();

        assert_eq!(dispatcher.publish(&scan_done()), 1);
        assert_eq!(dispatcher.publish(&scan_done()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.is_subscribed(EventKind::ScanDone, "test"));
    }

    #[test]
    fn test_duplicate_subscription_rejected() {
        let dispatcher = EventDispatcher::new();
        dispatcher
            .subscribe(EventKind::Connect, "sta", |_| Ok(()))
            .unwrap();
        let err = dispatcher
            .subscribe_once(EventKind::Connect, "sta", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, WifiMgrError::AlreadyRegistered(_)));
        // A different owner is fine.
        dispatcher
            .subscribe(EventKind::Connect, "app", |_| Ok(()))
            .unwrap();
        assert_eq!(dispatcher.subscriber_count(EventKind::Connect), 2);
    }

    #[test]
    fn test_delivery_follows_subscription_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        dispatcher
            .subscribe(EventKind::Disconnect, "first", move |_| {
                o.lock().push("first");
                Ok(())
            })
            .unwrap();
        let o = order.clone();
        dispatcher
            .subscribe_once(EventKind::Disconnect, "second", move |_| {
                o.lock().push("second");
                Ok(())
            })
            .unwrap();
        let o = order.clone();
        dispatcher
            .subscribe(EventKind::Disconnect, "third", move |_| {
                o.lock().push("third");
                Ok(())
            })
            .unwrap();

        dispatcher.publish(&WifiEvent::Disconnect { reason: 3 });
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_callback_may_resubscribe() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let d = dispatcher.clone();
        dispatcher
            .subscribe_once(EventKind::ScanDone, "chain", move |_| {
                d.subscribe_once(EventKind::ScanDone, "chain", |_| Ok(()))
            })
            .unwrap();

        dispatcher.publish(&scan_done());
        assert!(dispatcher.is_subscribed(EventKind::ScanDone, "chain"));
    }

    #[test]
    fn test_unsubscribe_owner() {
        let dispatcher = EventDispatcher::new();
        dispatcher.subscribe(EventKind::NewStation, "ap", |_| Ok(())).unwrap();
        dispatcher.subscribe_once(EventKind::ApFailure, "ap", |_| Ok(())).unwrap();
        dispatcher.subscribe(EventKind::Disconnect, "sta", |_| Ok(())).unwrap();

        assert_eq!(dispatcher.unsubscribe_owner("ap"), 2);
        assert_eq!(dispatcher.unsubscribe_owner("ap"), 0);
        assert!(dispatcher.is_subscribed(EventKind::Disconnect, "sta"));
    }

    #[test]
    fn test_unsubscribe_all_of_kind() {
        let dispatcher = EventDispatcher::new();
        dispatcher.subscribe(EventKind::ScanDone, "sta", |_| Ok(())).unwrap();
        dispatcher.subscribe_once(EventKind::ScanDone, "app", |_| Ok(())).unwrap();
        dispatcher.subscribe(EventKind::Connect, "sta", |_| Ok(())).unwrap();

        assert_eq!(dispatcher.unsubscribe_all(EventKind::ScanDone), 2);
        assert_eq!(dispatcher.subscriber_count(EventKind::ScanDone), 0);
        assert_eq!(dispatcher.publish(&scan_done()), 0);
        assert!(dispatcher.is_subscribed(EventKind::Connect, "sta"));
    }

    #[test]
    fn test_unsubscribe_missing() {
        let dispatcher = EventDispatcher::new();
        assert!(matches!(
            dispatcher.unsubscribe(EventKind::ApFailure, "nobody"),
            Err(WifiMgrError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_event_loop_drains_sink() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher
            .subscribe(EventKind::NewStation, "test", move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let (sink, rx) = EventSink::channel();
        let task = tokio::spawn(run_event_loop(dispatcher.clone(), rx));
        assert!(sink.notify(WifiEvent::NewStation {
            connected: true,
            mac: MacAddr::new([2, 0, 0, 0, 0, 1]),
        }));
        drop(sink);
        task.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
