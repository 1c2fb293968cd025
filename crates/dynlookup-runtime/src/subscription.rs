#![forbid(unsafe_code)]

//! Scoped subscriptions to external event sources.
//!
//! A model declares what it wants to listen to through
//! `Model::subscriptions()`. After each `update()` the runtime compares the
//! declared set against the running set by [`SubId`]: new ids are started,
//! missing ids are stopped and joined. Listening therefore begins exactly
//! when a model starts declaring a subscription and ends exactly when it
//! stops, with no manual add/remove pairs for the model to keep balanced.
//!
//! [`EventFeed`] is a broadcast source hosts publish into (for example
//! document-wide pointer releases). [`Listen`] is the subscription that
//! forwards a feed into the model while it is declared.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A unique identifier for a subscription.
///
/// Used by the runtime to track which subscriptions are active and
/// to deduplicate subscriptions across update cycles.
pub type SubId = u64;

/// How often a [`Listen`] loop re-checks its stop signal while idle.
const LISTEN_POLL: Duration = Duration::from_millis(5);

/// A subscription produces messages from an external event source.
///
/// Subscriptions run on background threads and send messages through
/// the provided channel. The runtime manages their lifecycle.
pub trait Subscription<M: Send + 'static>: Send {
    /// Unique identifier for deduplication.
    ///
    /// Subscriptions with the same ID are considered identical.
    fn id(&self) -> SubId;

    /// Start the subscription, sending messages through the channel.
    ///
    /// Called on a background thread. Implementations loop until the
    /// channel disconnects or the stop signal is raised, and release
    /// whatever they acquired before returning.
    fn run(&self, sender: mpsc::Sender<M>, stop: StopSignal);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signal for stopping a subscription.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Create a new stop signal pair (signal, trigger).
    pub(crate) fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Self {
            inner: inner.clone(),
        };
        let trigger = StopTrigger { inner };
        (signal, trigger)
    }

    /// Check if the stop signal has been triggered.
    pub fn is_stopped(&self) -> bool {
        let (flag, _) = &*self.inner;
        *lock(flag)
    }

    /// Wait for either the stop signal or a timeout.
    ///
    /// Returns `true` if stopped, `false` if timed out.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = lock(flag);
        let start = Instant::now();
        loop {
            if *stopped {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, duration - elapsed)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
    }
}

/// Trigger to stop a subscription from the runtime side.
pub(crate) struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopTrigger {
    pub(crate) fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *lock(flag) = true;
        cvar.notify_all();
    }
}

/// A running subscription handle.
pub(crate) struct RunningSubscription {
    pub(crate) id: SubId,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

impl RunningSubscription {
    /// Stop the subscription and join its thread.
    pub(crate) fn stop(mut self) {
        self.trigger.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RunningSubscription {
    fn drop(&mut self) {
        self.trigger.stop();
    }
}

/// Manages the lifecycle of subscriptions for a program.
pub(crate) struct SubscriptionManager<M: Send + 'static> {
    active: Vec<RunningSubscription>,
    sender: mpsc::Sender<M>,
}

impl<M: Send + 'static> SubscriptionManager<M> {
    /// Messages from every subscription are delivered through `sender`.
    pub(crate) fn new(sender: mpsc::Sender<M>) -> Self {
        Self {
            active: Vec::new(),
            sender,
        }
    }

    /// Start newly declared subscriptions and stop the ones no longer
    /// declared. Unchanged ids keep running.
    pub(crate) fn reconcile(&mut self, subscriptions: Vec<Box<dyn Subscription<M>>>) {
        let new_ids: HashSet<SubId> = subscriptions.iter().map(|s| s.id()).collect();
        let active_before = self.active.len();

        let mut remaining = Vec::new();
        for running in self.active.drain(..) {
            if new_ids.contains(&running.id) {
                remaining.push(running);
            } else {
                tracing::debug!(sub_id = running.id, "stopping subscription");
                running.stop();
            }
        }
        self.active = remaining;

        let mut active_ids: HashSet<SubId> = self.active.iter().map(|r| r.id).collect();
        for sub in subscriptions {
            let id = sub.id();
            if !active_ids.insert(id) {
                continue;
            }

            tracing::debug!(sub_id = id, "starting subscription");
            let (signal, trigger) = StopSignal::new();
            let sender = self.sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("subscription-{id}"))
                .spawn(move || sub.run(sender, signal));
            match spawned {
                Ok(handle) => self.active.push(RunningSubscription {
                    id,
                    trigger,
                    thread: Some(handle),
                }),
                Err(e) => {
                    active_ids.remove(&id);
                    tracing::error!(sub_id = id, error = %e, "failed to start subscription");
                }
            }
        }

        if self.active.len() != active_before {
            tracing::trace!(
                active_before,
                active_after = self.active.len(),
                "subscription reconcile complete"
            );
        }
    }

    pub(crate) fn active_ids(&self) -> Vec<SubId> {
        self.active.iter().map(|r| r.id).collect()
    }

    /// Stop all running subscriptions.
    pub(crate) fn stop_all(&mut self) {
        for running in self.active.drain(..) {
            running.stop();
        }
    }
}

impl<M: Send + 'static> Drop for SubscriptionManager<M> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

struct FeedListeners<T> {
    next_id: u64,
    listeners: Vec<(u64, mpsc::Sender<T>)>,
}

/// A broadcast source of host events.
///
/// Cloning shares the same listener set. Publishing delivers to every
/// registered listener; listeners whose receiving side is gone are pruned.
pub struct EventFeed<T> {
    inner: Arc<Mutex<FeedListeners<T>>>,
}

impl<T> Clone for EventFeed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for EventFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventFeed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T> EventFeed<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedListeners {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Number of listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    fn register(&self) -> (u64, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel();
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.push((id, tx));
        (id, rx)
    }

    fn unregister(&self, id: u64) {
        lock(&self.inner).listeners.retain(|(lid, _)| *lid != id);
    }
}

impl<T: Clone> EventFeed<T> {
    /// Deliver `event` to every listener. Returns how many received it.
    pub fn publish(&self, event: T) -> usize {
        let mut inner = lock(&self.inner);
        inner
            .listeners
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        inner.listeners.len()
    }
}

/// Forwards an [`EventFeed`] into the model while declared.
///
/// The listener is registered when the subscription starts and removed
/// before its thread exits, so [`EventFeed::listener_count`] drops back as
/// soon as the model stops declaring it.
pub struct Listen<T, M> {
    id: SubId,
    feed: EventFeed<T>,
    map: Box<dyn Fn(T) -> Option<M> + Send>,
}

impl<T, M> Listen<T, M> {
    /// Listen to `feed`, turning each event into a message with `map`.
    /// Events for which `map` returns `None` are dropped.
    pub fn new(id: SubId, feed: EventFeed<T>, map: impl Fn(T) -> Option<M> + Send + 'static) -> Self {
        Self {
            id,
            feed,
            map: Box::new(map),
        }
    }
}

impl<T: Send + 'static, M: Send + 'static> Subscription<M> for Listen<T, M> {
    fn id(&self) -> SubId {
        self.id
    }

    fn run(&self, sender: mpsc::Sender<M>, stop: StopSignal) {
        let (listener, events) = self.feed.register();
        tracing::trace!(sub_id = self.id, listener, "feed listener registered");
        while !stop.is_stopped() {
            match events.recv_timeout(LISTEN_POLL) {
                Ok(event) => {
                    if let Some(msg) = (self.map)(event)
                        && sender.send(msg).is_err()
                    {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        self.feed.unregister(listener);
        tracing::trace!(sub_id = self.id, listener, "feed listener released");
    }
}

/// A mock subscription for testing.
///
/// Immediately sends all queued messages and then stops.
pub struct MockSubscription<M: Send + 'static> {
    id: SubId,
    messages: Vec<M>,
}

impl<M: Send + Clone + 'static> MockSubscription<M> {
    pub fn new(id: SubId, messages: Vec<M>) -> Self {
        Self { id, messages }
    }
}

impl<M: Send + Clone + 'static> Subscription<M> for MockSubscription<M> {
    fn id(&self) -> SubId {
        self.id
    }

    fn run(&self, sender: mpsc::Sender<M>, _stop: StopSignal) {
        for msg in &self.messages {
            if sender.send(msg.clone()).is_err() {
                break;
            }
        }
    }
}
