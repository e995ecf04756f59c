//! Shared machinery behind every state shape.
//!
//! [`StateCore`] owns the three things all shapes have in common: the
//! value slot (empty, lazily produced, or ready), the ordered subscriber
//! registry, and the read-waiter slab that backs [`ReadFuture`]. The
//! concrete shapes in the sibling modules are thin views over an
//! `Arc<StateCore>` plus their write plumbing.
//!
//! # Dispatch discipline
//!
//! A publish notifies subscribers from a snapshot frozen at dispatch
//! start, in registration order. A publish arriving while a round is in
//! flight (a subscriber writing back into the same state) is queued and
//! delivered after the round, never nested and never dropped. A
//! panicking subscriber is caught and logged; delivery continues with
//! the next subscriber. Locks are never held while user callbacks or
//! wakers run.

use super::traits::StateValue;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use crate::outcome::Outcome;

/// A registered subscriber callback, used as its own handle.
///
/// Identity is the callback allocation: cloning a subscription yields a
/// handle to the same registration, while two subscriptions built from
/// identical closures are distinct.
pub struct Subscription<V> {
    callback: Arc<dyn Fn(&V) + Send + Sync>,
}

impl<V> Subscription<V> {
    /// Wraps a callback into a subscription handle.
    pub fn new(callback: impl Fn(&V) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub(crate) fn call(&self, value: &V) {
        (self.callback)(value);
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl<V> Clone for Subscription<V> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({:p})", Arc::as_ptr(&self.callback))
    }
}

/// Waker storage that reuses freed slots and survives waiter drops.
#[derive(Default)]
pub(crate) struct WaiterSlab {
    entries: Vec<Option<Waker>>,
    free: Vec<usize>,
}

impl WaiterSlab {
    fn insert(&mut self, waker: Waker) -> usize {
        if let Some(index) = self.free.pop() {
            self.entries[index] = Some(waker);
            index
        } else {
            self.entries.push(Some(waker));
            self.entries.len() - 1
        }
    }

    fn update(&mut self, index: usize, waker: &Waker) {
        self.entries[index] = Some(waker.clone());
    }

    fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries[index] = None;
            self.free.push(index);
        }
    }

    /// Takes every stored waker. Slots stay owned by their waiters, which
    /// re-register on their next poll.
    fn take_wakers(&mut self) -> SmallVec<[Waker; 4]> {
        self.entries.iter_mut().filter_map(Option::take).collect()
    }
}

/// A one-shot completion shared between a producer and any number of
/// awaiting consumers. The first completion wins.
pub(crate) struct CompletionCell<T> {
    state: Mutex<CompletionState<T>>,
}

struct CompletionState<T> {
    result: Option<T>,
    waiters: WaiterSlab,
}

impl<T: Clone> CompletionCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CompletionState {
                result: None,
                waiters: WaiterSlab::default(),
            }),
        }
    }

    pub(crate) fn complete(&self, value: T) {
        let wakers = {
            let mut state = self.state.lock();
            if state.result.is_some() {
                return;
            }
            state.result = Some(value);
            state.waiters.take_wakers()
        };
        for waker in wakers {
            waker.wake();
        }
    }

    fn poll_result(&self, waiter: &mut Option<usize>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.lock();
        if let Some(value) = &state.result {
            let value = value.clone();
            if let Some(index) = waiter.take() {
                state.waiters.remove(index);
            }
            return Poll::Ready(value);
        }
        match waiter {
            Some(index) => state.waiters.update(*index, cx.waker()),
            None => *waiter = Some(state.waiters.insert(cx.waker().clone())),
        }
        Poll::Pending
    }

    fn drop_waiter(&self, index: usize) {
        self.state.lock().waiters.remove(index);
    }
}

/// Awaits a [`CompletionCell`].
pub(crate) struct CompletionFuture<T: Clone> {
    cell: Arc<CompletionCell<T>>,
    waiter: Option<usize>,
}

impl<T: Clone> CompletionFuture<T> {
    pub(crate) fn new(cell: Arc<CompletionCell<T>>) -> Self {
        Self { cell, waiter: None }
    }
}

impl<T: Clone> Future for CompletionFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        this.cell.poll_result(&mut this.waiter, cx)
    }
}

impl<T: Clone> Drop for CompletionFuture<T> {
    fn drop(&mut self) {
        if let Some(index) = self.waiter.take() {
            self.cell.drop_waiter(index);
        }
    }
}

/// Resolves with the eventual success or failure of a write.
pub struct WriteFuture {
    inner: WriteFutureInner,
}

enum WriteFutureInner {
    Ready(Option<Outcome<()>>),
    Shared(CompletionFuture<Outcome<()>>),
}

impl WriteFuture {
    pub(crate) fn ready(outcome: Outcome<()>) -> Self {
        Self {
            inner: WriteFutureInner::Ready(Some(outcome)),
        }
    }

    pub(crate) fn shared(cell: Arc<CompletionCell<Outcome<()>>>) -> Self {
        Self {
            inner: WriteFutureInner::Shared(CompletionFuture::new(cell)),
        }
    }
}

impl Future for WriteFuture {
    type Output = Outcome<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome<()>> {
        match &mut self.get_mut().inner {
            WriteFutureInner::Ready(slot) => {
                Poll::Ready(slot.take().expect("WriteFuture polled after completion"))
            }
            WriteFutureInner::Shared(future) => Pin::new(future).poll(cx),
        }
    }
}

/// Receives subscriber-presence transitions from a [`StateCore`].
///
/// The core reports only the edges: the registry going 0→1 and 1→0.
/// Resource and derived states build their activation lifecycles on
/// these two calls.
pub(crate) trait PresenceHooks: Send + Sync {
    fn first_subscriber(&self);
    fn last_subscriber(&self);
}

/// Invoked before each [`ReadFuture`] poll, so a state can start
/// whatever work eventually produces a value.
pub(crate) trait ReadDriver: Send + Sync {
    fn before_read_poll(&self);
}

/// The value slot of a state.
enum Slot<V> {
    /// No value yet; reads wait.
    Empty,
    /// A producer that runs at most once, on first use.
    Lazy(Box<dyn FnOnce() -> V + Send>),
    /// A concrete cached value.
    Ready(V),
}

enum PendingEmit<V> {
    /// A full round queued behind an in-flight dispatch.
    Broadcast(V),
    /// An immediate delivery for a subscriber registered mid-round.
    DeliverTo(Subscription<V>, V),
}

enum Drained<V> {
    Round(SmallVec<[Subscription<V>; 4]>, V),
    One(Subscription<V>, V),
}

struct CoreInner<V> {
    slot: Slot<V>,
    subscribers: SmallVec<[Subscription<V>; 4]>,
    dispatching: bool,
    pending: VecDeque<PendingEmit<V>>,
    read_waiters: WaiterSlab,
    /// Bumped on every publish; lets `subscribe` skip the immediate
    /// delivery when an emission already reached the new subscriber.
    version: u64,
}

/// The shared heart of every state shape.
pub(crate) struct StateCore<V> {
    inner: Mutex<CoreInner<V>>,
    hooks: Mutex<Option<Weak<dyn PresenceHooks>>>,
    driver: Mutex<Option<Weak<dyn ReadDriver>>>,
}

impl<V: StateValue> StateCore<V> {
    fn from_slot(slot: Slot<V>) -> Self {
        Self {
            inner: Mutex::new(CoreInner {
                slot,
                subscribers: SmallVec::new(),
                dispatching: false,
                pending: VecDeque::new(),
                read_waiters: WaiterSlab::default(),
                version: 0,
            }),
            hooks: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    pub(crate) fn with_value(value: V) -> Self {
        Self::from_slot(Slot::Ready(value))
    }

    pub(crate) fn lazy(producer: Box<dyn FnOnce() -> V + Send>) -> Self {
        Self::from_slot(Slot::Lazy(producer))
    }

    pub(crate) fn empty() -> Self {
        Self::from_slot(Slot::Empty)
    }

    pub(crate) fn set_hooks(&self, hooks: Weak<dyn PresenceHooks>) {
        *self.hooks.lock() = Some(hooks);
    }

    pub(crate) fn set_driver(&self, driver: Weak<dyn ReadDriver>) {
        *self.driver.lock() = Some(driver);
    }

    fn hooks(&self) -> Option<Arc<dyn PresenceHooks>> {
        self.hooks.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn driver(&self) -> Option<Arc<dyn ReadDriver>> {
        self.driver.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Runs the lazy producer if one is pending. Called under the inner
    /// lock; producers must not touch their own state.
    fn force_slot(inner: &mut CoreInner<V>) {
        if matches!(inner.slot, Slot::Lazy(_)) {
            let slot = std::mem::replace(&mut inner.slot, Slot::Empty);
            inner.slot = match slot {
                Slot::Lazy(producer) => Slot::Ready(producer()),
                other => other,
            };
        }
    }

    /// Registers a subscriber. Re-registering the same handle is a
    /// logged no-op.
    pub(crate) fn subscribe(&self, sub: &Subscription<V>, deliver_now: bool) {
        let (first, registered_at) = {
            let mut inner = self.inner.lock();
            if inner.subscribers.iter().any(|s| s.ptr_eq(sub)) {
                drop(inner);
                tracing::warn!(subscription = ?sub, "subscribe: callback already registered, ignoring");
                return;
            }
            let first = inner.subscribers.is_empty();
            inner.subscribers.push(sub.clone());
            (first, inner.version)
        };
        if first {
            if let Some(hooks) = self.hooks() {
                hooks.first_subscriber();
            }
        }
        if deliver_now {
            let mut deliver = None;
            {
                let mut inner = self.inner.lock();
                // An emission since registration already reached this
                // subscriber; delivering again would double it up.
                if inner.version != registered_at {
                    return;
                }
                Self::force_slot(&mut inner);
                let ready = match &inner.slot {
                    Slot::Ready(v) => Some(v.clone()),
                    _ => None,
                };
                if let Some(value) = ready {
                    if inner.dispatching {
                        inner
                            .pending
                            .push_back(PendingEmit::DeliverTo(sub.clone(), value));
                    } else {
                        deliver = Some(value);
                    }
                }
            }
            if let Some(value) = deliver {
                deliver_one(sub, &value);
            }
        }
    }

    /// Removes a subscriber. Removing an unknown handle is a logged
    /// no-op.
    pub(crate) fn unsubscribe(&self, sub: &Subscription<V>) {
        let last = {
            let mut inner = self.inner.lock();
            match inner.subscribers.iter().position(|s| s.ptr_eq(sub)) {
                Some(index) => {
                    inner.subscribers.remove(index);
                    inner.subscribers.is_empty()
                }
                None => {
                    drop(inner);
                    tracing::warn!(subscription = ?sub, "unsubscribe: callback was never registered");
                    return;
                }
            }
        };
        if last {
            if let Some(hooks) = self.hooks() {
                hooks.last_subscriber();
            }
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub(crate) fn has_subscriber(&self, sub: &Subscription<V>) -> bool {
        self.inner.lock().subscribers.iter().any(|s| s.ptr_eq(sub))
    }

    /// Caches a value, fulfills waiting reads, and notifies subscribers.
    pub(crate) fn publish(&self, value: V) {
        let (wakers, snapshot) = {
            let mut inner = self.inner.lock();
            inner.slot = Slot::Ready(value.clone());
            inner.version = inner.version.wrapping_add(1);
            let wakers = inner.read_waiters.take_wakers();
            if inner.dispatching {
                inner.pending.push_back(PendingEmit::Broadcast(value));
                drop(inner);
                for waker in wakers {
                    waker.wake();
                }
                return;
            }
            inner.dispatching = true;
            (wakers, inner.subscribers.clone())
        };
        for waker in wakers {
            waker.wake();
        }
        deliver_round(&snapshot, &value);
        self.drain_pending();
    }

    fn drain_pending(&self) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                match inner.pending.pop_front() {
                    Some(PendingEmit::Broadcast(value)) => {
                        Some(Drained::Round(inner.subscribers.clone(), value))
                    }
                    Some(PendingEmit::DeliverTo(sub, value)) => Some(Drained::One(sub, value)),
                    None => {
                        inner.dispatching = false;
                        None
                    }
                }
            };
            match next {
                Some(Drained::Round(snapshot, value)) => deliver_round(&snapshot, &value),
                Some(Drained::One(sub, value)) => deliver_one(&sub, &value),
                None => break,
            }
        }
    }

    pub(crate) fn poll_read(&self, waiter: &mut Option<usize>, cx: &mut Context<'_>) -> Poll<V> {
        let mut inner = self.inner.lock();
        Self::force_slot(&mut inner);
        if let Slot::Ready(value) = &inner.slot {
            let value = value.clone();
            if let Some(index) = waiter.take() {
                inner.read_waiters.remove(index);
            }
            return Poll::Ready(value);
        }
        match waiter {
            Some(index) => inner.read_waiters.update(*index, cx.waker()),
            None => *waiter = Some(inner.read_waiters.insert(cx.waker().clone())),
        }
        Poll::Pending
    }

    fn drop_read_waiter(&self, index: usize) {
        self.inner.lock().read_waiters.remove(index);
    }

    /// Returns the current value, running a pending lazy producer.
    pub(crate) fn read_now(&self) -> Option<V> {
        let mut inner = self.inner.lock();
        Self::force_slot(&mut inner);
        match &inner.slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns the cached value without touching a lazy producer.
    pub(crate) fn peek(&self) -> Option<V> {
        match &self.inner.lock().slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Drops the cached value; reads wait again.
    pub(crate) fn clear(&self) {
        self.inner.lock().slot = Slot::Empty;
    }
}

fn deliver_round<V>(snapshot: &[Subscription<V>], value: &V) {
    for sub in snapshot {
        deliver_one(sub, value);
    }
}

fn deliver_one<V>(sub: &Subscription<V>, value: &V) {
    if catch_unwind(AssertUnwindSafe(|| sub.call(value))).is_err() {
        tracing::warn!(subscription = ?sub, "state subscriber panicked during dispatch");
    }
}

/// Resolves with the state's value once one is available.
///
/// Dropping a pending read cleanly deregisters its waiter.
pub struct ReadFuture<V: StateValue> {
    core: Arc<StateCore<V>>,
    waiter: Option<usize>,
}

impl<V: StateValue> ReadFuture<V> {
    pub(crate) fn new(core: Arc<StateCore<V>>) -> Self {
        Self { core, waiter: None }
    }
}

impl<V: StateValue> Future for ReadFuture<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        let this = self.get_mut();
        if let Some(driver) = this.core.driver() {
            driver.before_read_poll();
        }
        this.core.poll_read(&mut this.waiter, cx)
    }
}

impl<V: StateValue> Drop for ReadFuture<V> {
    fn drop(&mut self) {
        if let Some(index) = self.waiter.take() {
            self.core.drop_read_waiter(index);
        }
    }
}
