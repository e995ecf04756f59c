//! The capability lattice: one trait per axis.
//!
//! Shapes advertise what call sites may assume through trait bounds:
//! [`Observe`] for subscription and awaited reads, [`ReadSync`] for
//! immediate reads, [`Write`] for validated writes, [`WriteSync`] for
//! immediate writes. The guaranteed-valid axis needs no trait of its
//! own: a fallible shape emits `Outcome<T>` where a guaranteed-valid
//! shape emits the bare `T`.

use super::base::{ReadFuture, Subscription, WriteFuture};
use crate::helper::Bounds;
use crate::outcome::{Fault, Outcome, Presence};

/// Marker bound for every value a state can emit.
pub trait StateValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> StateValue for T {}

/// Subscription and awaited reads; implemented by every shape.
pub trait Observe<V: StateValue>: Send + Sync {
    /// Registers a subscriber. With `deliver_now`, a cached value is
    /// delivered to the new subscriber before this returns (queued
    /// behind an in-flight dispatch round, never interleaved with one).
    ///
    /// Registering an already-registered handle logs a contract
    /// violation and is a no-op.
    fn subscribe(&self, subscription: &Subscription<V>, deliver_now: bool);

    /// Removes a subscriber. Removing a handle that was never
    /// registered logs a contract violation and is a no-op.
    fn unsubscribe(&self, subscription: &Subscription<V>);

    /// Resolves with the current value, waiting for one if necessary.
    fn await_read(&self) -> ReadFuture<V>;

    /// Returns the bounds of this state's value, when a helper or
    /// constructor supplied them.
    fn related(&self) -> Presence<Bounds> {
        Presence::Absent
    }

    /// Number of registered subscribers.
    fn subscriber_count(&self) -> usize;

    /// Whether the given handle is currently registered.
    fn has_subscriber(&self, subscription: &Subscription<V>) -> bool;

    /// Whether anything is subscribed.
    fn in_use(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Wraps a closure into a fresh [`Subscription`] and registers it.
    fn subscribe_fn<F>(&self, callback: F, deliver_now: bool) -> Subscription<V>
    where
        F: Fn(&V) + Send + Sync + 'static,
        Self: Sized,
    {
        let subscription = Subscription::new(callback);
        self.subscribe(&subscription, deliver_now);
        subscription
    }
}

/// Immediate reads; only sync shapes implement this.
pub trait ReadSync<V: StateValue>: Observe<V> {
    /// Returns the current value without waiting.
    fn read(&self) -> V;
}

/// What a setter decided to do with a written candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteDisposition<V> {
    /// Publish this value.
    Set(V),
    /// Accept the write but change nothing.
    Keep,
    /// Refuse the write.
    Reject(Fault),
}

/// Validated writes; implemented by writable shapes.
pub trait Write<V: StateValue, W>: Observe<V> {
    /// Requests a value change. The helper's `limit` is applied before
    /// assignment; the future resolves with the write's eventual
    /// success or failure, never with the new value itself.
    fn write(&self, value: W) -> WriteFuture;

    /// Clamps a candidate the way a write would, without writing.
    fn limit(&self, value: W) -> Outcome<W>;

    /// Returns the reason a candidate would be rejected, or absence
    /// when it is acceptable.
    fn check(&self, value: &W) -> Presence<String>;
}

/// Immediate writes; only sync-writable shapes implement this.
pub trait WriteSync<V: StateValue, W>: Write<V, W> {
    /// Applies a write immediately and returns its result.
    fn write_sync(&self, value: W) -> Outcome<()>;
}

/// Sync read, fallible: emits `Outcome<T>`.
pub type FallibleSync<T> = super::eager::EagerState<Outcome<T>>;
/// Sync read, guaranteed-valid: emits `T`.
pub type ValidSync<T> = super::eager::EagerState<T>;
/// Sync read and write, fallible.
pub type FallibleSyncWritable<T, W = T> = super::eager::EagerWritable<Outcome<T>, W>;
/// Sync read and write, guaranteed-valid.
pub type ValidSyncWritable<T, W = T> = super::eager::EagerWritable<T, W>;
/// Async read, fallible.
pub type FallibleDeferred<T> = super::deferred::DeferredState<Outcome<T>>;
/// Async read, guaranteed-valid.
pub type ValidDeferred<T> = super::deferred::DeferredState<T>;
/// Async read and write, fallible.
pub type FallibleDeferredWritable<T, W = T> = super::deferred::DeferredWritable<Outcome<T>, W>;
/// Async read and write, guaranteed-valid.
pub type ValidDeferredWritable<T, W = T> = super::deferred::DeferredWritable<T, W>;
