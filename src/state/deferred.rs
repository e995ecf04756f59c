//! Asynchronously readable states.
//!
//! A deferred state starts empty: reads wait until the owner publishes
//! the first value. From then on it behaves like an eager state minus
//! the immediate `read()`.

use super::base::{ReadFuture, StateCore, Subscription, WriteFuture};
use super::eager::{passthrough_setter, Setter};
use super::traits::{Observe, StateValue, Write, WriteDisposition};
use crate::helper::{Bounds, Helper};
use crate::outcome::{Fault, Outcome, Presence};
use std::sync::Arc;

/// A read-only state that is empty until first populated.
#[derive(Clone)]
pub struct DeferredState<V: StateValue> {
    core: Arc<StateCore<V>>,
}

impl<V: StateValue> DeferredState<V> {
    /// Creates an empty state; reads wait for the first [`set`](Self::set).
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(StateCore::empty()),
        }
    }

    /// Publishes a value, fulfilling waiting reads and notifying
    /// subscribers. Owner context.
    pub fn set(&self, value: V) {
        self.core.publish(value);
    }
}

impl<V: StateValue> Default for DeferredState<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StateValue> DeferredState<Outcome<T>> {
    /// Publishes a valid value. Owner context.
    pub fn set_valid(&self, value: T) {
        self.set(Outcome::Valid(value));
    }

    /// Publishes a fault. Owner context.
    #[track_caller]
    pub fn set_invalid(&self, reason: impl Into<String>) {
        self.set(Outcome::Invalid(Fault::new(reason)));
    }
}

impl<V: StateValue> Observe<V> for DeferredState<V> {
    fn subscribe(&self, subscription: &Subscription<V>, deliver_now: bool) {
        self.core.subscribe(subscription, deliver_now);
    }

    fn unsubscribe(&self, subscription: &Subscription<V>) {
        self.core.unsubscribe(subscription);
    }

    fn await_read(&self) -> ReadFuture<V> {
        ReadFuture::new(Arc::clone(&self.core))
    }

    fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    fn has_subscriber(&self, subscription: &Subscription<V>) -> bool {
        self.core.has_subscriber(subscription)
    }
}

/// A writable state that is empty until first populated.
///
/// The write path is asynchronous in shape: [`Write::write`] resolves
/// with the write's success or failure. A write arriving before the
/// first population may itself populate the state.
pub struct DeferredWritable<V: StateValue, W> {
    core: Arc<StateCore<V>>,
    helper: Option<Arc<dyn Helper<W>>>,
    setter: Setter<V, W>,
}

impl<V: StateValue, W> Clone for DeferredWritable<V, W> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            helper: self.helper.clone(),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<V, W> DeferredWritable<V, W>
where
    V: StateValue + From<W> + PartialEq,
    W: Send + Sync + 'static,
{
    /// Creates an empty writable state with the default write path.
    #[must_use]
    pub fn new(helper: Option<Arc<dyn Helper<W>>>) -> Self {
        Self {
            core: Arc::new(StateCore::empty()),
            setter: passthrough_setter(helper.clone()),
            helper,
        }
    }
}

impl<V: StateValue, W: Send + Sync + 'static> DeferredWritable<V, W> {
    /// Creates an empty writable state with a custom setter.
    #[must_use]
    pub fn with_setter(
        setter: impl Fn(W, Option<&V>) -> WriteDisposition<V> + Send + Sync + 'static,
        helper: Option<Arc<dyn Helper<W>>>,
    ) -> Self {
        Self {
            core: Arc::new(StateCore::empty()),
            setter: Arc::new(setter),
            helper,
        }
    }

    /// Publishes a value directly, bypassing the write path. Owner
    /// context.
    pub fn set(&self, value: V) {
        self.core.publish(value);
    }
}

impl<V: StateValue, W: Send + Sync + 'static> Observe<V> for DeferredWritable<V, W> {
    fn subscribe(&self, subscription: &Subscription<V>, deliver_now: bool) {
        self.core.subscribe(subscription, deliver_now);
    }

    fn unsubscribe(&self, subscription: &Subscription<V>) {
        self.core.unsubscribe(subscription);
    }

    fn await_read(&self) -> ReadFuture<V> {
        ReadFuture::new(Arc::clone(&self.core))
    }

    fn related(&self) -> Presence<Bounds> {
        self.helper
            .as_ref()
            .map_or(Presence::Absent, |h| h.related())
    }

    fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    fn has_subscriber(&self, subscription: &Subscription<V>) -> bool {
        self.core.has_subscriber(subscription)
    }
}

impl<V: StateValue, W: Send + Sync + 'static> Write<V, W> for DeferredWritable<V, W> {
    fn write(&self, value: W) -> WriteFuture {
        let current = self.core.peek();
        let outcome = match (self.setter)(value, current.as_ref()) {
            WriteDisposition::Set(next) => {
                self.core.publish(next);
                Outcome::Valid(())
            }
            WriteDisposition::Keep => Outcome::Valid(()),
            WriteDisposition::Reject(fault) => Outcome::Invalid(fault),
        };
        WriteFuture::ready(outcome)
    }

    fn limit(&self, value: W) -> Outcome<W> {
        match &self.helper {
            Some(h) => h.limit(value),
            None => Outcome::Valid(value),
        }
    }

    fn check(&self, value: &W) -> Presence<String> {
        self.helper
            .as_ref()
            .map_or(Presence::Absent, |h| h.check(value))
    }
}
