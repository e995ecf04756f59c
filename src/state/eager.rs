//! Synchronously readable states.
//!
//! An eager state always has a value to hand out: either supplied at
//! construction or produced by a one-shot lazy initializer on first use.

use super::base::{ReadFuture, StateCore, Subscription, WriteFuture};
use super::traits::{Observe, ReadSync, StateValue, Write, WriteDisposition, WriteSync};
use crate::helper::{Bounds, Helper};
use crate::outcome::{Fault, Outcome, Presence};
use std::sync::Arc;

pub(super) type Setter<V, W> = Arc<dyn Fn(W, Option<&V>) -> WriteDisposition<V> + Send + Sync>;

/// Builds the default write path: limit through the helper, skip
/// no-change writes, publish the rest.
pub(super) fn passthrough_setter<V, W>(helper: Option<Arc<dyn Helper<W>>>) -> Setter<V, W>
where
    V: StateValue + From<W> + PartialEq,
    W: Send + Sync + 'static,
{
    Arc::new(move |value: W, current: Option<&V>| {
        let limited = match &helper {
            Some(h) => h.limit(value),
            None => Outcome::Valid(value),
        };
        match limited {
            Outcome::Valid(accepted) => {
                let next = V::from(accepted);
                if current == Some(&next) {
                    WriteDisposition::Keep
                } else {
                    WriteDisposition::Set(next)
                }
            }
            Outcome::Invalid(fault) => WriteDisposition::Reject(fault),
        }
    })
}

/// A read-only state whose value is always available.
#[derive(Clone)]
pub struct EagerState<V: StateValue> {
    core: Arc<StateCore<V>>,
    related: Option<Bounds>,
}

impl<V: StateValue> EagerState<V> {
    /// Creates a state holding the given value.
    #[must_use]
    pub fn new(value: V) -> Self {
        Self {
            core: Arc::new(StateCore::with_value(value)),
            related: None,
        }
    }

    /// Creates a state whose value is produced on first use. The
    /// producer runs at most once and is then discarded.
    #[must_use]
    pub fn lazy(producer: impl FnOnce() -> V + Send + 'static) -> Self {
        Self {
            core: Arc::new(StateCore::lazy(Box::new(producer))),
            related: None,
        }
    }

    /// Attaches bounds reported by [`Observe::related`].
    #[must_use]
    pub fn with_related(mut self, bounds: Bounds) -> Self {
        self.related = Some(bounds);
        self
    }

    /// Sets the value and notifies subscribers. Owner context.
    pub fn set(&self, value: V) {
        self.core.publish(value);
    }
}

impl<T: StateValue> EagerState<Outcome<T>> {
    /// Creates a fallible state holding a valid value.
    #[must_use]
    pub fn valid(value: T) -> Self {
        Self::new(Outcome::Valid(value))
    }

    /// Sets a valid value and notifies subscribers.
    pub fn set_valid(&self, value: T) {
        self.set(Outcome::Valid(value));
    }

    /// Sets a fault and notifies subscribers.
    #[track_caller]
    pub fn set_invalid(&self, reason: impl Into<String>) {
        self.set(Outcome::Invalid(Fault::new(reason)));
    }
}

impl<V: StateValue> Observe<V> for EagerState<V> {
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
        Presence::from(self.related.clone())
    }

    fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    fn has_subscriber(&self, subscription: &Subscription<V>) -> bool {
        self.core.has_subscriber(subscription)
    }
}

impl<V: StateValue> ReadSync<V> for EagerState<V> {
    fn read(&self) -> V {
        self.core
            .read_now()
            .expect("an eager state always holds a value")
    }
}

/// A writable state whose value is always available.
///
/// Writes run through the attached [`Helper`]'s `limit` before
/// assignment; subscribers observe the limited value.
pub struct EagerWritable<V: StateValue, W> {
    core: Arc<StateCore<V>>,
    helper: Option<Arc<dyn Helper<W>>>,
    setter: Setter<V, W>,
}

impl<V: StateValue, W> Clone for EagerWritable<V, W> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            helper: self.helper.clone(),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<V, W> EagerWritable<V, W>
where
    V: StateValue + From<W> + PartialEq,
    W: Send + Sync + 'static,
{
    /// Creates a writable state with the default write path: limit the
    /// candidate through the helper, skip writes that change nothing,
    /// publish the rest.
    #[must_use]
    pub fn new(value: V, helper: Option<Arc<dyn Helper<W>>>) -> Self {
        Self {
            core: Arc::new(StateCore::with_value(value)),
            setter: passthrough_setter(helper.clone()),
            helper,
        }
    }

    /// Like [`new`](Self::new), with a lazily produced initial value.
    #[must_use]
    pub fn lazy(
        producer: impl FnOnce() -> V + Send + 'static,
        helper: Option<Arc<dyn Helper<W>>>,
    ) -> Self {
        Self {
            core: Arc::new(StateCore::lazy(Box::new(producer))),
            setter: passthrough_setter(helper.clone()),
            helper,
        }
    }
}

impl<V: StateValue, W: Send + Sync + 'static> EagerWritable<V, W> {
    /// Creates a writable state with a custom setter deciding what each
    /// write does.
    #[must_use]
    pub fn with_setter(
        value: V,
        setter: impl Fn(W, Option<&V>) -> WriteDisposition<V> + Send + Sync + 'static,
        helper: Option<Arc<dyn Helper<W>>>,
    ) -> Self {
        Self {
            core: Arc::new(StateCore::with_value(value)),
            setter: Arc::new(setter),
            helper,
        }
    }

    /// Sets the value directly, bypassing the write path. Owner context.
    pub fn set(&self, value: V) {
        self.core.publish(value);
    }
}

impl<T: StateValue, W: Send + Sync + 'static> EagerWritable<Outcome<T>, W> {
    /// Sets a valid value directly. Owner context.
    pub fn set_valid(&self, value: T) {
        self.set(Outcome::Valid(value));
    }

    /// Sets a fault directly. Owner context.
    #[track_caller]
    pub fn set_invalid(&self, reason: impl Into<String>) {
        self.set(Outcome::Invalid(Fault::new(reason)));
    }
}

impl<V: StateValue, W: Send + Sync + 'static> Observe<V> for EagerWritable<V, W> {
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

impl<V: StateValue, W: Send + Sync + 'static> ReadSync<V> for EagerWritable<V, W> {
    fn read(&self) -> V {
        self.core
            .read_now()
            .expect("an eager state always holds a value")
    }
}

impl<V: StateValue, W: Send + Sync + 'static> Write<V, W> for EagerWritable<V, W> {
    fn write(&self, value: W) -> WriteFuture {
        WriteFuture::ready(self.write_sync(value))
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

impl<V: StateValue, W: Send + Sync + 'static> WriteSync<V, W> for EagerWritable<V, W> {
    fn write_sync(&self, value: W) -> Outcome<()> {
        let current = self.core.read_now();
        match (self.setter)(value, current.as_ref()) {
            WriteDisposition::Set(next) => {
                self.core.publish(next);
                Outcome::Valid(())
            }
            WriteDisposition::Keep => Outcome::Valid(()),
            WriteDisposition::Reject(fault) => Outcome::Invalid(fault),
        }
    }
}
