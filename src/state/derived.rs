//! Read-only projections over an upstream state.
//!
//! A derived state applies a pure closure to every value an upstream
//! state emits. It follows the same presence-driven lifecycle as the
//! resource state: the upstream subscription is held only while the
//! derived state has subscribers of its own (or a read is in flight),
//! so an unobserved projection costs nothing upstream.

use super::base::{PresenceHooks, ReadDriver, ReadFuture, StateCore, Subscription};
use super::traits::{Observe, StateValue};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

struct DerivedShared<U: StateValue, V: StateValue> {
    upstream: Arc<dyn Observe<U>>,
    project: Box<dyn Fn(&U) -> V + Send + Sync>,
    core: Arc<StateCore<V>>,
    link: Mutex<Option<Subscription<U>>>,
    self_weak: Weak<Self>,
}

impl<U: StateValue, V: StateValue> DerivedShared<U, V> {
    /// Subscribes upstream if not already linked. With `deliver_now`,
    /// an upstream value cached right now projects through immediately.
    fn link(&self) {
        let mut link = self.link.lock();
        if link.is_some() {
            return;
        }
        let weak = self.self_weak.clone();
        let sub = Subscription::new(move |value: &U| {
            if let Some(shared) = weak.upgrade() {
                shared.core.publish((shared.project)(value));
                shared.unlink_if_unobserved();
            }
        });
        *link = Some(sub.clone());
        drop(link);
        self.upstream.subscribe(&sub, true);
    }

    /// Drops the upstream link when nothing observes the projection.
    fn unlink_if_unobserved(&self) {
        if self.core.subscriber_count() > 0 {
            return;
        }
        if let Some(sub) = self.link.lock().take() {
            self.upstream.unsubscribe(&sub);
        }
    }
}

impl<U: StateValue, V: StateValue> PresenceHooks for DerivedShared<U, V> {
    fn first_subscriber(&self) {
        self.link();
    }

    fn last_subscriber(&self) {
        self.unlink_if_unobserved();
    }
}

impl<U: StateValue, V: StateValue> ReadDriver for DerivedShared<U, V> {
    fn before_read_poll(&self) {
        // A lone read links upstream too; the projection closure tears
        // the link back down once a value has flowed and nobody
        // subscribed meanwhile.
        self.link();
    }
}

/// A read-only state computed from one upstream state.
pub struct DerivedState<U: StateValue, V: StateValue> {
    shared: Arc<DerivedShared<U, V>>,
}

impl<U: StateValue, V: StateValue> Clone for DerivedState<U, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<U: StateValue, V: StateValue> DerivedState<U, V> {
    /// Creates a projection of `upstream` through `project`.
    #[must_use]
    pub fn new(
        upstream: Arc<dyn Observe<U>>,
        project: impl Fn(&U) -> V + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<DerivedShared<U, V>>| DerivedShared {
            upstream,
            project: Box::new(project),
            core: Arc::new(StateCore::empty()),
            link: Mutex::new(None),
            self_weak: weak.clone(),
        });
        let hooks: Weak<dyn PresenceHooks> = Arc::downgrade(&shared) as Weak<dyn PresenceHooks>;
        shared.core.set_hooks(hooks);
        let driver: Weak<dyn ReadDriver> = Arc::downgrade(&shared) as Weak<dyn ReadDriver>;
        shared.core.set_driver(driver);
        Self { shared }
    }
}

impl<U: StateValue, V: StateValue> Observe<V> for DerivedState<U, V> {
    fn subscribe(&self, subscription: &Subscription<V>, deliver_now: bool) {
        self.shared.core.subscribe(subscription, deliver_now);
    }

    fn unsubscribe(&self, subscription: &Subscription<V>) {
        self.shared.core.unsubscribe(subscription);
    }

    fn await_read(&self) -> ReadFuture<V> {
        ReadFuture::new(Arc::clone(&self.shared.core))
    }

    fn subscriber_count(&self) -> usize {
        self.shared.core.subscriber_count()
    }

    fn has_subscriber(&self, subscription: &Subscription<V>) -> bool {
        self.shared.core.has_subscriber(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::eager::EagerState;
    use crate::state::ReadSync;

    #[test]
    fn projection_follows_upstream_while_subscribed() {
        let upstream = EagerState::new(2u32);
        let derived = DerivedState::new(
            Arc::new(upstream.clone()) as Arc<dyn Observe<u32>>,
            |v: &u32| v * 10,
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sub = derived.subscribe_fn(move |value: &u32| log.lock().push(*value), true);

        upstream.set(3);
        assert_eq!(*seen.lock(), vec![20, 30]);
        derived.unsubscribe(&sub);
    }

    #[test]
    fn upstream_link_exists_only_while_observed() {
        let upstream = EagerState::new(1u32);
        let derived = DerivedState::new(
            Arc::new(upstream.clone()) as Arc<dyn Observe<u32>>,
            |v: &u32| v + 1,
        );

        assert_eq!(upstream.subscriber_count(), 0);
        let sub = derived.subscribe_fn(|_: &u32| {}, false);
        assert_eq!(upstream.subscriber_count(), 1);
        derived.unsubscribe(&sub);
        assert_eq!(upstream.subscriber_count(), 0);
    }

    #[test]
    fn lone_read_projects_without_leaking_a_link() {
        let upstream = EagerState::new(4u32);
        let derived = DerivedState::new(
            Arc::new(upstream.clone()) as Arc<dyn Observe<u32>>,
            |v: &u32| v * v,
        );

        use std::future::Future;
        use std::pin::Pin;
        use std::task::{Context, Poll, Wake, Waker};
        struct NoopWaker;
        impl Wake for NoopWaker {
            fn wake(self: Arc<Self>) {}
        }
        let waker: Waker = Arc::new(NoopWaker).into();
        let mut cx = Context::from_waker(&waker);

        let mut read = derived.await_read();
        assert_eq!(Pin::new(&mut read).poll(&mut cx), Poll::Ready(16));
        assert_eq!(upstream.subscriber_count(), 0);
        assert_eq!(upstream.read(), 4);
    }
}
