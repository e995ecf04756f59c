//! The resource state: a cache driven by subscriber presence.
//!
//! A [`ResourceState`] looks like an async fallible state from the
//! outside, but its value is loaded only while someone is watching.
//! Two population strategies exist, fixed at construction:
//!
//! - **on-demand**: a fetch function is the sole data source. Reads and
//!   activations start at most one fetch at a time; concurrent readers
//!   attach to the in-flight completion (single-flight).
//! - **pushed**: an activation callback wires an external feed and
//!   pushes values in through [`ResourceState::update`]; a deactivation
//!   callback unwires it.
//!
//! # Lifecycle
//!
//! The subscriber registry drives everything. The 0→1 transition
//! activates the resource (callback invoked exactly once per active
//! epoch). The 1→0 transition arms the keep-alive grace window; a
//! subscriber arriving inside the window cancels the teardown outright.
//! Once the window elapses with no subscribers the cached value is
//! dropped, and a pushed resource's deactivation callback fires exactly
//! once.
//!
//! A fetch still in flight when the last subscriber leaves is not
//! cancelled; whenever it settles, its result is cached for the next
//! activation.
//!
//! # Failure semantics
//!
//! A failed fetch or write is an `Invalid` outcome, delivered like any
//! other value. A panic inside the fetch or write function (sync body or
//! future) is caught and converted to an `Invalid` outcome with a
//! generic reason.

use crate::helper::{Bounds, Helper};
use crate::outcome::{Fault, Outcome, Presence};
use crate::sched::{Handle, TimerId};
use crate::state::{
    CompletionCell, Observe, PresenceHooks, ReadDriver, ReadFuture, StateCore, StateValue,
    Subscription, Write, WriteFuture,
};
use crate::time::Time;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;

/// The future a fetch function returns.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Outcome<T>> + Send>>;

/// The future a write-back function returns.
pub type WriteBackFuture = Pin<Box<dyn Future<Output = Outcome<()>> + Send>>;

type FetchFn<T> = Box<dyn Fn() -> FetchFuture<T> + Send + Sync>;
type WriteFn<W> = Box<dyn Fn(W) -> WriteBackFuture + Send + Sync>;
type LifecycleFn<T, W> = Box<dyn Fn(&ResourceState<T, W>) + Send + Sync>;

/// The intervals governing a resource's lifecycle.
///
/// `keep_alive` is the grace window between the last unsubscribe and
/// teardown. `stale_after` and `retry_after` gate refetching: a cached
/// valid value older than `stale_after` is refetched rather than served
/// on an awaited read, and a cached fault younger than `retry_after` is
/// served without retrying. Both gates are disabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Grace window between last-unsubscribe and teardown.
    pub keep_alive: Duration,
    /// Age past which a cached valid value is refetched on read.
    pub stale_after: Option<Duration>,
    /// Age before which a cached fault is served without a retry.
    pub retry_after: Option<Duration>,
    /// Debounce interval for the write path.
    pub write_debounce: Option<Duration>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_millis(500),
            stale_after: None,
            retry_after: None,
            write_debounce: None,
        }
    }
}

/// Error from [`ResourceBuilder::build`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Neither a fetch function nor activation hooks were supplied.
    #[error("a resource needs a population strategy: a fetch function or activation hooks")]
    MissingSource,
    /// Both population strategies were supplied.
    #[error("a resource cannot combine an on-demand fetch with activation hooks")]
    ConflictingSources,
    /// A write debounce was configured without a write function.
    #[error("a write debounce was configured without a write function")]
    DebounceWithoutWrite,
}

enum Source<T, W> {
    OnDemand(FetchFn<T>),
    Pushed {
        on_activate: LifecycleFn<T, W>,
        on_deactivate: LifecycleFn<T, W>,
    },
}

struct PendingWrite<W> {
    value: W,
    timer: TimerId,
    cell: Arc<CompletionCell<Outcome<()>>>,
}

struct Lifecycle<W> {
    active: bool,
    fetching: bool,
    fetched_at: Option<Time>,
    teardown: Option<TimerId>,
    pending_write: Option<PendingWrite<W>>,
}

struct ResourceShared<T, W> {
    core: Arc<StateCore<Outcome<T>>>,
    sched: Handle,
    source: Source<T, W>,
    config: ResourceConfig,
    helper: Option<Arc<dyn Helper<W>>>,
    write_fn: Option<WriteFn<W>>,
    lifecycle: Mutex<Lifecycle<W>>,
    self_weak: Weak<ResourceShared<T, W>>,
}

/// Polls an inner future, converting a panic into an `Invalid` outcome.
struct CatchPanic<F> {
    inner: Option<F>,
    reason: &'static str,
}

impl<X, F> Future for CatchPanic<F>
where
    F: Future<Output = Outcome<X>> + Unpin,
{
    type Output = Outcome<X>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome<X>> {
        let this = self.get_mut();
        let reason = this.reason;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Pending;
        };
        match catch_unwind(AssertUnwindSafe(|| Pin::new(inner).poll(cx))) {
            Ok(Poll::Ready(outcome)) => {
                this.inner = None;
                Poll::Ready(outcome)
            }
            Ok(Poll::Pending) => Poll::Pending,
            Err(_) => {
                this.inner = None;
                Poll::Ready(Outcome::invalid(reason))
            }
        }
    }
}

impl<T: StateValue, W: Send + Sync + 'static> ResourceShared<T, W> {
    fn public(&self) -> Option<ResourceState<T, W>> {
        self.self_weak
            .upgrade()
            .map(|shared| ResourceState { shared })
    }

    /// Starts the on-demand fetch if none is in flight.
    fn ensure_fetch(&self) {
        let Source::OnDemand(fetch) = &self.source else {
            return;
        };
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.fetching {
                return;
            }
            lifecycle.fetching = true;
        }
        tracing::debug!("resource fetch starting");
        match catch_unwind(AssertUnwindSafe(|| fetch())) {
            Err(_) => {
                tracing::warn!("resource fetch function panicked");
                self.complete_fetch(Outcome::invalid("resource fetch panicked"));
            }
            Ok(future) => {
                let weak = self.self_weak.clone();
                self.sched.spawn(async move {
                    let outcome = CatchPanic {
                        inner: Some(future),
                        reason: "resource fetch panicked",
                    }
                    .await;
                    if let Some(shared) = weak.upgrade() {
                        shared.complete_fetch(outcome);
                    }
                });
            }
        }
    }

    /// Caches a settled fetch, even when every subscriber has left: the
    /// next activation reuses it, subject to the staleness gate.
    fn complete_fetch(&self, outcome: Outcome<T>) {
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.fetching = false;
            lifecycle.fetched_at = Some(self.sched.now());
        }
        self.core.publish(outcome);
    }

    /// Refetches when the cache is empty, stale, or a retry is due.
    fn refresh_if_needed(&self) {
        if !matches!(self.source, Source::OnDemand(_)) {
            return;
        }
        let now = self.sched.now();
        let refetch = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.fetching {
                false
            } else {
                match self.core.peek() {
                    None => true,
                    Some(cached) => {
                        let age = lifecycle.fetched_at.map(|at| now.duration_since(at));
                        match (cached, age) {
                            (Outcome::Valid(_), Some(age)) => self
                                .config
                                .stale_after
                                .is_some_and(|limit| age > limit),
                            (Outcome::Invalid(_), Some(age)) => self
                                .config
                                .retry_after
                                .is_some_and(|limit| age >= limit),
                            _ => false,
                        }
                    }
                }
            }
        };
        if refetch {
            self.core.clear();
            self.ensure_fetch();
        }
    }

    /// Fires when the grace window elapses. A subscriber that raced in
    /// is a no-op here; re-subscription cancels the timer outright.
    fn teardown(&self) {
        if self.core.subscriber_count() > 0 {
            return;
        }
        let deactivated = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.teardown = None;
            if lifecycle.active {
                lifecycle.active = false;
                lifecycle.fetched_at = None;
                true
            } else {
                false
            }
        };
        if deactivated {
            self.core.clear();
            tracing::debug!("resource deactivated after grace window");
            if let Source::Pushed { on_deactivate, .. } = &self.source {
                if let Some(state) = self.public() {
                    on_deactivate(&state);
                }
            }
        }
    }

    /// Invokes the write function with the coalesced value.
    fn flush_write(&self) {
        let Some(pending) = self.lifecycle.lock().pending_write.take() else {
            return;
        };
        let Some(write_fn) = self.write_fn.as_ref() else {
            return;
        };
        let PendingWrite { value, cell, .. } = pending;
        match catch_unwind(AssertUnwindSafe(|| write_fn(value))) {
            Err(_) => {
                tracing::warn!("resource write function panicked");
                cell.complete(Outcome::invalid("resource write panicked"));
            }
            Ok(future) => {
                self.sched.spawn(async move {
                    let outcome = CatchPanic {
                        inner: Some(future),
                        reason: "resource write panicked",
                    }
                    .await;
                    cell.complete(outcome);
                });
            }
        }
    }
}

impl<T: StateValue, W: Send + Sync + 'static> PresenceHooks for ResourceShared<T, W> {
    fn first_subscriber(&self) {
        let newly_active = {
            let mut lifecycle = self.lifecycle.lock();
            if let Some(timer) = lifecycle.teardown.take() {
                self.sched.cancel(timer);
            }
            if lifecycle.active {
                false
            } else {
                lifecycle.active = true;
                true
            }
        };
        if newly_active {
            tracing::debug!("resource activated");
            match &self.source {
                Source::Pushed { on_activate, .. } => {
                    if let Some(state) = self.public() {
                        on_activate(&state);
                    }
                }
                Source::OnDemand(_) => self.refresh_if_needed(),
            }
        }
    }

    fn last_subscriber(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.active {
            return;
        }
        if let Some(old) = lifecycle.teardown.take() {
            self.sched.cancel(old);
        }
        let weak = self.self_weak.clone();
        let timer = self.sched.schedule(self.config.keep_alive, move || {
            if let Some(shared) = weak.upgrade() {
                shared.teardown();
            }
        });
        lifecycle.teardown = Some(timer);
    }
}

impl<T: StateValue, W: Send + Sync + 'static> ReadDriver for ResourceShared<T, W> {
    fn before_read_poll(&self) {
        self.refresh_if_needed();
    }
}

/// A state whose value is loaded only while subscribers are present.
///
/// See the [module documentation](self) for the lifecycle.
pub struct ResourceState<T, W = T> {
    shared: Arc<ResourceShared<T, W>>,
}

impl<T, W> Clone for ResourceState<T, W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: StateValue, W: Send + Sync + 'static> ResourceState<T, W> {
    /// Starts building a resource scheduled on `sched`.
    #[must_use]
    pub fn builder(sched: Handle) -> ResourceBuilder<T, W> {
        ResourceBuilder::new(sched)
    }

    /// Pushes a value in: caches it and notifies subscribers. The entry
    /// point for activation-wired feeds. Owner context.
    pub fn update(&self, outcome: Outcome<T>) {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.fetched_at = Some(self.shared.sched.now());
        }
        self.shared.core.publish(outcome);
    }

    /// Pushes a valid value in. Owner context.
    pub fn update_valid(&self, value: T) {
        self.update(Outcome::Valid(value));
    }

    /// Pushes a fault in. Owner context.
    #[track_caller]
    pub fn update_invalid(&self, reason: impl Into<String>) {
        self.update(Outcome::Invalid(Fault::new(reason)));
    }

    /// Whether the resource is currently in an active epoch.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.lifecycle.lock().active
    }

    /// The intervals this resource was built with.
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.shared.config
    }
}

impl<T: StateValue, W: Send + Sync + 'static> Observe<Outcome<T>> for ResourceState<T, W> {
    fn subscribe(&self, subscription: &Subscription<Outcome<T>>, deliver_now: bool) {
        self.shared.core.subscribe(subscription, deliver_now);
    }

    fn unsubscribe(&self, subscription: &Subscription<Outcome<T>>) {
        self.shared.core.unsubscribe(subscription);
    }

    fn await_read(&self) -> ReadFuture<Outcome<T>> {
        ReadFuture::new(Arc::clone(&self.shared.core))
    }

    fn related(&self) -> Presence<Bounds> {
        self.shared
            .helper
            .as_ref()
            .map_or(Presence::Absent, |h| h.related())
    }

    fn subscriber_count(&self) -> usize {
        self.shared.core.subscriber_count()
    }

    fn has_subscriber(&self, subscription: &Subscription<Outcome<T>>) -> bool {
        self.shared.core.has_subscriber(subscription)
    }
}

impl<T: StateValue, W: Send + Sync + 'static> Write<Outcome<T>, W> for ResourceState<T, W> {
    /// Schedules a debounced write-back. Rapid repeated writes coalesce
    /// into the last value; every caller's future resolves with the
    /// single write invocation's outcome. Without a configured write
    /// function this is a logged no-op that resolves invalid.
    fn write(&self, value: W) -> WriteFuture {
        let shared = &self.shared;
        if shared.write_fn.is_none() {
            tracing::warn!("write to a resource with no write path");
            return WriteFuture::ready(Outcome::invalid("resource has no write path"));
        }
        let value = match shared.helper.as_ref() {
            Some(helper) => match helper.limit(value) {
                Outcome::Valid(limited) => limited,
                Outcome::Invalid(fault) => return WriteFuture::ready(Outcome::Invalid(fault)),
            },
            None => value,
        };
        let debounce = shared.config.write_debounce.unwrap_or(Duration::ZERO);
        let weak = shared.self_weak.clone();
        let mut lifecycle = shared.lifecycle.lock();
        if let Some(pending) = lifecycle.pending_write.as_mut() {
            pending.value = value;
            shared.sched.cancel(pending.timer);
            pending.timer = shared.sched.schedule(debounce, move || {
                if let Some(s) = weak.upgrade() {
                    s.flush_write();
                }
            });
            let cell = Arc::clone(&pending.cell);
            drop(lifecycle);
            WriteFuture::shared(cell)
        } else {
            let cell = Arc::new(CompletionCell::new());
            let timer = shared.sched.schedule(debounce, move || {
                if let Some(s) = weak.upgrade() {
                    s.flush_write();
                }
            });
            lifecycle.pending_write = Some(PendingWrite {
                value,
                timer,
                cell: Arc::clone(&cell),
            });
            drop(lifecycle);
            WriteFuture::shared(cell)
        }
    }

    fn limit(&self, value: W) -> Outcome<W> {
        match &self.shared.helper {
            Some(helper) => helper.limit(value),
            None => Outcome::Valid(value),
        }
    }

    fn check(&self, value: &W) -> Presence<String> {
        self.shared
            .helper
            .as_ref()
            .map_or(Presence::Absent, |h| h.check(value))
    }
}

/// Configures and builds a [`ResourceState`].
pub struct ResourceBuilder<T, W = T> {
    sched: Handle,
    source: Option<Source<T, W>>,
    conflicting: bool,
    config: ResourceConfig,
    helper: Option<Arc<dyn Helper<W>>>,
    write_fn: Option<WriteFn<W>>,
}

impl<T: StateValue, W: Send + Sync + 'static> ResourceBuilder<T, W> {
    /// Starts a builder scheduled on `sched`.
    #[must_use]
    pub fn new(sched: Handle) -> Self {
        Self {
            sched,
            source: None,
            conflicting: false,
            config: ResourceConfig::default(),
            helper: None,
            write_fn: None,
        }
    }

    /// Uses an on-demand fetch function as the sole data source.
    #[must_use]
    pub fn on_demand(mut self, fetch: impl Fn() -> FetchFuture<T> + Send + Sync + 'static) -> Self {
        if self.source.is_some() {
            self.conflicting = true;
        }
        self.source = Some(Source::OnDemand(Box::new(fetch)));
        self
    }

    /// Uses activation wiring: `on_activate` runs on the 0→1 subscriber
    /// transition and is expected to push values in through
    /// [`ResourceState::update`]; `on_deactivate` runs after the grace
    /// window empties the registry.
    #[must_use]
    pub fn pushed(
        mut self,
        on_activate: impl Fn(&ResourceState<T, W>) + Send + Sync + 'static,
        on_deactivate: impl Fn(&ResourceState<T, W>) + Send + Sync + 'static,
    ) -> Self {
        if self.source.is_some() {
            self.conflicting = true;
        }
        self.source = Some(Source::Pushed {
            on_activate: Box::new(on_activate),
            on_deactivate: Box::new(on_deactivate),
        });
        self
    }

    /// Sets the keep-alive grace window.
    #[must_use]
    pub fn keep_alive(mut self, window: Duration) -> Self {
        self.config.keep_alive = window;
        self
    }

    /// Enables the staleness gate: a cached valid value older than
    /// `limit` is refetched on the next awaited read.
    #[must_use]
    pub fn stale_after(mut self, limit: Duration) -> Self {
        self.config.stale_after = Some(limit);
        self
    }

    /// Enables the retry gate: a cached fault younger than `backoff` is
    /// served without retrying the fetch.
    #[must_use]
    pub fn retry_after(mut self, backoff: Duration) -> Self {
        self.config.retry_after = Some(backoff);
        self
    }

    /// Enables the write path.
    #[must_use]
    pub fn write(mut self, write_fn: impl Fn(W) -> WriteBackFuture + Send + Sync + 'static) -> Self {
        self.write_fn = Some(Box::new(write_fn));
        self
    }

    /// Debounces the write path: rapid writes coalesce into the last
    /// value, written once the interval elapses without another write.
    #[must_use]
    pub fn write_debounce(mut self, debounce: Duration) -> Self {
        self.config.write_debounce = Some(debounce);
        self
    }

    /// Attaches a helper limiting and describing written values.
    #[must_use]
    pub fn helper(mut self, helper: Arc<dyn Helper<W>>) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Replaces the whole interval set.
    #[must_use]
    pub fn config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the resource.
    pub fn build(self) -> Result<ResourceState<T, W>, BuildError> {
        if self.conflicting {
            return Err(BuildError::ConflictingSources);
        }
        let source = self.source.ok_or(BuildError::MissingSource)?;
        if self.config.write_debounce.is_some() && self.write_fn.is_none() {
            return Err(BuildError::DebounceWithoutWrite);
        }
        let core = Arc::new(StateCore::empty());
        let shared = Arc::new_cyclic(|weak: &Weak<ResourceShared<T, W>>| ResourceShared {
            core: Arc::clone(&core),
            sched: self.sched,
            source,
            config: self.config,
            helper: self.helper,
            write_fn: self.write_fn,
            lifecycle: Mutex::new(Lifecycle {
                active: false,
                fetching: false,
                fetched_at: None,
                teardown: None,
                pending_write: None,
            }),
            self_weak: weak.clone(),
        });
        core.set_hooks(Arc::downgrade(&shared) as Weak<dyn PresenceHooks>);
        core.set_driver(Arc::downgrade(&shared) as Weak<dyn ReadDriver>);
        Ok(ResourceState { shared })
    }
}
