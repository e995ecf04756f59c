//! Host-pumped cooperative scheduler.
//!
//! Nothing in this crate spawns a thread. Deferred work comes in two
//! kinds, both owned by the [`Scheduler`]:
//!
//! - **timers**: cancellable one-shot actions with a deadline (grace
//!   windows, write debounce), kept in a min-heap ordered by deadline
//! - **tasks**: spawned continuations (fetch and write-back futures),
//!   kept in a ready queue and re-queued by their wakers
//!
//! The host pumps the scheduler by calling [`Scheduler::tick`] from its
//! frame loop (or, in tests, after advancing a
//! [`VirtualClock`](crate::time::VirtualClock)). A tick fires every timer
//! whose deadline has passed and polls every ready task, repeating until
//! the scheduler is idle for the current instant.

use crate::time::{Clock, Time};
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Wake, Waker};
use std::time::Duration;

/// Identifies a scheduled timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

type TimerAction = Box<dyn FnOnce() + Send + 'static>;

struct TimerEntry {
    deadline: Time,
    id: u64,
    action: TimerAction,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest deadline first); ties
        // fire in scheduling order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerState {
    heap: BinaryHeap<TimerEntry>,
    /// Ids scheduled and not yet fired.
    pending: HashSet<u64>,
    /// Ids cancelled while still pending.
    cancelled: HashSet<u64>,
    next_id: u64,
}

struct Task {
    future: Mutex<Option<Pin<Box<dyn Future<Output = ()> + Send + 'static>>>>,
    queued: AtomicBool,
    sched: Weak<SchedInner>,
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        Self::wake_by_ref(&self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.queued.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sched) = self.sched.upgrade() {
            sched.ready.lock().push_back(Arc::clone(self));
        }
    }
}

struct SchedInner {
    clock: Arc<dyn Clock>,
    timers: Mutex<TimerState>,
    ready: Mutex<VecDeque<Arc<Task>>>,
}

impl SchedInner {
    /// Fires every timer due at `now`. Returns how many fired.
    fn fire_due(&self, now: Time) -> usize {
        let mut fired = 0;
        loop {
            let entry = {
                let mut timers = self.timers.lock();
                let due = timers.heap.peek().is_some_and(|e| e.deadline <= now);
                if !due {
                    break;
                }
                let entry = timers.heap.pop().expect("peeked entry exists");
                timers.pending.remove(&entry.id);
                if timers.cancelled.remove(&entry.id) {
                    continue;
                }
                entry
            };
            (entry.action)();
            fired += 1;
        }
        fired
    }

    /// Polls every queued task once. Returns how many were polled.
    fn drain_ready(self: &Arc<Self>) -> usize {
        let mut polled = 0;
        loop {
            let task = match self.ready.lock().pop_front() {
                Some(task) => task,
                None => break,
            };
            task.queued.store(false, Ordering::SeqCst);
            let mut slot = task.future.lock();
            let Some(mut future) = slot.take() else {
                continue;
            };
            drop(slot);
            let waker = Waker::from(Arc::clone(&task));
            let mut cx = Context::from_waker(&waker);
            polled += 1;
            if future.as_mut().poll(&mut cx).is_pending() {
                *task.future.lock() = Some(future);
            }
        }
        polled
    }
}

/// The cooperative driver for timers and spawned continuations.
pub struct Scheduler {
    inner: Arc<SchedInner>,
}

impl Scheduler {
    /// Creates a scheduler reading time from the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedInner {
                clock,
                timers: Mutex::new(TimerState {
                    heap: BinaryHeap::new(),
                    pending: HashSet::new(),
                    cancelled: HashSet::new(),
                    next_id: 0,
                }),
                ready: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Returns a handle for scheduling work from elsewhere.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the current time from the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.clock.now()
    }

    /// Fires due timers and polls ready tasks until the scheduler is
    /// idle for the current instant.
    pub fn tick(&self) {
        let now = self.inner.clock.now();
        loop {
            let fired = self.inner.fire_due(now);
            let polled = self.inner.drain_ready();
            if fired == 0 && polled == 0 {
                break;
            }
        }
    }

    /// Returns the earliest pending timer deadline, for hosts that want
    /// to sleep between ticks.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        let timers = self.inner.timers.lock();
        timers
            .heap
            .iter()
            .filter(|e| !timers.cancelled.contains(&e.id))
            .map(|e| e.deadline)
            .min()
    }
}

/// A cloneable handle onto a [`Scheduler`].
#[derive(Clone)]
pub struct Handle {
    inner: Arc<SchedInner>,
}

impl Handle {
    /// Returns the current time from the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.clock.now()
    }

    /// Schedules a one-shot action to fire once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) -> TimerId {
        let deadline = self.inner.clock.now().saturating_add(delay);
        let mut timers = self.inner.timers.lock();
        let id = timers.next_id;
        timers.next_id += 1;
        timers.pending.insert(id);
        timers.heap.push(TimerEntry {
            deadline,
            id,
            action: Box::new(action),
        });
        TimerId(id)
    }

    /// Cancels a pending timer. Returns true if the timer had not yet
    /// fired.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.lock();
        if timers.pending.remove(&id.0) {
            timers.cancelled.insert(id.0);
            true
        } else {
            false
        }
    }

    /// Spawns a continuation onto the scheduler's ready queue.
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let task = Arc::new(Task {
            future: Mutex::new(Some(Box::pin(future))),
            queued: AtomicBool::new(true),
            sched: Arc::downgrade(&self.inner),
        });
        self.inner.ready.lock().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::VirtualClock;
    use std::sync::atomic::AtomicUsize;
    use std::task::Poll;

    fn fixture() -> (Arc<VirtualClock>, Scheduler) {
        let clock = Arc::new(VirtualClock::new());
        let sched = Scheduler::new(clock.clone() as Arc<dyn Clock>);
        (clock, sched)
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let (clock, sched) = fixture();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handle = sched.handle();

        for (delay, tag) in [(30u64, 'c'), (10, 'a'), (20, 'b')] {
            let order = Arc::clone(&order);
            handle.schedule(Duration::from_millis(delay), move || {
                order.lock().push(tag);
            });
        }

        clock.advance(Duration::from_millis(15));
        sched.tick();
        assert_eq!(*order.lock(), vec!['a']);

        clock.advance(Duration::from_millis(30));
        sched.tick();
        assert_eq!(*order.lock(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let (clock, sched) = fixture();
        let fired = Arc::new(AtomicBool::new(false));
        let handle = sched.handle();

        let flag = Arc::clone(&fired);
        let id = handle.schedule(Duration::from_millis(10), move || {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(handle.cancel(id));
        assert!(!handle.cancel(id));

        clock.advance(Duration::from_millis(50));
        sched.tick();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn timer_action_can_reschedule() {
        let (clock, sched) = fixture();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = sched.handle();

        let n = Arc::clone(&count);
        let h2 = handle.clone();
        handle.schedule(Duration::from_millis(5), move || {
            n.fetch_add(1, Ordering::SeqCst);
            let n = Arc::clone(&n);
            // Due immediately: fires within the same tick.
            h2.schedule(Duration::ZERO, move || {
                n.fetch_add(1, Ordering::SeqCst);
            });
        });

        clock.advance(Duration::from_millis(5));
        sched.tick();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn spawned_task_runs_to_completion() {
        let (_clock, sched) = fixture();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        sched.handle().spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });
        sched.tick();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn pending_task_is_repolled_after_wake() {
        struct YieldOnce {
            yielded: bool,
        }
        impl Future for YieldOnce {
            type Output = ();
            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                if self.yielded {
                    Poll::Ready(())
                } else {
                    self.yielded = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }

        let (_clock, sched) = fixture();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        sched.handle().spawn(async move {
            YieldOnce { yielded: false }.await;
            flag.store(true, Ordering::SeqCst);
        });
        sched.tick();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn next_deadline_skips_cancelled() {
        let (_clock, sched) = fixture();
        let handle = sched.handle();
        let early = handle.schedule(Duration::from_millis(5), || {});
        let _late = handle.schedule(Duration::from_millis(50), || {});
        handle.cancel(early);
        assert_eq!(sched.next_deadline(), Some(Time::from_millis(50)));
    }
}
