//! End-to-end resource lifecycle behavior, driven deterministically
//! with a virtual clock and hand-polled futures.

mod common;

use common::{init_test_logging, poll_once};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use substate::{
    Clock, DeferredState, Observe, Outcome, ResourceBuilder, ResourceState, Scheduler,
    VirtualClock, Write,
};

fn fixture() -> (Arc<VirtualClock>, Scheduler) {
    init_test_logging();
    let clock = Arc::new(VirtualClock::new());
    let scheduler = Scheduler::new(clock.clone() as Arc<dyn Clock>);
    (clock, scheduler)
}

fn counting_fetch(
    counter: &Arc<AtomicUsize>,
    result: impl Fn(usize) -> Outcome<u32> + Send + Sync + 'static,
) -> impl Fn() -> substate::resource::FetchFuture<u32> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move || {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = result(call);
        Box::pin(async move { outcome })
    }
}

#[test]
fn concurrent_reads_share_one_fetch() {
    let (_clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(counting_fetch(&fetches, |_| Outcome::Valid(7)))
        .build()
        .unwrap();

    let mut read_a = resource.await_read();
    let mut read_b = resource.await_read();
    assert!(poll_once(&mut read_a).is_pending());
    assert!(poll_once(&mut read_b).is_pending());
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    scheduler.tick();

    assert_eq!(poll_once(&mut read_a), Poll::Ready(Outcome::Valid(7)));
    assert_eq!(poll_once(&mut read_b), Poll::Ready(Outcome::Valid(7)));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn fetch_failure_is_delivered_as_data() {
    let (_clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(counting_fetch(&fetches, |_| {
            Outcome::invalid("connection lost")
        }))
        .build()
        .unwrap();

    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_pending());
    scheduler.tick();

    let Poll::Ready(outcome) = poll_once(&mut read) else {
        panic!("read should be settled");
    };
    assert_eq!(outcome.fault().unwrap().reason(), "connection lost");
}

#[test]
fn activation_fires_once_for_two_quick_subscribers() {
    let (_clock, scheduler) = fixture();
    let activations = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&activations);
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .pushed(
            move |state| {
                counter.fetch_add(1, Ordering::SeqCst);
                state.update_valid(2);
            },
            |_| {},
        )
        .build()
        .unwrap();

    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&first_seen);
    let sub_a = resource.subscribe_fn(
        move |value: &Outcome<u32>| log.lock().push(value.clone()),
        false,
    );

    let second_seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&second_seen);
    let sub_b = resource.subscribe_fn(
        move |value: &Outcome<u32>| log.lock().push(value.clone()),
        true,
    );

    assert_eq!(activations.load(Ordering::SeqCst), 1);
    assert_eq!(*first_seen.lock(), vec![Outcome::Valid(2)]);
    assert_eq!(*second_seen.lock(), vec![Outcome::Valid(2)]);

    resource.unsubscribe(&sub_a);
    resource.unsubscribe(&sub_b);
}

#[test]
fn resubscribing_inside_the_grace_window_cancels_teardown() {
    let (clock, scheduler) = fixture();
    let activations = Arc::new(AtomicUsize::new(0));
    let deactivations = Arc::new(AtomicUsize::new(0));

    let up = Arc::clone(&activations);
    let down = Arc::clone(&deactivations);
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .pushed(
            move |state| {
                up.fetch_add(1, Ordering::SeqCst);
                state.update_valid(1);
            },
            move |_| {
                down.fetch_add(1, Ordering::SeqCst);
            },
        )
        .keep_alive(Duration::from_millis(50))
        .build()
        .unwrap();

    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    resource.unsubscribe(&sub);

    // Back before the window elapses: teardown is cancelled outright.
    clock.advance(Duration::from_millis(30));
    scheduler.tick();
    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    clock.advance(Duration::from_millis(100));
    scheduler.tick();

    assert_eq!(deactivations.load(Ordering::SeqCst), 0);
    assert_eq!(activations.load(Ordering::SeqCst), 1);
    assert!(resource.is_active());

    // Now let the window elapse for real.
    resource.unsubscribe(&sub);
    clock.advance(Duration::from_millis(50));
    scheduler.tick();
    assert_eq!(deactivations.load(Ordering::SeqCst), 1);
    assert!(!resource.is_active());

    // Extra ticks must not fire it again.
    clock.advance(Duration::from_millis(500));
    scheduler.tick();
    assert_eq!(deactivations.load(Ordering::SeqCst), 1);
}

#[test]
fn reactivation_starts_a_new_epoch() {
    let (clock, scheduler) = fixture();
    let activations = Arc::new(AtomicUsize::new(0));
    let deactivations = Arc::new(AtomicUsize::new(0));

    let up = Arc::clone(&activations);
    let down = Arc::clone(&deactivations);
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .pushed(
            move |state| {
                up.fetch_add(1, Ordering::SeqCst);
                state.update_valid(1);
            },
            move |_| {
                down.fetch_add(1, Ordering::SeqCst);
            },
        )
        .keep_alive(Duration::from_millis(50))
        .build()
        .unwrap();

    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    resource.unsubscribe(&sub);
    clock.advance(Duration::from_millis(60));
    scheduler.tick();
    assert_eq!(deactivations.load(Ordering::SeqCst), 1);

    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    assert_eq!(activations.load(Ordering::SeqCst), 2);
    resource.unsubscribe(&sub);
}

#[test]
fn write_funnels_through_the_write_function() {
    let (_clock, scheduler) = fixture();
    let written = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&written);
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(|| Box::pin(async { Outcome::Valid(0) }))
        .write(move |value| {
            log.lock().push(value);
            Box::pin(async { Outcome::Valid(()) })
        })
        .build()
        .unwrap();

    let mut write = resource.write(4);
    assert!(poll_once(&mut write).is_pending());
    assert!(written.lock().is_empty());

    scheduler.tick();
    assert_eq!(*written.lock(), vec![4]);
    assert_eq!(poll_once(&mut write), Poll::Ready(Outcome::Valid(())));
}

#[test]
fn write_failure_reaches_the_caller_not_the_subscribers() {
    let (_clock, scheduler) = fixture();
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(|| Box::pin(async { Outcome::Valid(0) }))
        .write(|_| Box::pin(async { Outcome::invalid("write refused") }))
        .build()
        .unwrap();

    let broadcasts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&broadcasts);
    let sub = resource.subscribe_fn(
        move |_: &Outcome<u32>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        false,
    );
    scheduler.tick();
    let after_fetch = broadcasts.load(Ordering::SeqCst);

    let mut write = resource.write(9);
    scheduler.tick();
    let Poll::Ready(outcome) = poll_once(&mut write) else {
        panic!("write should be settled");
    };
    assert_eq!(outcome.fault().unwrap().reason(), "write refused");
    assert_eq!(broadcasts.load(Ordering::SeqCst), after_fetch);

    resource.unsubscribe(&sub);
}

#[test]
fn rapid_writes_coalesce_into_the_last_value() {
    let (clock, scheduler) = fixture();
    let written = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&written);
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(|| Box::pin(async { Outcome::Valid(0) }))
        .write(move |value| {
            log.lock().push(value);
            Box::pin(async { Outcome::Valid(()) })
        })
        .write_debounce(Duration::from_millis(50))
        .build()
        .unwrap();

    let mut first = resource.write(1);
    clock.advance(Duration::from_millis(30));
    scheduler.tick();
    assert!(written.lock().is_empty());

    // A second write re-arms the debounce window.
    let mut second = resource.write(2);
    clock.advance(Duration::from_millis(40));
    scheduler.tick();
    assert!(written.lock().is_empty());

    clock.advance(Duration::from_millis(10));
    scheduler.tick();
    assert_eq!(*written.lock(), vec![2]);

    // Both callers observe the single coalesced invocation's outcome.
    assert_eq!(poll_once(&mut first), Poll::Ready(Outcome::Valid(())));
    assert_eq!(poll_once(&mut second), Poll::Ready(Outcome::Valid(())));
}

#[test]
fn stale_values_are_refetched_on_read() {
    let (clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(counting_fetch(&fetches, |call| Outcome::Valid(call as u32)))
        .stale_after(Duration::from_millis(100))
        .build()
        .unwrap();

    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_pending());
    scheduler.tick();
    assert_eq!(poll_once(&mut read), Poll::Ready(Outcome::Valid(1)));

    // Fresh enough: served from cache.
    clock.advance(Duration::from_millis(50));
    let mut read = resource.await_read();
    assert_eq!(poll_once(&mut read), Poll::Ready(Outcome::Valid(1)));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Past the staleness limit: the read waits for a fresh value.
    clock.advance(Duration::from_millis(100));
    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_pending());
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    scheduler.tick();
    assert_eq!(poll_once(&mut read), Poll::Ready(Outcome::Valid(2)));
}

#[test]
fn failed_fetches_wait_out_the_retry_backoff() {
    let (clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(counting_fetch(&fetches, |_| Outcome::invalid("offline")))
        .retry_after(Duration::from_millis(100))
        .build()
        .unwrap();

    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_pending());
    scheduler.tick();
    let Poll::Ready(outcome) = poll_once(&mut read) else {
        panic!("read should be settled");
    };
    assert!(outcome.is_invalid());
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Inside the backoff the cached fault is served without a retry.
    clock.advance(Duration::from_millis(50));
    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_ready());
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Past the backoff the next read retries.
    clock.advance(Duration::from_millis(60));
    let mut read = resource.await_read();
    assert!(poll_once(&mut read).is_pending());
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn late_completing_fetch_is_cached_for_the_next_activation() {
    let (clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let gate: DeferredState<u32> = DeferredState::new();

    let counter = Arc::clone(&fetches);
    let fetch_gate = gate.clone();
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let pending = fetch_gate.await_read();
            Box::pin(async move { Outcome::Valid(pending.await) })
        })
        .keep_alive(Duration::from_millis(50))
        .build()
        .unwrap();

    // Subscribe starts the fetch; leave before it settles.
    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    scheduler.tick();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    resource.unsubscribe(&sub);
    clock.advance(Duration::from_millis(60));
    scheduler.tick();
    assert!(!resource.is_active());

    // The in-flight fetch is not cancelled; it settles and is cached.
    gate.set(9);
    scheduler.tick();

    let mut read = resource.await_read();
    assert_eq!(poll_once(&mut read), Poll::Ready(Outcome::Valid(9)));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn teardown_drops_the_cache_so_reactivation_refetches() {
    let (clock, scheduler) = fixture();
    let fetches = Arc::new(AtomicUsize::new(0));
    let resource: ResourceState<u32> = ResourceBuilder::new(scheduler.handle())
        .on_demand(counting_fetch(&fetches, |call| Outcome::Valid(call as u32)))
        .keep_alive(Duration::from_millis(50))
        .build()
        .unwrap();

    let sub = resource.subscribe_fn(|_: &Outcome<u32>| {}, false);
    scheduler.tick();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    resource.unsubscribe(&sub);
    clock.advance(Duration::from_millis(60));
    scheduler.tick();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let sub = resource.subscribe_fn(
        move |value: &Outcome<u32>| log.lock().push(value.clone()),
        true,
    );
    // Nothing cached to deliver; the reactivation fetch repopulates.
    scheduler.tick();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec![Outcome::Valid(2)]);
    resource.unsubscribe(&sub);
}
