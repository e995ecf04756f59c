//! Cross-state helpers: equality checks and value waits.

use super::base::{CompletionCell, CompletionFuture, Subscription};
use super::traits::{Observe, ReadSync, StateValue};
use crate::sched::Handle;
use std::sync::Arc;
use std::time::Duration;

/// Resolves true when both states hold equal values.
pub async fn compare<V: StateValue + PartialEq>(
    a: &dyn Observe<V>,
    b: &dyn Observe<V>,
) -> bool {
    a.await_read().await == b.await_read().await
}

/// Returns true when both sync states hold equal values.
pub fn compare_sync<V: StateValue + PartialEq>(a: &dyn ReadSync<V>, b: &dyn ReadSync<V>) -> bool {
    a.read() == b.read()
}

/// Resolves true when the state emits `expected`, or false once
/// `timeout` elapses on the scheduler first.
pub async fn await_value<V: StateValue + PartialEq>(
    state: &dyn Observe<V>,
    expected: &V,
    timeout: Duration,
    sched: &Handle,
) -> bool {
    let cell = Arc::new(CompletionCell::new());

    let matcher = {
        let cell = Arc::clone(&cell);
        let expected = expected.clone();
        Subscription::new(move |value: &V| {
            if *value == expected {
                cell.complete(true);
            }
        })
    };
    state.subscribe(&matcher, true);

    let timer = {
        let cell = Arc::clone(&cell);
        sched.schedule(timeout, move || cell.complete(false))
    };

    let matched = CompletionFuture::new(cell).await;
    sched.cancel(timer);
    state.unsubscribe(&matcher);
    matched
}
