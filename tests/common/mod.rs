//! Shared helpers for the integration tests: logging setup and a
//! hand-polling harness for driving futures without an executor.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context, Poll, Wake, Waker};

struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
    fn wake_by_ref(self: &Arc<Self>) {}
}

/// Polls a future once against a no-op waker.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let waker: Waker = Arc::new(NoopWaker).into();
    let mut cx = Context::from_waker(&waker);
    Pin::new(future).poll(&mut cx)
}

/// Like [`poll_once`] for futures that are not `Unpin` (e.g. async fns).
pub fn poll_once_pinned<F: Future + ?Sized>(future: &mut Pin<Box<F>>) -> Poll<F::Output> {
    let waker: Waker = Arc::new(NoopWaker).into();
    let mut cx = Context::from_waker(&waker);
    future.as_mut().poll(&mut cx)
}

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging. Safe to call multiple times; only
/// initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}
