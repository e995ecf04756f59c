//! Subscribable state containers and the capability lattice.
//!
//! A state is a container widgets subscribe to. Three independent axes
//! classify every shape:
//!
//! - **sync or async read**: can the current value be obtained without
//!   awaiting? Sync shapes implement [`ReadSync`]; every shape supports
//!   [`Observe::await_read`].
//! - **guaranteed-valid or fallible**: encoded in the emitted type
//!   itself. Fallible shapes emit [`Outcome<T>`](crate::Outcome);
//!   guaranteed-valid shapes emit the bare `T` (the contained outcome
//!   degenerates to always-valid).
//! - **writable or read-only**: writable shapes implement [`Write`], and
//!   sync-writable shapes additionally [`WriteSync`].
//!
//! Call sites pin the capabilities they need through trait bounds, so
//! "this can be read without waiting" is a compile-time fact rather than
//! a runtime check.
//!
//! Concrete shapes: [`EagerState`] and [`EagerWritable`] (sync read,
//! eager or lazy init), [`DeferredState`] and [`DeferredWritable`]
//! (async read, empty until first publish), [`DerivedState`] (read-only
//! projection of an upstream state), and
//! [`ResourceState`](crate::resource::ResourceState) (async read with a
//! subscriber-driven lifecycle).

mod base;
mod deferred;
mod derived;
mod eager;
mod traits;
mod util;

pub(crate) use base::{CompletionCell, PresenceHooks, ReadDriver, StateCore};

pub use base::{ReadFuture, Subscription, WriteFuture};
pub use deferred::{DeferredState, DeferredWritable};
pub use derived::DerivedState;
pub use eager::{EagerState, EagerWritable};
pub use traits::{
    FallibleDeferred, FallibleDeferredWritable, FallibleSync, FallibleSyncWritable, Observe,
    ReadSync, StateValue, ValidDeferred, ValidDeferredWritable, ValidSync, ValidSyncWritable,
    Write, WriteDisposition, WriteSync,
};
pub use util::{await_value, compare, compare_sync};
