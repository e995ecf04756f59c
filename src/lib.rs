//! Substate: subscribable state containers for control-panel UIs.
//!
//! # Overview
//!
//! Substate is the reactive core of a panel UI stack. It provides a small
//! lattice of value containers that widgets subscribe to, plus a resource
//! state that turns an on-demand fetch function into a reference-counted,
//! single-flight, auto-expiring cache driven entirely by subscriber
//! presence. Rendering, transport, and persistence live elsewhere; this
//! crate only moves values and schedules their lifecycles.
//!
//! # Core Guarantees
//!
//! - **Ordered, isolated dispatch**: subscribers are notified in
//!   registration order from a snapshot frozen at dispatch start; a
//!   panicking subscriber is caught and logged without disturbing the rest
//! - **No interleaved rounds**: a publish that arrives while a round is in
//!   flight is queued, never nested and never dropped
//! - **Single-flight fetch**: concurrent readers of an unresolved resource
//!   share one fetch invocation and observe the same settled outcome
//! - **Exactly-once lifecycle callbacks**: activation fires once per
//!   0→1 subscriber transition, deactivation once per elapsed grace window
//! - **No threads**: deferred work (grace windows, debounce, fetch and
//!   write continuations) runs on a cooperative scheduler the host pumps
//! - **Deterministic testing**: a virtual clock drives every time-dependent
//!   behavior in tests
//!
//! # Module Structure
//!
//! - [`outcome`]: the `Outcome`/`Presence` value algebra
//! - [`helper`]: write validators and the related-bounds projection
//! - [`state`]: the subscribable containers and the capability lattice
//! - [`resource`]: the subscriber-driven resource cache
//! - [`sched`]: the host-pumped cooperative scheduler
//! - [`time`]: logical time, wall and virtual clocks

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod helper;
pub mod outcome;
pub mod resource;
pub mod sched;
pub mod state;
pub mod time;

pub use helper::{
    Bounds, ChoiceBounds, ChoiceHelper, ChoiceOption, Helper, NumberBounds, NumberHelper,
    TextBounds, TextHelper,
};
pub use outcome::{Fault, Outcome, Presence};
pub use resource::{BuildError, ResourceBuilder, ResourceConfig, ResourceState};
pub use sched::{Handle, Scheduler, TimerId};
pub use state::{
    DeferredState, DeferredWritable, DerivedState, EagerState, EagerWritable, Observe, ReadFuture,
    ReadSync, StateValue, Subscription, Write, WriteDisposition, WriteFuture, WriteSync,
};
pub use time::{Clock, SystemClock, Time, VirtualClock};
