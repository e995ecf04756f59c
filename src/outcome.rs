//! Two-variant value wrappers for fallible and optional state values.
//!
//! Every value a state emits is either an [`Outcome`] (did the producer
//! succeed?) or, for guaranteed-valid states, the bare payload. A second
//! wrapper, [`Presence`], answers the other question a panel constantly
//! asks: is there a value at all?
//!
//! - `Outcome<T>`: `Valid(T)` or `Invalid(Fault)`
//! - `Presence<T>`: `Present(T)` or `Absent`
//!
//! Failures are data here, not exceptions: fetch errors, write rejections,
//! and validation reasons all travel as `Invalid` outcomes and are
//! inspected by the consumer. The [`Fault`] payload carries a reason
//! string plus the source location where it was created, so a panel
//! showing "connection lost" can also point a maintainer at the line that
//! produced it.

use core::fmt;
use std::panic::Location;

/// The payload of an [`Outcome::Invalid`] value.
///
/// A fault is a human-readable reason plus the source location where it
/// was constructed. The location is diagnostic metadata: two faults with
/// the same reason compare equal regardless of where they were created.
#[derive(Debug, Clone)]
pub struct Fault {
    reason: String,
    location: &'static Location<'static>,
}

impl Fault {
    /// Creates a new fault with the given reason, capturing the caller's
    /// source location.
    #[must_use]
    #[track_caller]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            location: Location::caller(),
        }
    }

    /// Returns the reason string.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the source location where this fault was created.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl PartialEq for Fault {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
    }
}

impl Eq for Fault {}

impl From<&str> for Fault {
    #[track_caller]
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for Fault {
    #[track_caller]
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl std::error::Error for Fault {}

/// The two-valued outcome of producing a state value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The producer succeeded and the value is usable.
    Valid(T),
    /// The producer failed; the fault says why.
    Invalid(Fault),
}

impl<T> Outcome<T> {
    /// Creates an `Invalid` outcome from a reason string, capturing the
    /// caller's source location.
    #[must_use]
    #[track_caller]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(Fault::new(reason))
    }

    /// Returns true if this outcome is `Valid`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Returns true if this outcome is `Invalid`.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Returns the contained value, if valid.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Invalid(_) => None,
        }
    }

    /// Returns the contained fault, if invalid.
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(f) => Some(f),
        }
    }

    /// Converts from `&Outcome<T>` to `Outcome<&T>`, cloning the fault.
    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Self::Valid(v) => Outcome::Valid(v),
            Self::Invalid(f) => Outcome::Invalid(f.clone()),
        }
    }

    /// Returns the valid value or panics with the given message.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is `Invalid`; the message includes the fault
    /// reason and its capture location.
    #[track_caller]
    pub fn expect(self, msg: &str) -> T {
        match self {
            Self::Valid(v) => v,
            Self::Invalid(f) => panic!("{msg}: {} (fault from {})", f.reason, f.location),
        }
    }

    /// Returns the valid value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is `Invalid`.
    #[track_caller]
    pub fn unwrap(self) -> T {
        match self {
            Self::Valid(v) => v,
            Self::Invalid(f) => panic!(
                "called `Outcome::unwrap()` on an `Invalid` value: {} (fault from {})",
                f.reason, f.location
            ),
        }
    }

    /// Returns the valid value or a default.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Valid(v) => v,
            Self::Invalid(_) => default,
        }
    }

    /// Returns the valid value or computes one from the fault.
    pub fn unwrap_or_else<F: FnOnce(Fault) -> T>(self, f: F) -> T {
        match self {
            Self::Valid(v) => v,
            Self::Invalid(fault) => f(fault),
        }
    }

    /// Maps the valid value, leaving a fault untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Valid(v) => Outcome::Valid(f(v)),
            Self::Invalid(fault) => Outcome::Invalid(fault),
        }
    }

    /// Maps the fault, leaving a valid value untouched.
    #[must_use]
    pub fn map_fault<F: FnOnce(Fault) -> Fault>(self, f: F) -> Self {
        match self {
            Self::Valid(v) => Self::Valid(v),
            Self::Invalid(fault) => Self::Invalid(f(fault)),
        }
    }

    /// Chains a fallible computation on the valid value.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Self::Valid(v) => f(v),
            Self::Invalid(fault) => Outcome::Invalid(fault),
        }
    }

    /// Recovers from a fault, leaving a valid value untouched.
    #[must_use]
    pub fn or_else<F: FnOnce(Fault) -> Self>(self, f: F) -> Self {
        match self {
            Self::Valid(v) => Self::Valid(v),
            Self::Invalid(fault) => f(fault),
        }
    }

    /// Converts to a [`Presence`], discarding the fault.
    pub fn into_presence(self) -> Presence<T> {
        match self {
            Self::Valid(v) => Presence::Present(v),
            Self::Invalid(_) => Presence::Absent,
        }
    }
}

impl<T> From<T> for Outcome<T> {
    fn from(value: T) -> Self {
        Self::Valid(value)
    }
}

impl<T> From<Result<T, Fault>> for Outcome<T> {
    fn from(result: Result<T, Fault>) -> Self {
        match result {
            Ok(v) => Self::Valid(v),
            Err(f) => Self::Invalid(f),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Fault> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Valid(v) => Ok(v),
            Outcome::Invalid(f) => Err(f),
        }
    }
}

/// Whether a value is there at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence<T> {
    /// A value is available.
    Present(T),
    /// No value is available.
    Absent,
}

impl<T> Presence<T> {
    /// Returns true if a value is present.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Returns true if no value is present.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the contained value, if present.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }

    /// Converts from `&Presence<T>` to `Presence<&T>`.
    pub const fn as_ref(&self) -> Presence<&T> {
        match self {
            Self::Present(v) => Presence::Present(v),
            Self::Absent => Presence::Absent,
        }
    }

    /// Returns the present value or panics with the given message.
    ///
    /// # Panics
    ///
    /// Panics if the value is absent.
    #[track_caller]
    pub fn expect(self, msg: &str) -> T {
        match self {
            Self::Present(v) => v,
            Self::Absent => panic!("{msg}"),
        }
    }

    /// Returns the present value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the value is absent.
    #[track_caller]
    pub fn unwrap(self) -> T {
        match self {
            Self::Present(v) => v,
            Self::Absent => panic!("called `Presence::unwrap()` on an `Absent` value"),
        }
    }

    /// Returns the present value or a default.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Present(v) => v,
            Self::Absent => default,
        }
    }

    /// Returns the present value or computes one.
    pub fn unwrap_or_else<F: FnOnce() -> T>(self, f: F) -> T {
        match self {
            Self::Present(v) => v,
            Self::Absent => f(),
        }
    }

    /// Maps the present value, leaving absence untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Presence<U> {
        match self {
            Self::Present(v) => Presence::Present(f(v)),
            Self::Absent => Presence::Absent,
        }
    }

    /// Chains a computation on the present value.
    pub fn and_then<U, F: FnOnce(T) -> Presence<U>>(self, f: F) -> Presence<U> {
        match self {
            Self::Present(v) => f(v),
            Self::Absent => Presence::Absent,
        }
    }

    /// Recovers from absence, leaving a present value untouched.
    #[must_use]
    pub fn or_else<F: FnOnce() -> Self>(self, f: F) -> Self {
        match self {
            Self::Present(v) => Self::Present(v),
            Self::Absent => f(),
        }
    }

    /// Converts to an [`Outcome`], supplying the fault reason used when
    /// the value is absent.
    #[track_caller]
    pub fn into_outcome(self, reason: impl Into<String>) -> Outcome<T> {
        match self {
            Self::Present(v) => Outcome::Valid(v),
            Self::Absent => Outcome::Invalid(Fault::new(reason)),
        }
    }

    /// Converts to a standard `Option`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Presence<T> {
    fn from(option: Option<T>) -> Self {
        match option {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}
