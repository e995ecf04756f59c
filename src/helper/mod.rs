//! Write validation and related-bounds projection for writable states.
//!
//! A helper is attached to a writable state and answers three questions
//! about candidate write values:
//!
//! - [`limit`](Helper::limit): the nearest acceptable value (idempotent)
//! - [`check`](Helper::check): a human-readable reason if the candidate
//!   is unacceptable
//! - [`related`](Helper::related): the bounds themselves, as a record a
//!   settings dialog can render or persist
//!
//! Helpers are stateless: pure functions over the candidate, holding no
//! mutable state across calls.

use crate::outcome::{Outcome, Presence};
use serde::{Deserialize, Serialize};

mod choice;
mod number;
mod text;

pub use choice::ChoiceHelper;
pub use number::NumberHelper;
pub use text::TextHelper;

/// Validation strategy attached to a writable state.
///
/// All three methods default to "anything goes": no limiting, no
/// rejection, no bounds.
pub trait Helper<W>: Send + Sync {
    /// Clamps or truncates the candidate to the nearest acceptable
    /// value. Must be idempotent: `limit(limit(x)) == limit(x)`.
    fn limit(&self, value: W) -> Outcome<W> {
        Outcome::Valid(value)
    }

    /// Returns the reason the candidate is unacceptable, or
    /// [`Presence::Absent`] when it is fine.
    fn check(&self, _value: &W) -> Presence<String> {
        Presence::Absent
    }

    /// Returns the bounds this helper enforces, for display or
    /// persistence.
    fn related(&self) -> Presence<Bounds> {
        Presence::Absent
    }
}

/// The bounds a helper enforces, as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bounds {
    /// Numeric range, step grid, and display metadata.
    Number(NumberBounds),
    /// Text length limits.
    Text(TextBounds),
    /// A closed list of selectable options.
    Choice(ChoiceBounds),
}

/// Bounds of a numeric value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberBounds {
    /// Smallest acceptable value.
    pub min: Option<f64>,
    /// Largest acceptable value.
    pub max: Option<f64>,
    /// Display unit, e.g. `"V"` or `"rpm"`.
    pub unit: Option<String>,
    /// Digits shown after the decimal point.
    pub decimals: Option<u32>,
    /// Grid spacing accepted values snap to.
    pub step: Option<f64>,
    /// Offset of the step grid from zero.
    pub step_start: Option<f64>,
}

/// Bounds of a text value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextBounds {
    /// Maximum length in characters.
    pub max_length: Option<usize>,
    /// Maximum length in UTF-8 bytes.
    pub max_length_bytes: Option<usize>,
}

/// The selectable options of a choice value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChoiceBounds {
    /// The options, in display order.
    pub options: Vec<ChoiceOption>,
}

/// One selectable option of a choice value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// The value written when this option is selected.
    pub key: String,
    /// Short display label.
    pub label: String,
    /// Optional longer description.
    pub description: Option<String>,
}
