//! Text length limiting, character- and byte-aware.

use super::{Bounds, Helper, TextBounds};
use crate::outcome::{Outcome, Presence};

/// Limits a text value by character count and UTF-8 byte count.
///
/// When both bounds are set the byte bound is authoritative: limiting
/// first truncates to `max_length` characters, then cuts the result down
/// to `max_length_bytes`, backing up to the nearest character boundary
/// so a multi-byte code point is never split.
#[derive(Debug, Clone, Default)]
pub struct TextHelper {
    max_length: Option<usize>,
    max_length_bytes: Option<usize>,
}

impl TextHelper {
    /// Creates a helper with no limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum length in characters.
    #[must_use]
    pub fn with_max_length(mut self, chars: usize) -> Self {
        self.max_length = Some(chars);
        self
    }

    /// Sets the maximum length in UTF-8 bytes.
    #[must_use]
    pub fn with_max_bytes(mut self, bytes: usize) -> Self {
        self.max_length_bytes = Some(bytes);
        self
    }
}

impl Helper<String> for TextHelper {
    fn limit(&self, value: String) -> Outcome<String> {
        let mut v = value;
        if let Some(chars) = self.max_length {
            if v.chars().count() > chars {
                v = v.chars().take(chars).collect();
            }
        }
        if let Some(bytes) = self.max_length_bytes {
            if v.len() > bytes {
                let mut cut = bytes;
                while !v.is_char_boundary(cut) {
                    cut -= 1;
                }
                v.truncate(cut);
            }
        }
        Outcome::Valid(v)
    }

    fn check(&self, value: &String) -> Presence<String> {
        if let Some(chars) = self.max_length {
            if value.chars().count() > chars {
                return Presence::Present(format!(
                    "the text is longer than the limit of {chars} characters"
                ));
            }
        }
        if let Some(bytes) = self.max_length_bytes {
            if value.len() > bytes {
                return Presence::Present(format!(
                    "the text is longer than the limit of {bytes} bytes"
                ));
            }
        }
        Presence::Absent
    }

    fn related(&self) -> Presence<Bounds> {
        Presence::Present(Bounds::Text(TextBounds {
            max_length: self.max_length,
            max_length_bytes: self.max_length_bytes,
        }))
    }
}
