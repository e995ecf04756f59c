//! Membership checking against a closed option list.

use super::{Bounds, ChoiceBounds, ChoiceOption, Helper};
use crate::outcome::Presence;

/// Restricts a string value to a closed list of options, the way a mode
/// selector restricts a module's operating mode.
#[derive(Debug, Clone, Default)]
pub struct ChoiceHelper {
    options: Vec<ChoiceOption>,
}

impl ChoiceHelper {
    /// Creates a helper with no options; add them with
    /// [`option`](Self::option).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(ChoiceOption {
            key: key.into(),
            label: label.into(),
            description: None,
        });
        self
    }

    /// Adds an option with a description.
    #[must_use]
    pub fn option_described(
        mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.options.push(ChoiceOption {
            key: key.into(),
            label: label.into(),
            description: Some(description.into()),
        });
        self
    }
}

impl Helper<String> for ChoiceHelper {
    fn check(&self, value: &String) -> Presence<String> {
        if self.options.iter().any(|option| option.key == *value) {
            Presence::Absent
        } else {
            Presence::Present(format!("{value} is not in the list of choices"))
        }
    }

    fn related(&self) -> Presence<Bounds> {
        Presence::Present(Bounds::Choice(ChoiceBounds {
            options: self.options.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;

    fn modes() -> ChoiceHelper {
        ChoiceHelper::new()
            .option("auto", "Automatic")
            .option_described("manual", "Manual", "Operator controls the output directly")
    }

    #[test]
    fn known_keys_pass() {
        let helper = modes();
        assert!(helper.check(&"auto".to_owned()).is_absent());
        assert!(helper.check(&"manual".to_owned()).is_absent());
    }

    #[test]
    fn unknown_keys_are_rejected_with_a_reason() {
        let helper = modes();
        assert_eq!(
            helper.check(&"turbo".to_owned()),
            Presence::Present("turbo is not in the list of choices".into())
        );
    }

    #[test]
    fn limit_passes_values_through() {
        let helper = modes();
        assert_eq!(
            helper.limit("turbo".to_owned()),
            Outcome::Valid("turbo".to_owned())
        );
    }

    #[test]
    fn related_lists_the_options() {
        let helper = modes();
        let Presence::Present(Bounds::Choice(bounds)) = helper.related() else {
            panic!("expected choice bounds");
        };
        assert_eq!(bounds.options.len(), 2);
        assert_eq!(bounds.options[0].key, "auto");
        assert_eq!(
            bounds.options[1].description.as_deref(),
            Some("Operator controls the output directly")
        );
    }
}
