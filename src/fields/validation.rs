//! Text entry validation — length bounds and forbidden characters.

use regex::Regex;

use crate::error::AccountError;

/// Placeholder replaced by the offending character in custom messages.
const CHAR_PLACEHOLDER: &str = "{char}";

/// Rules applied to a free-text entry.
#[derive(Debug, Clone, Default)]
pub struct EntryValidation {
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub msg_too_short: Option<String>,
    pub msg_too_long: Option<String>,
    /// Matches characters that may not appear in the value.
    pub invalid_chars: Option<Regex>,
    /// Message for a forbidden character; `{char}` is substituted.
    pub msg_illegal: Option<String>,
}

impl EntryValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn length(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn too_short_message(mut self, message: impl Into<String>) -> Self {
        self.msg_too_short = Some(message.into());
        self
    }

    pub fn too_long_message(mut self, message: impl Into<String>) -> Self {
        self.msg_too_long = Some(message.into());
        self
    }

    /// Forbid characters matching `pattern`.
    pub fn invalid_chars(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.invalid_chars = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn illegal_message(mut self, message: impl Into<String>) -> Self {
        self.msg_illegal = Some(message.into());
        self
    }

    /// Check `value` for the field `field` (shown to the user as `label`).
    pub fn check(&self, field: &str, label: &str, value: &str) -> Result<(), AccountError> {
        let length = value.chars().count();

        if length < self.min_length {
            let message = self.msg_too_short.clone().unwrap_or_else(|| {
                format!("{label} must be at least {} characters", self.min_length)
            });
            return Err(AccountError::invalid(field, message));
        }

        if let Some(max) = self.max_length
            && length > max
        {
            let message = self
                .msg_too_long
                .clone()
                .unwrap_or_else(|| format!("{label} can be at most {max} characters"));
            return Err(AccountError::invalid(field, message));
        }

        if let Some(pattern) = &self.invalid_chars
            && let Some(found) = pattern.find(value)
            && let Some(c) = found.as_str().chars().next()
        {
            return Err(AccountError::invalid(field, illegal_character_message(self, label, c)));
        }

        Ok(())
    }
}

fn illegal_character_message(rules: &EntryValidation, label: &str, c: char) -> String {
    if c.is_whitespace() || c.is_control() {
        return format!("{label} cannot contain spaces");
    }
    match &rules.msg_illegal {
        Some(message) => message.replace(CHAR_PLACEHOLDER, &c.to_string()),
        None => format!("Illegal character '{c}' in {label}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn message(result: Result<(), AccountError>) -> String {
        match result {
            Err(AccountError::InvalidValue { message, .. }) => message,
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn default_rules_accept_anything() {
        assert!(EntryValidation::new().check("f", "Field", "").is_ok());
        assert!(EntryValidation::new().check("f", "Field", "any thing").is_ok());
    }

    #[test]
    fn length_bounds_use_custom_messages() {
        let rules = EntryValidation::new()
            .length(3, Some(5))
            .too_short_message("Too short")
            .too_long_message("Too long");

        assert_eq!(message(rules.check("f", "Field", "ab")), "Too short");
        assert_eq!(message(rules.check("f", "Field", "abcdef")), "Too long");
        assert!(rules.check("f", "Field", "abcd").is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let rules = EntryValidation::new().length(0, Some(3));
        assert!(rules.check("f", "Field", "äöü").is_ok());
    }

    #[test]
    fn whitespace_gets_space_message() {
        let rules = EntryValidation::new().invalid_chars(r"[\s@]").unwrap();
        assert_eq!(
            message(rules.check("user", "User name", "john doe")),
            "User name cannot contain spaces"
        );
    }

    #[test]
    fn illegal_character_is_named() {
        let rules = EntryValidation::new().invalid_chars(r"[\s@]").unwrap();
        assert_eq!(
            message(rules.check("user", "User name", "john@doe")),
            "Illegal character '@' in User name"
        );

        let rules = rules.illegal_message("Remove {char} please");
        assert_eq!(message(rules.check("user", "User name", "john@doe")), "Remove @ please");
    }

    #[test]
    fn errors_are_field_level() {
        let rules = EntryValidation::new().length(1, None);
        let err = rules.check("nick", "Nickname", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(matches!(err, AccountError::InvalidValue { field, .. } if field == "nick"));
    }
}
