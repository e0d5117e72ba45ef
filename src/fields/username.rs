//! User name field, stored in the `account` parameter.
//!
//! Some services edit the server part separately; the two halves are then
//! joined as `user@server` when stored.

use super::{EntryValidation, FieldComponent};
use crate::accounts::{ACCOUNT_PARAM, AccountDraft, AccountRecord, ParamValue};
use crate::error::AccountError;

#[derive(Debug, Clone)]
pub struct UsernameField {
    label: String,
    user: String,
    /// `Some` when the server part has its own editor.
    server: Option<String>,
    must_have_at: bool,
    required_server: bool,
    msg_empty: String,
    msg_required_server: String,
    validation: EntryValidation,
}

impl UsernameField {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            user: String::new(),
            server: None,
            must_have_at: false,
            required_server: false,
            msg_empty: "Enter a user name".to_string(),
            msg_required_server: "Enter a server".to_string(),
            validation: EntryValidation::default(),
        }
    }

    /// Edit the server part separately.
    pub fn with_server_editor(mut self) -> Self {
        self.server = Some(String::new());
        self
    }

    /// Require the full `user@server` form.
    pub fn must_have_at(mut self) -> Self {
        self.must_have_at = true;
        self
    }

    /// Require a non-empty server part, reporting `message` otherwise.
    pub fn required_server(mut self, message: impl Into<String>) -> Self {
        self.required_server = true;
        self.msg_required_server = message.into();
        self
    }

    pub fn empty_message(mut self, message: impl Into<String>) -> Self {
        self.msg_empty = message.into();
        self
    }

    pub fn with_validation(mut self, validation: EntryValidation) -> Self {
        self.validation = validation;
        self
    }

    /// The value stored in the `account` parameter.
    pub fn account(&self) -> String {
        match &self.server {
            Some(server) if !server.is_empty() => format!("{}@{}", self.user, server),
            _ => self.user.clone(),
        }
    }

    fn split(&mut self, value: &str) {
        match (&mut self.server, value.split_once('@')) {
            (Some(server), Some((user, host))) => {
                self.user = user.to_string();
                *server = host.to_string();
            }
            (Some(server), None) => {
                self.user = value.to_string();
                server.clear();
            }
            (None, _) => self.user = value.to_string(),
        }
    }
}

impl FieldComponent for UsernameField {
    fn name(&self) -> &str {
        ACCOUNT_PARAM
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        let account = self.account();
        if account.is_empty() {
            return false;
        }
        draft.set_param(ACCOUNT_PARAM, ParamValue::Str(account))
    }

    fn validate(&self) -> Result<(), AccountError> {
        let account = self.account();

        if account.matches('@').count() > 1 {
            return Err(AccountError::invalid(
                ACCOUNT_PARAM,
                format!("Illegal character '@' in {}", self.label),
            ));
        }

        let (user, server) = match account.split_once('@') {
            Some((user, server)) => (user, Some(server)),
            None => (account.as_str(), None),
        };

        if user.is_empty() {
            return Err(AccountError::invalid(ACCOUNT_PARAM, self.msg_empty.clone()));
        }
        if self.must_have_at && server.is_none() {
            return Err(AccountError::invalid(
                ACCOUNT_PARAM,
                format!("{} must be in the form user@server", self.label),
            ));
        }
        if self.required_server && server.is_none_or(str::is_empty) {
            return Err(AccountError::invalid(
                ACCOUNT_PARAM,
                self.msg_required_server.clone(),
            ));
        }

        self.validation.check(ACCOUNT_PARAM, &self.label, user)
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        let value = account
            .params
            .get(ACCOUNT_PARAM)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
            .to_string();
        self.split(&value);
    }

    fn blocking_message(&self) -> Option<String> {
        self.user.is_empty().then(|| self.msg_empty.clone())
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.split(input.trim());
        Ok(())
    }

    fn display_value(&self) -> String {
        self.account()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{ParamKind, ParamSpec, ProtocolInfo};

    fn draft() -> AccountDraft {
        AccountDraft::new(&ProtocolInfo {
            manager: "gabble".into(),
            name: "jabber".into(),
            params: vec![ParamSpec::new(ACCOUNT_PARAM, ParamKind::Str)],
        })
    }

    fn message(field: &UsernameField) -> String {
        field.validate().unwrap_err().to_string()
    }

    #[test]
    fn plain_username_round_trips() {
        let mut field = UsernameField::new("User name");
        field.set_input("alice@example.org").unwrap();
        assert!(field.validate().is_ok());

        let mut draft = draft();
        assert!(field.store_settings(&mut draft));
        assert_eq!(draft.account_name(), Some("alice@example.org"));
    }

    #[test]
    fn server_editor_joins_parts() {
        let mut field = UsernameField::new("User name").with_server_editor();
        field.set_input("alice@example.org").unwrap();
        assert_eq!(field.user, "alice");
        assert_eq!(field.server.as_deref(), Some("example.org"));
        assert_eq!(field.account(), "alice@example.org");
    }

    #[test]
    fn multiple_at_signs_are_illegal() {
        let mut field = UsernameField::new("User name");
        field.set_input("a@b@c").unwrap();
        assert_eq!(message(&field), "Illegal character '@' in User name");
    }

    #[test]
    fn must_have_at_requires_server_part() {
        let mut field = UsernameField::new("User name").must_have_at();
        field.set_input("alice").unwrap();
        assert_eq!(message(&field), "User name must be in the form user@server");
    }

    #[test]
    fn required_server_reports_custom_message() {
        let mut field = UsernameField::new("User name")
            .with_server_editor()
            .required_server("Server missing");
        field.set_input("alice").unwrap();
        assert_eq!(message(&field), "Server missing");
    }

    #[test]
    fn empty_user_part_blocks_and_fails() {
        let mut field = UsernameField::new("User name").empty_message("Who are you?");
        assert_eq!(field.blocking_message().as_deref(), Some("Who are you?"));
        assert!(!field.store_settings(&mut draft()));

        field.set_input("@example.org").unwrap();
        assert_eq!(message(&field), "Who are you?");
    }

    #[test]
    fn entry_rules_apply_to_user_part() {
        let rules = EntryValidation::new().invalid_chars(r"\s").unwrap();
        let mut field = UsernameField::new("User name").with_validation(rules);
        field.set_input("al ice@example.org").unwrap();
        assert_eq!(message(&field), "User name cannot contain spaces");
    }
}
