//! Fields for account properties that are not connection parameters.

use super::{FieldComponent, parse_toggle, toggle_text};
use crate::accounts::{AccountDraft, AccountRecord, Avatar, Update};
use crate::error::AccountError;

/// Whether the account is enabled.
#[derive(Debug, Clone)]
pub struct EnabledField {
    value: bool,
}

impl EnabledField {
    pub fn new() -> Self {
        Self { value: true }
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn set_value(&mut self, value: bool) {
        self.value = value;
    }
}

impl Default for EnabledField {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldComponent for EnabledField {
    fn name(&self) -> &str {
        "enabled"
    }

    fn label(&self) -> &str {
        "Enabled"
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        draft.set_enabled(self.value);
        true
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account.enabled;
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.value = parse_toggle("enabled", input)?;
        Ok(())
    }

    fn display_value(&self) -> String {
        toggle_text(self.value)
    }
}

/// Name the account is listed under.
#[derive(Debug, Clone, Default)]
pub struct DisplayNameField {
    value: String,
}

impl DisplayNameField {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FieldComponent for DisplayNameField {
    fn name(&self) -> &str {
        "display_name"
    }

    fn label(&self) -> &str {
        "Display name"
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        let update = if self.value.is_empty() {
            Update::Clear
        } else {
            Update::Set(self.value.clone())
        };
        draft.set_display_name(update);
        true
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account.display_name.clone().unwrap_or_default();
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.value = input.trim().to_string();
        Ok(())
    }

    fn display_value(&self) -> String {
        self.value.clone()
    }
}

/// Name shown to contacts. Empty clears it.
#[derive(Debug, Clone, Default)]
pub struct NicknameField {
    value: String,
}

impl NicknameField {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FieldComponent for NicknameField {
    fn name(&self) -> &str {
        "nickname"
    }

    fn label(&self) -> &str {
        "Nickname"
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        let nickname = (!self.value.is_empty()).then(|| self.value.clone());
        draft.set_nickname(Update::from_option(nickname));
        true
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account.nickname.clone().unwrap_or_default();
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.value = input.trim().to_string();
        Ok(())
    }

    fn display_value(&self) -> String {
        self.value.clone()
    }
}

/// Secondary addresses, entered comma separated.
#[derive(Debug, Clone, Default)]
pub struct AliasesField {
    values: Vec<String>,
}

impl AliasesField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl FieldComponent for AliasesField {
    fn name(&self) -> &str {
        "aliases"
    }

    fn label(&self) -> &str {
        "Other addresses"
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        draft.set_aliases(self.values.clone());
        true
    }

    fn validate(&self) -> Result<(), AccountError> {
        match self.values.iter().find(|v| v.chars().any(char::is_whitespace)) {
            Some(bad) => Err(AccountError::invalid(
                "aliases",
                format!("Address '{bad}' cannot contain spaces"),
            )),
            None => Ok(()),
        }
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.values = account.aliases.clone();
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.values = input
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(())
    }

    fn display_value(&self) -> String {
        self.values.join(", ")
    }
}

/// Account avatar. Only stored when changed.
#[derive(Debug, Clone, Default)]
pub struct AvatarField {
    value: Option<Avatar>,
    dirty: bool,
}

impl AvatarField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_avatar(&mut self, avatar: Option<Avatar>) {
        self.value = avatar;
        self.dirty = true;
    }

    pub fn avatar(&self) -> Option<&Avatar> {
        self.value.as_ref()
    }
}

impl FieldComponent for AvatarField {
    fn name(&self) -> &str {
        "avatar"
    }

    fn label(&self) -> &str {
        "Avatar"
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        if self.dirty {
            draft.set_avatar(Update::from_option(self.value.clone()));
        }
        true
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account.avatar.clone();
        self.dirty = false;
    }

    /// Only clearing is possible from text input.
    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        if input.trim().is_empty() {
            self.set_avatar(None);
            Ok(())
        } else {
            Err(AccountError::invalid("avatar", "An avatar cannot be entered as text"))
        }
    }

    fn display_value(&self) -> String {
        match &self.value {
            Some(avatar) => format!("{} ({} bytes)", avatar.mime_type, avatar.data.len()),
            None => "none".to_string(),
        }
    }
}
