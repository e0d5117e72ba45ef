//! Field components — the editable pieces of a sign-in/edit page.
//!
//! Each field knows how to load itself from an account, validate user input
//! and stage its value into an [`AccountDraft`]. The page aggregates fields
//! through [`FieldComponent`] without caring about their concrete kind.

pub mod page;
pub mod param;
pub mod profile;
pub mod username;
pub mod validation;

pub use page::{InvalidField, Page};
pub use param::{ParamBoolField, ParamIntField, ParamStringField};
pub use profile::{AliasesField, AvatarField, DisplayNameField, EnabledField, NicknameField};
pub use username::UsernameField;
pub use validation::EntryValidation;

use crate::accounts::{AccountDraft, AccountRecord};
use crate::error::AccountError;

/// Capabilities every field provides.
pub trait FieldComponent {
    /// Stable identifier, used for focusing.
    fn name(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str;

    /// Stage the field's value. Returns `false` if the value cannot be
    /// stored, which discards the whole draft.
    fn store_settings(&self, draft: &mut AccountDraft) -> bool;

    /// Check the current input.
    fn validate(&self) -> Result<(), AccountError> {
        Ok(())
    }

    /// Load the field from a persisted account.
    fn get_settings(&mut self, account: &AccountRecord);

    /// Bind the field to an account being edited.
    fn set_account(&mut self, account: &AccountRecord) {
        self.get_settings(account);
    }

    /// Message explaining why the page cannot proceed yet, if this field is
    /// blocking it (typically a required entry left empty).
    fn blocking_message(&self) -> Option<String> {
        None
    }

    /// Apply user-typed input.
    fn set_input(&mut self, input: &str) -> Result<(), AccountError>;

    /// Current value as shown to the user.
    fn display_value(&self) -> String;
}

/// Every field kind a page can hold.
#[derive(Debug, Clone)]
pub enum Field {
    Username(UsernameField),
    ParamString(ParamStringField),
    ParamInt(ParamIntField),
    ParamBool(ParamBoolField),
    Enabled(EnabledField),
    DisplayName(DisplayNameField),
    Nickname(NicknameField),
    Aliases(AliasesField),
    Avatar(AvatarField),
}

macro_rules! dispatch {
    ($field:expr, $inner:ident => $body:expr) => {
        match $field {
            Field::Username($inner) => $body,
            Field::ParamString($inner) => $body,
            Field::ParamInt($inner) => $body,
            Field::ParamBool($inner) => $body,
            Field::Enabled($inner) => $body,
            Field::DisplayName($inner) => $body,
            Field::Nickname($inner) => $body,
            Field::Aliases($inner) => $body,
            Field::Avatar($inner) => $body,
        }
    };
}

impl FieldComponent for Field {
    fn name(&self) -> &str {
        dispatch!(self, f => f.name())
    }

    fn label(&self) -> &str {
        dispatch!(self, f => f.label())
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        dispatch!(self, f => f.store_settings(draft))
    }

    fn validate(&self) -> Result<(), AccountError> {
        dispatch!(self, f => f.validate())
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        dispatch!(self, f => f.get_settings(account))
    }

    fn set_account(&mut self, account: &AccountRecord) {
        dispatch!(self, f => f.set_account(account))
    }

    fn blocking_message(&self) -> Option<String> {
        dispatch!(self, f => f.blocking_message())
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        dispatch!(self, f => f.set_input(input))
    }

    fn display_value(&self) -> String {
        dispatch!(self, f => f.display_value())
    }
}

impl From<UsernameField> for Field {
    fn from(f: UsernameField) -> Self {
        Self::Username(f)
    }
}

impl From<ParamStringField> for Field {
    fn from(f: ParamStringField) -> Self {
        Self::ParamString(f)
    }
}

impl From<ParamIntField> for Field {
    fn from(f: ParamIntField) -> Self {
        Self::ParamInt(f)
    }
}

impl From<ParamBoolField> for Field {
    fn from(f: ParamBoolField) -> Self {
        Self::ParamBool(f)
    }
}

impl From<EnabledField> for Field {
    fn from(f: EnabledField) -> Self {
        Self::Enabled(f)
    }
}

impl From<DisplayNameField> for Field {
    fn from(f: DisplayNameField) -> Self {
        Self::DisplayName(f)
    }
}

impl From<NicknameField> for Field {
    fn from(f: NicknameField) -> Self {
        Self::Nickname(f)
    }
}

impl From<AliasesField> for Field {
    fn from(f: AliasesField) -> Self {
        Self::Aliases(f)
    }
}

impl From<AvatarField> for Field {
    fn from(f: AvatarField) -> Self {
        Self::Avatar(f)
    }
}

/// Parse yes/no style input for toggles.
pub(crate) fn parse_toggle(field: &str, input: &str) -> Result<bool, AccountError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "on" | "true" | "1" => Ok(true),
        "n" | "no" | "off" | "false" | "0" => Ok(false),
        other => Err(AccountError::invalid(field, format!("Expected yes or no, got '{other}'"))),
    }
}

/// Render a toggle for display.
pub(crate) fn toggle_text(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
