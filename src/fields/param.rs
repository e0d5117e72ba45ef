//! Fields bound directly to a protocol parameter.
//!
//! An insensitive (greyed out) field always unsets its parameter.

use super::{EntryValidation, FieldComponent, parse_toggle, toggle_text};
use crate::accounts::{AccountDraft, AccountRecord, ParamKind, ParamValue};
use crate::error::AccountError;

// ── String ──────────────────────────────────────────────────────────

/// Free-text parameter such as a password or resource name.
#[derive(Debug, Clone)]
pub struct ParamStringField {
    param: String,
    label: String,
    value: String,
    required: bool,
    secret: bool,
    sensitive: bool,
    validation: EntryValidation,
}

impl ParamStringField {
    pub fn new(param: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            label: label.into(),
            value: String::new(),
            required: false,
            secret: false,
            sensitive: true,
            validation: EntryValidation::default(),
        }
    }

    /// An empty value blocks the page and cannot be stored.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mask the value when displayed.
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn with_validation(mut self, validation: EntryValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn set_sensitive(&mut self, sensitive: bool) {
        self.sensitive = sensitive;
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FieldComponent for ParamStringField {
    fn name(&self) -> &str {
        &self.param
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        if !self.sensitive {
            draft.unset_param(&self.param);
            return true;
        }
        if self.value.is_empty() {
            if self.required {
                return false;
            }
            draft.unset_param(&self.param);
            return true;
        }
        draft.set_param(&self.param, ParamValue::Str(self.value.clone()))
    }

    fn validate(&self) -> Result<(), AccountError> {
        if !self.sensitive || self.value.is_empty() {
            return Ok(());
        }
        self.validation.check(&self.param, &self.label, &self.value)
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account
            .params
            .get(&self.param)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
            .to_string();
    }

    fn blocking_message(&self) -> Option<String> {
        (self.required && self.sensitive && self.value.is_empty())
            .then(|| format!("{} is required", self.label))
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.value = if self.secret {
            input.to_string()
        } else {
            input.trim().to_string()
        };
        Ok(())
    }

    fn display_value(&self) -> String {
        if self.secret {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

// ── Integer ─────────────────────────────────────────────────────────

/// Numeric parameter with an inclusive range, such as a port.
#[derive(Debug, Clone)]
pub struct ParamIntField {
    param: String,
    label: String,
    kind: ParamKind,
    text: String,
    min: i64,
    max: i64,
    range_message: Option<String>,
    sensitive: bool,
}

impl ParamIntField {
    /// `kind` selects whether the value is stored signed or unsigned.
    pub fn new(param: impl Into<String>, label: impl Into<String>, kind: ParamKind) -> Self {
        let min = if kind == ParamKind::UInt { 0 } else { i64::MIN };
        Self {
            param: param.into(),
            label: label.into(),
            kind,
            text: String::new(),
            min,
            max: i64::MAX,
            range_message: None,
            sensitive: true,
        }
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn range_message(mut self, message: impl Into<String>) -> Self {
        self.range_message = Some(message.into());
        self
    }

    pub fn set_sensitive(&mut self, sensitive: bool) {
        self.sensitive = sensitive;
    }

    /// The entered number, `None` when empty.
    fn parse(&self) -> Result<Option<i64>, AccountError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let value: i64 = text.parse().map_err(|_| {
            AccountError::invalid(&self.param, format!("{} must be a number", self.label))
        })?;
        if value < self.min || value > self.max {
            let message = self.range_message.clone().unwrap_or_else(|| {
                format!("{} out of range ({}-{})", self.label, self.min, self.max)
            });
            return Err(AccountError::invalid(&self.param, message));
        }
        Ok(Some(value))
    }
}

impl FieldComponent for ParamIntField {
    fn name(&self) -> &str {
        &self.param
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        if !self.sensitive {
            draft.unset_param(&self.param);
            return true;
        }
        match self.parse() {
            Ok(None) => {
                draft.unset_param(&self.param);
                true
            }
            Ok(Some(value)) => {
                let value = match self.kind {
                    ParamKind::UInt => match u64::try_from(value) {
                        Ok(v) => ParamValue::UInt(v),
                        Err(_) => return false,
                    },
                    _ => ParamValue::Int(value),
                };
                draft.set_param(&self.param, value)
            }
            Err(_) => false,
        }
    }

    fn validate(&self) -> Result<(), AccountError> {
        if !self.sensitive {
            return Ok(());
        }
        self.parse().map(|_| ())
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.text = account
            .params
            .get(&self.param)
            .and_then(ParamValue::as_i64)
            .map(|v| v.to_string())
            .unwrap_or_default();
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.text = input.trim().to_string();
        Ok(())
    }

    fn display_value(&self) -> String {
        self.text.clone()
    }
}

// ── Boolean ─────────────────────────────────────────────────────────

/// On/off parameter such as "require encryption".
#[derive(Debug, Clone)]
pub struct ParamBoolField {
    param: String,
    label: String,
    value: bool,
    default: bool,
    sensitive: bool,
}

impl ParamBoolField {
    pub fn new(param: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self {
            param: param.into(),
            label: label.into(),
            value: default,
            default,
            sensitive: true,
        }
    }

    pub fn set_sensitive(&mut self, sensitive: bool) {
        self.sensitive = sensitive;
    }

    pub fn value(&self) -> bool {
        self.value
    }
}

impl FieldComponent for ParamBoolField {
    fn name(&self) -> &str {
        &self.param
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn store_settings(&self, draft: &mut AccountDraft) -> bool {
        if !self.sensitive {
            draft.unset_param(&self.param);
            return true;
        }
        draft.set_param(&self.param, ParamValue::Bool(self.value))
    }

    fn get_settings(&mut self, account: &AccountRecord) {
        self.value = account
            .params
            .get(&self.param)
            .and_then(ParamValue::as_bool)
            .unwrap_or(self.default);
    }

    fn set_input(&mut self, input: &str) -> Result<(), AccountError> {
        self.value = parse_toggle(&self.param, input)?;
        Ok(())
    }

    fn display_value(&self) -> String {
        toggle_text(self.value)
    }
}
