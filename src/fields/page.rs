//! A page of fields for one service: the unit that is validated and stored
//! together.

use tracing::{debug, warn};

use super::{Field, FieldComponent};
use crate::accounts::{AccountDraft, AccountId, AccountRecord, SERVER_PARAM, ServiceProfile};
use crate::error::AccountError;

/// The field that stopped a page from validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: String,
    pub error: AccountError,
}

/// Ordered fields for a service's sign-in/edit page.
#[derive(Debug, Clone)]
pub struct Page {
    service: String,
    fields: Vec<Field>,
    account: Option<AccountId>,
}

impl Page {
    /// A blank page laid out for `service`.
    pub fn for_service(service: &ServiceProfile) -> Self {
        Self {
            service: service.name.clone(),
            fields: service.fields.clone(),
            account: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// The account the page is bound to, if editing.
    pub fn account(&self) -> Option<AccountId> {
        self.account
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }

    /// Apply user input to the named field.
    pub fn set_input(&mut self, name: &str, input: &str) -> Result<(), AccountError> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| AccountError::invalid(name, format!("No field named {name}")))?;
        field.set_input(input)
    }

    /// Fields currently preventing the page from proceeding, in page order.
    pub fn blocked_fields(&self) -> Vec<(&str, String)> {
        self.fields
            .iter()
            .filter_map(|f| f.blocking_message().map(|msg| (f.name(), msg)))
            .collect()
    }

    /// Validate the page. The first blocking field wins; otherwise the first
    /// field failing its own validation.
    pub fn validate(&self) -> Result<(), InvalidField> {
        if let Some((field, message)) = self.blocked_fields().into_iter().next() {
            return Err(InvalidField {
                field: field.to_string(),
                error: AccountError::invalid(field, message),
            });
        }

        for field in &self.fields {
            if let Err(error) = field.validate() {
                debug!(service = %self.service, field = field.name(), %error, "Field failed validation");
                return Err(InvalidField {
                    field: field.name().to_string(),
                    error,
                });
            }
        }
        Ok(())
    }

    /// Stage every field into a fresh draft, together with the service's
    /// preset parameters. Returns `None` as soon as a field refuses, dropping
    /// everything staged so far.
    pub fn store_settings(&self, service: &ServiceProfile) -> Option<AccountDraft> {
        let mut draft = AccountDraft::new(&service.protocol);

        for (name, value) in &service.preset_params {
            draft.set_param(name, value.clone());
        }
        if !draft.params().contains_key(SERVER_PARAM)
            && let Some(server) = service.protocol.default_server()
        {
            draft.set_param(SERVER_PARAM, server.clone());
        }

        for field in &self.fields {
            if !field.store_settings(&mut draft) {
                warn!(service = %self.service, field = field.name(), "Field could not store its value");
                return None;
            }
        }
        Some(draft)
    }

    /// Bind the page to an existing account and load every field from it.
    pub fn set_account(&mut self, account: &AccountRecord) {
        self.account = Some(account.id);
        for field in &mut self.fields {
            field.set_account(account);
        }
    }

    /// Reload every field from `account`.
    pub fn get_settings(&mut self, account: &AccountRecord) {
        for field in &mut self.fields {
            field.get_settings(account);
        }
    }
}
