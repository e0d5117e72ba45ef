//! Presentation seam — how the wizard talks to whatever shows it.
//!
//! Rendering is not our concern; a presenter only has to show short notices,
//! a progress indicator, move focus and answer yes/no questions.

pub mod cli;

pub use cli::CliPresenter;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AccountError;

/// Generic text shown after a successful sign-in when the service has none.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Account {account} set up successfully. Connecting...";

/// A transient message (banner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    InvalidField { field: String, message: String },
    SignedIn { message: String },
    AuthenticationFailed { account: String },
    NameInUse { account: String, service: String },
    ConnectionProblems,
    GenericFailure { message: String },
}

impl Notice {
    /// The notice to show for a failed save, if any.
    ///
    /// Cancellations and swallowed duplicates are silent.
    pub fn for_error(error: &AccountError, service: &str) -> Option<Self> {
        match error {
            AccountError::AlreadyInProgress { .. } | AccountError::UserCancelled => None,
            AccountError::ConnectionFailed => Some(Self::ConnectionProblems),
            AccountError::AuthenticationFailed { account } => Some(Self::AuthenticationFailed {
                account: account.clone(),
            }),
            AccountError::NameInUse { account } => Some(Self::NameInUse {
                account: account.clone(),
                service: service.to_string(),
            }),
            AccountError::InvalidValue { field, message } => Some(Self::InvalidField {
                field: field.clone(),
                message: message.clone(),
            }),
            AccountError::Unknown(message) => Some(Self::GenericFailure {
                message: message.clone(),
            }),
        }
    }

    /// Success notice: the service's own text, or the generic one.
    pub fn signed_in(custom: Option<&str>, account: &str) -> Self {
        let message = custom
            .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
            .replace("{account}", account);
        Self::SignedIn { message }
    }

    pub fn text(&self) -> String {
        match self {
            Self::InvalidField { message, .. } => message.clone(),
            Self::SignedIn { message } => message.clone(),
            Self::AuthenticationFailed { account } => format!("Authentication failed for {account}"),
            Self::NameInUse { account, service } => {
                format!("{account} is already in use on {service}")
            }
            Self::ConnectionProblems => "Problems with service connection".to_string(),
            Self::GenericFailure { message } => format!("Could not set up the account: {message}"),
        }
    }
}

/// A question that needs a yes/no answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Confirmation {
    /// Enabling `account` will disable the service's other active account.
    ActivateAccount { service: String, account: String },
    /// Changed settings only apply after reconnecting.
    Reconnect { account: String },
    DeleteAccount { account: String, online: bool },
}

impl Confirmation {
    pub fn text(&self) -> String {
        match self {
            Self::ActivateAccount { service, account } => format!(
                "Only one {service} account can be active at a time. \
                 Activate {account} and disable the other account?"
            ),
            Self::Reconnect { account } => {
                format!("Reconnect {account} now to apply the changes?")
            }
            Self::DeleteAccount {
                account,
                online: true,
            } => format!("You are signed in as {account}. Sign out and delete the account?"),
            Self::DeleteAccount {
                account,
                online: false,
            } => format!("Delete account {account}?"),
        }
    }
}

/// Whatever displays the wizard.
#[async_trait]
pub trait Presenter: Send + Sync {
    fn show_notice(&self, notice: Notice);

    /// Show a modal progress indicator. Dismissing it must cancel the
    /// operation it stands for.
    fn show_progress(&self, message: &str);

    fn hide_progress(&self);

    /// Move input focus to the named field.
    fn focus_field(&self, field: &str);

    /// Enable or disable the dialog's input while an operation is pending.
    fn set_input_enabled(&self, enabled: bool);

    async fn confirm(&self, confirmation: Confirmation) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_silent() {
        assert_eq!(Notice::for_error(&AccountError::UserCancelled, "Jabber"), None);
        assert_eq!(
            Notice::for_error(
                &AccountError::AlreadyInProgress {
                    requester: uuid::Uuid::new_v4()
                },
                "Jabber"
            ),
            None
        );
    }

    #[test]
    fn name_in_use_names_the_service() {
        let notice = Notice::for_error(
            &AccountError::NameInUse {
                account: "al@x".into(),
            },
            "Jabber",
        )
        .unwrap();
        assert_eq!(notice.text(), "al@x is already in use on Jabber");
    }

    #[test]
    fn success_prefers_service_text() {
        assert_eq!(
            Notice::signed_in(Some("Welcome {account}!"), "al@x").text(),
            "Welcome al@x!"
        );
        assert_eq!(
            Notice::signed_in(None, "al@x").text(),
            "Account al@x set up successfully. Connecting..."
        );
    }

    #[test]
    fn delete_text_depends_on_presence() {
        let online = Confirmation::DeleteAccount {
            account: "al@x".into(),
            online: true,
        };
        let offline = Confirmation::DeleteAccount {
            account: "al@x".into(),
            online: false,
        };
        assert_ne!(online.text(), offline.text());
        assert_eq!(offline.text(), "Delete account al@x?");
    }

    #[test]
    fn failures_serialize_tagged() {
        let json = serde_json::to_value(Notice::ConnectionProblems).unwrap();
        assert_eq!(json, serde_json::json!({"type": "connection_problems"}));
    }
}
