//! Wizard state machine — which step the dialog is on and whether an
//! asynchronous operation is outstanding.

use serde::{Deserialize, Serialize};

use crate::accounts::{AccountId, AccountTarget};

/// The steps of the account wizard.
///
/// ServiceSelection → EditOrSignIn → Finished, with Cancelled reachable from
/// any non-terminal step. Creating an account may step back to service
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    ServiceSelection,
    EditOrSignIn,
    Finished,
    Cancelled,
}

impl WizardStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: WizardStep) -> bool {
        use WizardStep::*;
        matches!(
            (self, target),
            (ServiceSelection, EditOrSignIn)
                | (EditOrSignIn, ServiceSelection)
                | (EditOrSignIn, Finished)
                | (ServiceSelection, Cancelled)
                | (EditOrSignIn, Cancelled)
        )
    }

    /// Whether the wizard is closed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceSelection => "service_selection",
            Self::EditOrSignIn => "edit_or_sign_in",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Mutable state of one wizard run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardSession {
    pub step: WizardStep,
    /// Set while a save is running; at most one at a time.
    pub pending: bool,
    pub target: AccountTarget,
    /// Opened for an existing account rather than creating one.
    pub editing: bool,
    pub service: Option<String>,
}

impl WizardSession {
    /// Session for creating an account, optionally with the service chosen
    /// up front (which skips service selection).
    pub fn create(service: Option<String>) -> Self {
        let step = if service.is_some() {
            WizardStep::EditOrSignIn
        } else {
            WizardStep::ServiceSelection
        };
        Self {
            step,
            pending: false,
            target: AccountTarget::New,
            editing: false,
            service,
        }
    }

    /// Session for editing an existing account.
    pub fn edit(account: AccountId, service: String) -> Self {
        Self {
            step: WizardStep::EditOrSignIn,
            pending: false,
            target: AccountTarget::Existing(account),
            editing: true,
            service: Some(service),
        }
    }

    /// Move to `target`. Returns an error for an invalid transition.
    pub fn transition(&mut self, target: WizardStep) -> Result<(), String> {
        if !self.step.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.step, target));
        }
        self.step = target;
        Ok(())
    }

    /// Mark an operation as started. Returns `false` if one is already
    /// pending or the wizard is closed.
    pub fn begin_operation(&mut self) -> bool {
        if self.pending || self.step.is_terminal() {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn end_operation(&mut self) {
        self.pending = false;
    }
}
