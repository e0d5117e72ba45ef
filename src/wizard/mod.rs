//! Account wizard — service selection, the sign-in/edit page and the
//! background save behind the "Sign in" / "Save" action.

pub mod controller;
pub mod state;

pub use controller::{FinishOutcome, WizardDeps, WizardEvent, WizardResponse, WizardStepController};
pub use state::{WizardSession, WizardStep};
