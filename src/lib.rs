//! Accounts wizard — account provisioning core.
//!
//! Collects connection parameters through a field-based page, persists the
//! account and verifies it by connecting through a pluggable connection
//! manager, with at most one attempt per requester.

pub mod accounts;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod fields;
pub mod manager;
pub mod presenter;
pub mod translate;
pub mod wizard;

pub use config::WizardConfig;
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use coordinator::{ConnectionAttemptCoordinator, RequesterId};
pub use error::{AccountError, Error, ErrorKind, Result};
pub use translate::ErrorTranslator;
pub use wizard::{WizardEvent, WizardStep, WizardStepController};
