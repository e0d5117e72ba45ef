//! Wizard step controller — drives the account dialog from service selection
//! to a finished (or cancelled) save.
//!
//! `finish()` validates synchronously, then runs the save in the background
//! and returns [`FinishOutcome::OperationAsync`]. Input stays disabled until
//! a [`WizardEvent::OperationCompleted`] arrives; further `finish()` calls
//! are ignored meanwhile.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{WizardSession, WizardStep};
use crate::accounts::{
    AccountId, AccountLifecycleController, AccountRecord, AccountStore, AccountTarget,
    ServiceProfile, SingleAccountPolicy,
};
use crate::config::WizardConfig;
use crate::coordinator::ConnectionAttemptCoordinator;
use crate::error::{AccountError, ConfigError, ErrorKind};
use crate::fields::Page;
use crate::presenter::{Confirmation, Presenter};

/// What the user did in the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardResponse {
    /// The "Sign in" / "Save" action.
    Finish,
    Delete,
    Close,
}

/// Immediate result of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcome {
    /// The save runs in the background; its result arrives as an event.
    OperationAsync,
    /// Another operation is still pending.
    Ignored,
    /// The wizard closed.
    Closed,
    /// Nothing happened (e.g. a declined confirmation).
    Unchanged,
}

/// Notifications for whoever embeds the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WizardEvent {
    /// A page became available for editing, or went away.
    InitializedChanged { initialized: bool },
    /// The pending save resolved. No error means the dialog may close.
    OperationCompleted {
        error: Option<ErrorKind>,
        message: Option<String>,
    },
    /// The user confirmed deleting this account; removing it is the
    /// receiver's job.
    DeleteAccount { account_id: AccountId },
    Finished { step: WizardStep },
}

/// Collaborators shared by every wizard.
#[derive(Clone)]
pub struct WizardDeps {
    pub catalog: Vec<ServiceProfile>,
    pub store: Arc<dyn AccountStore>,
    pub coordinator: Arc<ConnectionAttemptCoordinator>,
    pub presenter: Arc<dyn Presenter>,
    pub policy: Arc<dyn SingleAccountPolicy>,
    pub config: WizardConfig,
}

/// Drives one run of the account wizard.
pub struct WizardStepController {
    catalog: Vec<ServiceProfile>,
    store: Arc<dyn AccountStore>,
    presenter: Arc<dyn Presenter>,
    lifecycle: Arc<AccountLifecycleController>,
    session: Arc<RwLock<WizardSession>>,
    page: Option<Page>,
    /// Editing an account that has never connected.
    editing_draft: bool,
    events: broadcast::Sender<WizardEvent>,
    operation: Option<JoinHandle<()>>,
}

impl WizardStepController {
    /// Wizard for a new account. With `preselected`, service selection is
    /// skipped.
    pub fn new_account(deps: WizardDeps, preselected: Option<&str>) -> Result<Self, ConfigError> {
        let mut page = None;
        if let Some(name) = preselected {
            let service = find_service(&deps.catalog, name)
                .ok_or_else(|| ConfigError::UnknownService(name.to_string()))?;
            page = Some(Page::for_service(service));
        }
        let session = WizardSession::create(preselected.map(str::to_string));
        Ok(Self::build(deps, session, page, false))
    }

    /// Wizard for editing `account`.
    pub fn edit_account(deps: WizardDeps, account: &AccountRecord) -> Result<Self, ConfigError> {
        let service = find_service(&deps.catalog, &account.service)
            .ok_or_else(|| ConfigError::UnknownService(account.service.clone()))?;
        let mut page = Page::for_service(service);
        page.set_account(account);

        let session = WizardSession::edit(account.id, account.service.clone());
        Ok(Self::build(deps, session, Some(page), account.is_draft()))
    }

    fn build(
        deps: WizardDeps,
        session: WizardSession,
        page: Option<Page>,
        editing_draft: bool,
    ) -> Self {
        let lifecycle = AccountLifecycleController::new(
            Arc::clone(&deps.store),
            deps.coordinator,
            Arc::clone(&deps.presenter),
            deps.policy,
            deps.config.disconnect_after_verify,
        );
        let (events, _rx) = broadcast::channel(deps.config.event_capacity);
        Self {
            catalog: deps.catalog,
            store: deps.store,
            presenter: deps.presenter,
            lifecycle: Arc::new(lifecycle),
            session: Arc::new(RwLock::new(session)),
            page,
            editing_draft,
            events,
            operation: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.events.subscribe()
    }

    /// Services offered for selection, by priority then name.
    pub fn services(&self) -> Vec<&ServiceProfile> {
        let mut services: Vec<_> = self.catalog.iter().collect();
        services.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        services
    }

    pub async fn step(&self) -> WizardStep {
        self.session.read().await.step
    }

    pub async fn is_pending(&self) -> bool {
        self.session.read().await.pending
    }

    pub async fn target(&self) -> AccountTarget {
        self.session.read().await.target
    }

    /// Whether a page is ready for editing.
    pub fn is_initialized(&self) -> bool {
        self.page.is_some()
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn page_mut(&mut self) -> Option<&mut Page> {
        self.page.as_mut()
    }

    /// Label of the finishing action.
    pub fn action_label(&self) -> &'static str {
        if self.page.as_ref().and_then(Page::account).is_some() && !self.editing_draft {
            "Save"
        } else {
            "Sign in"
        }
    }

    /// Choose the service for a new account and show its page.
    ///
    /// Choosing a different service discards the previous page.
    pub async fn select_service(&mut self, name: &str) -> Result<(), AccountError> {
        let service = find_service(&self.catalog, name)
            .ok_or_else(|| AccountError::invalid("service", format!("Unknown service {name}")))?;
        let page = Page::for_service(service);

        let mut session = self.session.write().await;
        if session.pending || session.editing {
            return Err(AccountError::invalid(
                "service",
                "The service cannot be changed now",
            ));
        }
        match session.step {
            WizardStep::ServiceSelection => {
                session
                    .transition(WizardStep::EditOrSignIn)
                    .map_err(AccountError::Unknown)?;
            }
            WizardStep::EditOrSignIn if session.service.as_deref() == Some(name) => return Ok(()),
            WizardStep::EditOrSignIn => {
                debug!(from = ?session.service, to = name, "Service changed, discarding page");
            }
            step => {
                return Err(AccountError::Unknown(format!("cannot select a service when {step}")));
            }
        }
        session.service = Some(name.to_string());
        drop(session);

        self.page = Some(page);
        let _ = self.events.send(WizardEvent::InitializedChanged { initialized: true });
        Ok(())
    }

    /// Return to service selection while creating an account.
    pub async fn back(&mut self) -> Result<(), AccountError> {
        let mut session = self.session.write().await;
        if session.pending || session.editing {
            return Err(AccountError::Unknown("cannot go back now".into()));
        }
        session
            .transition(WizardStep::ServiceSelection)
            .map_err(AccountError::Unknown)?;
        session.service = None;
        drop(session);

        self.page = None;
        let _ = self.events.send(WizardEvent::InitializedChanged { initialized: false });
        Ok(())
    }

    /// Handle a dialog response.
    pub async fn respond(&mut self, response: WizardResponse) -> Result<FinishOutcome, AccountError> {
        match response {
            WizardResponse::Finish => self.finish().await,
            WizardResponse::Delete => self.delete_account().await,
            WizardResponse::Close => {
                self.cancel().await;
                Ok(FinishOutcome::Closed)
            }
        }
    }

    /// Validate the page and start saving it.
    ///
    /// Validation failures are returned directly (the field has already been
    /// focused). Otherwise the save continues in the background.
    pub async fn finish(&mut self) -> Result<FinishOutcome, AccountError> {
        let (target, editing) = {
            let session = self.session.read().await;
            if session.pending {
                debug!("Save already pending, finish ignored");
                return Ok(FinishOutcome::Ignored);
            }
            if session.step != WizardStep::EditOrSignIn {
                return Err(AccountError::Unknown(format!(
                    "cannot finish when {}",
                    session.step
                )));
            }
            (session.target, session.editing)
        };

        let (Some(page), Some(service)) = (self.page.as_ref(), self.selected_service().await) else {
            return Err(AccountError::Unknown("no service selected".into()));
        };
        let draft = self.lifecycle.stage(page, &service)?;

        if !self.session.write().await.begin_operation() {
            return Ok(FinishOutcome::Ignored);
        }
        self.presenter.set_input_enabled(false);

        let lifecycle = Arc::clone(&self.lifecycle);
        let session = Arc::clone(&self.session);
        let presenter = Arc::clone(&self.presenter);
        let events = self.events.clone();

        self.operation = Some(tokio::spawn(async move {
            let report = lifecycle.commit(&service, target, editing, draft).await;

            let mut session = session.write().await;
            session.end_operation();
            session.target = report.target;
            presenter.set_input_enabled(true);

            match report.result {
                Ok(outcome) => {
                    info!(service = %service.name, ?outcome, "Account wizard operation completed");
                    let _ = events.send(WizardEvent::OperationCompleted {
                        error: None,
                        message: None,
                    });
                    match session.transition(WizardStep::Finished) {
                        Ok(()) => {
                            let _ = events.send(WizardEvent::Finished {
                                step: WizardStep::Finished,
                            });
                        }
                        Err(e) => warn!(error = %e, "Wizard closed before save completed"),
                    }
                }
                Err(error) => {
                    info!(service = %service.name, kind = %error.kind(), "Account wizard operation failed");
                    let _ = events.send(WizardEvent::OperationCompleted {
                        error: Some(error.kind()),
                        message: Some(error.to_string()),
                    });
                }
            }
        }));

        Ok(FinishOutcome::OperationAsync)
    }

    /// Close the wizard. A running sign-in is cancelled.
    pub async fn cancel(&mut self) {
        let mut session = self.session.write().await;
        if session.step.is_terminal() {
            return;
        }
        if session.pending {
            self.lifecycle.cancel_sign_in();
        }
        if let Err(e) = session.transition(WizardStep::Cancelled) {
            warn!(error = %e, "Unexpected wizard state on close");
            return;
        }
        drop(session);

        self.lifecycle.shutdown().await;
        let _ = self.events.send(WizardEvent::Finished {
            step: WizardStep::Cancelled,
        });
    }

    /// Wait for the background save, if any, to resolve.
    pub async fn wait_for_operation(&mut self) {
        if let Some(handle) = self.operation.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Wizard operation task failed");
        }
    }

    async fn delete_account(&mut self) -> Result<FinishOutcome, AccountError> {
        let (target, editing) = {
            let session = self.session.read().await;
            if session.pending {
                return Ok(FinishOutcome::Ignored);
            }
            (session.target, session.editing)
        };
        let (AccountTarget::Existing(id), true) = (target, editing) else {
            debug!("Delete requested without an existing account");
            return Ok(FinishOutcome::Unchanged);
        };

        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AccountError::Unknown(format!("account {id} no longer exists")))?;
        let confirmation = Confirmation::DeleteAccount {
            account: record.account_name().to_string(),
            online: record.connected,
        };
        if !self.presenter.confirm(confirmation).await {
            return Ok(FinishOutcome::Unchanged);
        }

        info!(account_id = %id, "Account deletion confirmed");
        let _ = self.events.send(WizardEvent::DeleteAccount { account_id: id });
        self.cancel().await;
        Ok(FinishOutcome::Closed)
    }

    async fn selected_service(&self) -> Option<ServiceProfile> {
        let session = self.session.read().await;
        let name = session.service.as_deref()?;
        find_service(&self.catalog, name).cloned()
    }
}

fn find_service<'a>(catalog: &'a [ServiceProfile], name: &str) -> Option<&'a ServiceProfile> {
    catalog.iter().find(|s| s.name == name)
}
