//! Account lifecycle controller — validates and stages a page, persists the
//! result and signs the account in when needed.
//!
//! A save goes through these steps:
//! - validate the page, focusing the first offending field
//! - stage every field into an [`AccountDraft`]
//! - ask before displacing another active account of a single-account service
//! - persist the draft (create, or apply the parameter diff)
//! - sign in when the account is new, still a draft or was just enabled;
//!   otherwise offer to reconnect if the new settings need it

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};

use super::model::{
    AccountDraft, AccountId, AccountRecord, Avatar, ParameterDiff, ServiceProfile, Update,
};
use super::policy::SingleAccountPolicy;
use super::store::AccountStore;
use crate::coordinator::{ConnectionAttemptCoordinator, RequesterId};
use crate::error::{AccountError, ErrorKind};
use crate::fields::Page;
use crate::presenter::{Confirmation, Notice, Presenter};

/// Which account a save applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccountTarget {
    New,
    Existing(AccountId),
}

/// How a successful save ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "account_id", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The account connected successfully.
    SignedIn(AccountId),
    /// Settings stored; no connection needed or reconnect declined.
    Saved(AccountId),
    /// Settings stored and a reconnect was requested.
    Reconnected(AccountId),
}

impl CommitOutcome {
    pub fn account(&self) -> AccountId {
        match self {
            Self::SignedIn(id) | Self::Saved(id) | Self::Reconnected(id) => *id,
        }
    }
}

/// Result of a commit, together with the account it now applies to.
///
/// A new account that was created but failed to connect stays `Existing` so
/// a retry edits it instead of creating a duplicate; a draft deleted after
/// failing goes back to `New`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub target: AccountTarget,
    pub result: Result<CommitOutcome, AccountError>,
}

/// Saves accounts and drives sign-in on behalf of one wizard.
pub struct AccountLifecycleController {
    requester: RequesterId,
    store: Arc<dyn AccountStore>,
    coordinator: Arc<ConnectionAttemptCoordinator>,
    presenter: Arc<dyn Presenter>,
    policy: Arc<dyn SingleAccountPolicy>,
    disconnect_after_verify: bool,
    cancel: Notify,
    /// A commit is running; cancels outside one are dropped.
    committing: AtomicBool,
    /// The running commit was cancelled.
    cancel_requested: AtomicBool,
    /// Shut down; no further sign-in starts.
    closed: AtomicBool,
}

impl AccountLifecycleController {
    pub fn new(
        store: Arc<dyn AccountStore>,
        coordinator: Arc<ConnectionAttemptCoordinator>,
        presenter: Arc<dyn Presenter>,
        policy: Arc<dyn SingleAccountPolicy>,
        disconnect_after_verify: bool,
    ) -> Self {
        Self {
            requester: RequesterId::new(),
            store,
            coordinator,
            presenter,
            policy,
            disconnect_after_verify,
            cancel: Notify::new(),
            committing: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Identity used for this controller's connection attempts.
    pub fn requester(&self) -> RequesterId {
        self.requester
    }

    /// Validate `page` and stage it into a draft.
    ///
    /// On a validation failure the offending field is focused and its message
    /// shown.
    pub fn stage(&self, page: &Page, service: &ServiceProfile) -> Result<AccountDraft, AccountError> {
        if let Err(invalid) = page.validate() {
            self.presenter.focus_field(&invalid.field);
            if let Some(notice) = Notice::for_error(&invalid.error, &service.display_name) {
                self.presenter.show_notice(notice);
            }
            return Err(invalid.error);
        }

        page.store_settings(service).ok_or_else(|| {
            AccountError::Unknown(format!("settings for {} could not be stored", service.name))
        })
    }

    /// Validate, stage and commit in one go.
    pub async fn save(
        &self,
        service: &ServiceProfile,
        target: AccountTarget,
        editing: bool,
        page: &Page,
    ) -> CommitReport {
        match self.stage(page, service) {
            Ok(draft) => self.commit(service, target, editing, draft).await,
            Err(error) => CommitReport {
                target,
                result: Err(error),
            },
        }
    }

    /// Persist a staged draft and sign in if required.
    ///
    /// `editing` is true when the wizard was opened for an existing account;
    /// only drafts created by this wizard are deleted after a failed sign-in.
    pub async fn commit(
        &self,
        service: &ServiceProfile,
        target: AccountTarget,
        editing: bool,
        draft: AccountDraft,
    ) -> CommitReport {
        let mut target = target;
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.committing.store(true, Ordering::SeqCst);
        let result = self.commit_draft(service, &mut target, editing, draft).await;
        self.committing.store(false, Ordering::SeqCst);
        if let Err(error) = &result {
            debug!(service = %service.name, %error, "Commit failed");
        }
        CommitReport { target, result }
    }

    /// Abort a running sign-in; the pending commit resolves with
    /// [`AccountError::UserCancelled`]. A cancel that arrives while the
    /// commit is still persisting applies to the sign-in that follows.
    /// Outside a commit this does nothing.
    pub fn cancel_sign_in(&self) {
        if self.committing.load(Ordering::SeqCst) {
            self.cancel_requested.store(true, Ordering::SeqCst);
            self.cancel.notify_waiters();
        }
    }

    /// Release everything held for this controller's requester. Any commit
    /// still to come resolves as cancelled instead of signing in.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel.notify_waiters();
        self.coordinator.requester_destroyed(self.requester).await;
    }

    fn is_cancelled(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.cancel_requested.load(Ordering::SeqCst)
    }

    async fn commit_draft(
        &self,
        service: &ServiceProfile,
        target: &mut AccountTarget,
        editing: bool,
        draft: AccountDraft,
    ) -> Result<CommitOutcome, AccountError> {
        let existing = match *target {
            AccountTarget::New => None,
            AccountTarget::Existing(id) => Some(
                self.store
                    .get(id)
                    .await?
                    .ok_or_else(|| AccountError::Unknown(format!("account {id} no longer exists")))?,
            ),
        };

        let account_name = draft
            .account_name()
            .or(existing.as_ref().map(AccountRecord::account_name))
            .unwrap_or_default()
            .to_string();
        let parts = draft.into_parts();

        let was_enabled = existing.as_ref().is_some_and(|a| a.enabled);
        let mut enable = parts
            .enabled
            .unwrap_or(existing.as_ref().is_none_or(|a| a.enabled));
        let turning_on = enable && !was_enabled;

        if turning_on && !self.enforce_single_account(service, existing.as_ref(), &account_name).await? {
            enable = false;
        }

        // ── Persist ─────────────────────────────────────────────────
        let (id, reconnect_required) = match &existing {
            None => {
                let display_name = match &parts.display_name {
                    Update::Set(name) => name.clone(),
                    _ => service.display_name.clone(),
                };
                let record = self
                    .store
                    .create_account(service, &display_name, parts.params.clone())
                    .await?;
                *target = AccountTarget::Existing(record.id);
                if !enable {
                    self.store.set_enabled(record.id, false).await?;
                }
                (record.id, false)
            }
            Some(record) => {
                let diff = ParameterDiff::between(&record.params, &parts.params, &parts.unset);
                let reconnect = if diff.is_empty() {
                    false
                } else {
                    let unset: Vec<String> = diff.unset.into_iter().collect();
                    self.store.update_parameters(record.id, diff.set, &unset).await?
                };
                if let Some(name) = parts.display_name.clone().into_change() {
                    self.store.set_display_name(record.id, name).await?;
                }
                if enable != record.enabled {
                    self.store.set_enabled(record.id, enable).await?;
                }
                (record.id, reconnect)
            }
        };
        self.apply_profile(id, parts.nickname, parts.avatar, parts.aliases)
            .await?;
        info!(account_id = %id, service = %service.name, enabled = enable, "Account settings saved");

        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AccountError::Unknown(format!("account {id} vanished while saving")))?;

        let is_new = existing.is_none();
        let was_draft = existing.as_ref().is_some_and(AccountRecord::is_draft);
        if enable && (is_new || was_draft || turning_on) {
            return self.sign_in(service, &record, editing, target).await;
        }

        if editing && reconnect_required && record.enabled && !record.is_draft() {
            let confirmation = Confirmation::Reconnect {
                account: account_name,
            };
            if self.presenter.confirm(confirmation).await {
                self.store.reconnect(id).await?;
                return Ok(CommitOutcome::Reconnected(id));
            }
            debug!(account_id = %id, "Reconnect declined, settings apply on next connect");
        }

        Ok(CommitOutcome::Saved(id))
    }

    /// Ask before enabling an account that would displace another active
    /// account of the same service. Returns whether enabling may proceed.
    async fn enforce_single_account(
        &self,
        service: &ServiceProfile,
        existing: Option<&AccountRecord>,
        account_name: &str,
    ) -> Result<bool, AccountError> {
        let accounts = self.store.list_accounts().await?;
        let Some(other) = self
            .policy
            .conflicting(service, existing.map(|a| a.id), &accounts)
        else {
            return Ok(true);
        };

        let confirmation = Confirmation::ActivateAccount {
            service: service.display_name.clone(),
            account: account_name.to_string(),
        };
        if !self.presenter.confirm(confirmation).await {
            info!(service = %service.name, "Activation declined, account stays disabled");
            return Ok(false);
        }

        info!(
            service = %service.name,
            disabled = %other.id,
            "Disabling other account of single-account service"
        );
        self.store.set_enabled(other.id, false).await?;
        Ok(true)
    }

    async fn apply_profile(
        &self,
        id: AccountId,
        nickname: Update<String>,
        avatar: Update<Avatar>,
        aliases: Option<Vec<String>>,
    ) -> Result<(), AccountError> {
        if let Some(nickname) = nickname.into_change() {
            self.store.set_nickname(id, nickname).await?;
        }
        if let Some(avatar) = avatar.into_change() {
            self.store.set_avatar(id, avatar).await?;
        }
        if let Some(aliases) = aliases {
            self.store.set_aliases(id, aliases).await?;
        }
        Ok(())
    }

    async fn sign_in(
        &self,
        service: &ServiceProfile,
        record: &AccountRecord,
        editing: bool,
        target: &mut AccountTarget,
    ) -> Result<CommitOutcome, AccountError> {
        let account = record.account_name().to_string();
        self.presenter.show_progress(&format!("Signing in as {account}"));

        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();
        let result = if self.is_cancelled() {
            info!(account_id = %record.id, "Sign-in cancelled before it started");
            Err(AccountError::UserCancelled)
        } else {
            let (tx, rx) = oneshot::channel();
            let started = self
                .coordinator
                .connect(
                    self.requester,
                    &record.protocol,
                    record.params.clone(),
                    self.disconnect_after_verify,
                    Box::new(move |result| {
                        let _ = tx.send(result);
                    }),
                )
                .await;
            if !started {
                self.presenter.hide_progress();
                return Err(AccountError::AlreadyInProgress {
                    requester: self.requester.0,
                });
            }

            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    self.coordinator.requester_destroyed(self.requester).await;
                    info!(account_id = %record.id, "Sign-in cancelled by user");
                    Err(AccountError::UserCancelled)
                }
                result = rx => result.unwrap_or_else(|_| {
                    Err(AccountError::Unknown("connection attempt ended without a result".into()))
                }),
            }
        };
        self.presenter.hide_progress();

        match result {
            Ok(handle) => {
                debug!(account_id = %record.id, handle = %handle, "Sign-in verified");
                self.store.mark_online(record.id).await?;
                self.presenter.show_notice(Notice::signed_in(
                    service.successful_message.as_deref(),
                    &account,
                ));
                Ok(CommitOutcome::SignedIn(record.id))
            }
            Err(error) => {
                if !editing
                    && matches!(
                        error.kind(),
                        ErrorKind::AuthenticationFailed | ErrorKind::UserCancelled
                    )
                {
                    match self.store.delete_account(record.id).await {
                        Ok(()) => {
                            info!(account_id = %record.id, kind = %error.kind(), "Deleted draft account after failed sign-in");
                            *target = AccountTarget::New;
                        }
                        Err(e) => warn!(account_id = %record.id, error = %e, "Could not delete draft account"),
                    }
                }
                if let Some(notice) = Notice::for_error(&error, &service.display_name) {
                    self.presenter.show_notice(notice);
                }
                Err(error)
            }
        }
    }
}
