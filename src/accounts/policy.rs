//! Single-account enforcement policy.
//!
//! Some services allow only one active account at a time. Whether a service
//! is restricted is decided by a pluggable policy so embedders can turn the
//! check on or off per deployment.

use super::model::{AccountId, AccountRecord, ServiceProfile};

/// Decides whether a service allows only one active account.
pub trait SingleAccountPolicy: Send + Sync {
    fn restricts(&self, service: &ServiceProfile) -> bool;

    /// Pick the account that would have to be disabled before `target` may
    /// be enabled, if any.
    fn conflicting<'a>(
        &self,
        service: &ServiceProfile,
        target: Option<AccountId>,
        accounts: &'a [AccountRecord],
    ) -> Option<&'a AccountRecord> {
        if !self.restricts(service) {
            return None;
        }
        accounts.iter().find(|a| {
            a.service == service.name && Some(a.id) != target && a.enabled && a.has_been_online
        })
    }
}

/// Uses the service profile's own setting, falling back to a configured
/// default for services that do not specify one.
#[derive(Debug, Clone, Copy)]
pub struct ProfilePolicy {
    pub default_restricted: bool,
}

impl ProfilePolicy {
    pub fn new(default_restricted: bool) -> Self {
        Self { default_restricted }
    }
}

impl SingleAccountPolicy for ProfilePolicy {
    fn restricts(&self, service: &ServiceProfile) -> bool {
        service.single_account.unwrap_or(self.default_restricted)
    }
}
