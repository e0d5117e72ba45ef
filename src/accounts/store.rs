//! Account persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use super::model::{AccountId, AccountRecord, Avatar, Parameters, ServiceProfile};
use crate::error::StoreError;

/// Backend-agnostic account storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, StoreError>;

    async fn get(&self, id: AccountId) -> Result<Option<AccountRecord>, StoreError>;

    /// Create an enabled account for `service`.
    async fn create_account(
        &self,
        service: &ServiceProfile,
        display_name: &str,
        params: Parameters,
    ) -> Result<AccountRecord, StoreError>;

    /// Apply a parameter diff. Returns whether the live connection must be
    /// re-established for the change to take effect.
    async fn update_parameters(
        &self,
        id: AccountId,
        set: Parameters,
        unset: &[String],
    ) -> Result<bool, StoreError>;

    async fn set_enabled(&self, id: AccountId, enabled: bool) -> Result<(), StoreError>;

    async fn set_display_name(&self, id: AccountId, name: Option<String>) -> Result<(), StoreError>;

    async fn set_nickname(&self, id: AccountId, nickname: Option<String>) -> Result<(), StoreError>;

    async fn set_avatar(&self, id: AccountId, avatar: Option<Avatar>) -> Result<(), StoreError>;

    async fn set_aliases(&self, id: AccountId, aliases: Vec<String>) -> Result<(), StoreError>;

    /// Record a successful connection; the account stops being a draft.
    async fn mark_online(&self, id: AccountId) -> Result<(), StoreError>;

    /// Ask the account to drop and re-establish its connection.
    async fn reconnect(&self, id: AccountId) -> Result<(), StoreError>;

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError>;
}

/// In-memory account store.
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, AccountRecord>>,
    reconnects: RwLock<HashMap<AccountId, u32>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            reconnects: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a record as-is, e.g. an account created elsewhere.
    pub async fn insert(&self, record: AccountRecord) {
        self.accounts.write().await.insert(record.id, record);
    }

    /// How many reconnects were requested for `id`.
    pub async fn reconnect_count(&self, id: AccountId) -> u32 {
        self.reconnects.read().await.get(&id).copied().unwrap_or(0)
    }

    async fn modify<F>(&self, id: AccountId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut AccountRecord) + Send,
    {
        let mut accounts = self.accounts.write().await;
        let record = accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id: id.0 })?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_accounts(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let mut accounts: Vec<_> = self.accounts.read().await.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn get(&self, id: AccountId) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn create_account(
        &self,
        service: &ServiceProfile,
        display_name: &str,
        params: Parameters,
    ) -> Result<AccountRecord, StoreError> {
        if let Some(name) = params.keys().find(|name| service.protocol.param(name).is_none()) {
            return Err(StoreError::UnsupportedParameter {
                protocol: service.protocol.name.clone(),
                name: name.clone(),
            });
        }

        let now = Utc::now();
        let record = AccountRecord {
            id: AccountId::new(),
            service: service.name.clone(),
            protocol: service.protocol.name.clone(),
            params,
            enabled: true,
            has_been_online: false,
            connected: false,
            display_name: Some(display_name.to_string()),
            nickname: None,
            avatar: None,
            aliases: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        info!(account_id = %record.id, service = %record.service, "Account created");
        self.accounts.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_parameters(
        &self,
        id: AccountId,
        set: Parameters,
        unset: &[String],
    ) -> Result<bool, StoreError> {
        let changed = !set.is_empty() || !unset.is_empty();
        self.modify(id, |record| {
            for name in unset {
                record.params.remove(name);
            }
            record.params.extend(set);
        })
        .await?;
        Ok(changed)
    }

    async fn set_enabled(&self, id: AccountId, enabled: bool) -> Result<(), StoreError> {
        self.modify(id, |record| {
            record.enabled = enabled;
            if !enabled {
                record.connected = false;
            }
        })
        .await
    }

    async fn set_display_name(&self, id: AccountId, name: Option<String>) -> Result<(), StoreError> {
        self.modify(id, |record| record.display_name = name).await
    }

    async fn set_nickname(&self, id: AccountId, nickname: Option<String>) -> Result<(), StoreError> {
        self.modify(id, |record| record.nickname = nickname).await
    }

    async fn set_avatar(&self, id: AccountId, avatar: Option<Avatar>) -> Result<(), StoreError> {
        self.modify(id, |record| record.avatar = avatar).await
    }

    async fn set_aliases(&self, id: AccountId, aliases: Vec<String>) -> Result<(), StoreError> {
        self.modify(id, |record| record.aliases = aliases).await
    }

    async fn mark_online(&self, id: AccountId) -> Result<(), StoreError> {
        self.modify(id, |record| {
            record.has_been_online = true;
            record.connected = true;
        })
        .await
    }

    async fn reconnect(&self, id: AccountId) -> Result<(), StoreError> {
        self.modify(id, |_| {}).await?;
        *self.reconnects.write().await.entry(id).or_insert(0) += 1;
        info!(account_id = %id, "Account reconnect requested");
        Ok(())
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StoreError> {
        self.accounts
            .write()
            .await
            .remove(&id)
            .map(|_| info!(account_id = %id, "Account deleted"))
            .ok_or(StoreError::NotFound { id: id.0 })
    }
}
