use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::store::AccountStore;
use crate::types::LiveEvent;

pub type LiveSender = mpsc::UnboundedSender<LiveEvent>;

struct Connection {
    id: Uuid,
    sender: LiveSender,
}

/// Maps an account to its active live connection. Attach overwrites any
/// previous handle (last write wins); detach only clears the handle it was
/// issued for, so a disconnect that races a reconnect cannot evict the
/// newer connection. Account online flag and last-seen are updated under
/// the registry lock to keep transitions serialized.
pub struct PresenceRegistry {
    accounts: Arc<dyn AccountStore>,
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl PresenceRegistry {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        PresenceRegistry {
            accounts,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a live connection for the account and marks it online.
    /// Returns the connection id the caller must present on detach.
    pub async fn attach(&self, account_id: Uuid, sender: LiveSender) -> Result<Uuid> {
        let connection_id = Uuid::new_v4();
        let mut connections = self.connections.write().await;

        let mut account = self
            .accounts
            .find(account_id)
            .await?
            .ok_or_else(|| anyhow!("account {} does not exist", account_id))?;
        account.is_online = true;
        account.last_seen = Utc::now();
        self.accounts.update(&account).await?;

        connections.insert(
            account_id,
            Connection {
                id: connection_id,
                sender,
            },
        );
        tracing::debug!("Live connection {} attached for account {}", connection_id, account_id);
        Ok(connection_id)
    }

    /// Clears the connection if it is still the registered one. A stale
    /// detach (the account already reconnected) is a no-op.
    pub async fn detach(&self, account_id: Uuid, connection_id: Uuid) -> Result<()> {
        let mut connections = self.connections.write().await;
        match connections.get(&account_id) {
            Some(current) if current.id == connection_id => {
                connections.remove(&account_id);
            }
            _ => {
                tracing::debug!(
                    "Ignoring stale detach of connection {} for account {}",
                    connection_id,
                    account_id
                );
                return Ok(());
            }
        }

        if let Some(mut account) = self.accounts.find(account_id).await? {
            account.is_online = false;
            account.last_seen = Utc::now();
            self.accounts.update(&account).await?;
        }
        tracing::debug!("Live connection {} detached for account {}", connection_id, account_id);
        Ok(())
    }

    /// Sends an event to the account's live connection, if any. A missing
    /// or already-closed handle is a soft failure, not an error.
    pub async fn emit(&self, account_id: Uuid, event: &LiveEvent) -> bool {
        let connections = self.connections.read().await;
        let Some(connection) = connections.get(&account_id) else {
            return false;
        };
        if connection.sender.send(event.clone()).is_err() {
            tracing::debug!("Live connection for account {} is gone, dropping event", account_id);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAccounts;
    use crate::types::Account;

    async fn registry_with_account() -> (Arc<MemoryAccounts>, PresenceRegistry, Uuid) {
        let accounts = Arc::new(MemoryAccounts::new());
        let account = Account::new("+14155550101", "Asha");
        accounts.insert(&account).await.unwrap();
        let registry = PresenceRegistry::new(accounts.clone());
        (accounts, registry, account.id)
    }

    fn event() -> LiveEvent {
        LiveEvent::AlertCancelled {
            alert_id: Uuid::new_v4(),
            owner_name: "Asha".to_string(),
        }
    }

    #[tokio::test]
    async fn test_attach_emit_detach() {
        let (accounts, registry, account_id) = registry_with_account().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let connection_id = registry.attach(account_id, tx).await.unwrap();
        assert!(accounts.find(account_id).await.unwrap().unwrap().is_online);
        assert!(registry.emit(account_id, &event()).await);
        assert!(rx.recv().await.is_some());

        registry.detach(account_id, connection_id).await.unwrap();
        assert!(!accounts.find(account_id).await.unwrap().unwrap().is_online);
        assert!(!registry.emit(account_id, &event()).await);
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_newer_connection() {
        let (accounts, registry, account_id) = registry_with_account().await;

        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let old_connection = registry.attach(account_id, old_tx).await.unwrap();

        // Reconnect lands before the old connection's disconnect.
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let _new_connection = registry.attach(account_id, new_tx).await.unwrap();

        registry.detach(account_id, old_connection).await.unwrap();

        assert!(accounts.find(account_id).await.unwrap().unwrap().is_online);
        assert!(registry.emit(account_id, &event()).await);
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_emit_to_dropped_receiver_is_soft_failure() {
        let (_accounts, registry, account_id) = registry_with_account().await;
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach(account_id, tx).await.unwrap();
        drop(rx);
        assert!(!registry.emit(account_id, &event()).await);
    }
}
