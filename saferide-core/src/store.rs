use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Account, Alert, AlertStatus};

/// Account document storage. Phone numbers are unique (E.164).
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: &Account) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<Account>>;
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Account>>;
    async fn update(&self, account: &Account) -> Result<()>;
}

/// Alert document storage.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: &Alert) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<Alert>>;
    async fn update(&self, alert: &Alert) -> Result<()>;

    /// Conditional write: move the alert to `to` only if it is still
    /// `pending`, stamping `sent_at` or `cancelled_at` from `at` according
    /// to the target status. Returns the updated alert, or `None` when the
    /// alert already left `pending` (the caller lost the race) or does not
    /// exist. Both countdown expiry and cancellation funnel through this.
    async fn transition_if_pending(
        &self,
        id: Uuid,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>>;

    /// Owner's alerts, newest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Alert>>;
}

/// In-memory account store: id-keyed map plus a phone-number index.
pub struct MemoryAccounts {
    inner: RwLock<AccountsInner>,
}

#[derive(Default)]
struct AccountsInner {
    by_id: HashMap<Uuid, Account>,
    phone_index: HashMap<String, Uuid>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        MemoryAccounts {
            inner: RwLock::new(AccountsInner::default()),
        }
    }
}

impl Default for MemoryAccounts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccounts {
    async fn insert(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.phone_index.get(&account.phone_number) {
            if *existing != account.id {
                return Err(anyhow!(
                    "phone number {} is already registered",
                    account.phone_number
                ));
            }
        }
        inner
            .phone_index
            .insert(account.phone_number.clone(), account.id);
        inner.by_id.insert(account.id, account.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        let id = match inner.phone_index.get(phone_number) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn update(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.by_id.contains_key(&account.id) {
            return Err(anyhow!("account {} does not exist", account.id));
        }
        inner
            .phone_index
            .insert(account.phone_number.clone(), account.id);
        inner.by_id.insert(account.id, account.clone());
        Ok(())
    }
}

/// In-memory alert store. The conditional transition holds the write lock
/// across check and mutation, which is what makes the cancel/expiry race
/// safe.
pub struct MemoryAlerts {
    inner: RwLock<HashMap<Uuid, Alert>>,
}

impl MemoryAlerts {
    pub fn new() -> Self {
        MemoryAlerts {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryAlerts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MemoryAlerts {
    async fn insert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner.get(&id).cloned())
    }

    async fn update(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&alert.id) {
            return Err(anyhow!("alert {} does not exist", alert.id));
        }
        inner.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn transition_if_pending(
        &self,
        id: Uuid,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        if !matches!(to, AlertStatus::Sent | AlertStatus::Cancelled) {
            return Err(anyhow!("pending alerts cannot transition to {}", to));
        }
        let mut inner = self.inner.write().await;
        let alert = match inner.get_mut(&id) {
            Some(alert) if alert.status == AlertStatus::Pending => alert,
            _ => return Ok(None),
        };
        alert.status = to;
        if to == AlertStatus::Sent {
            alert.sent_at = Some(at);
        } else {
            alert.cancelled_at = Some(at);
        }
        Ok(Some(alert.clone()))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut alerts: Vec<Alert> = inner
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlertMetadata;

    fn sample_alert() -> Alert {
        let owner = Account::new("+14155550101", "Asha");
        Alert::new(&owner, 65.0, 12.97, 77.59, String::new(), AlertMetadata::default())
    }

    #[tokio::test]
    async fn test_transition_admits_single_winner() {
        let store = MemoryAlerts::new();
        let alert = sample_alert();
        store.insert(&alert).await.unwrap();

        let now = Utc::now();
        let sent = store
            .transition_if_pending(alert.id, AlertStatus::Sent, now)
            .await
            .unwrap();
        let cancelled = store
            .transition_if_pending(alert.id, AlertStatus::Cancelled, now)
            .await
            .unwrap();

        let sent = sent.expect("first transition wins");
        assert!(cancelled.is_none());
        assert_eq!(sent.status, AlertStatus::Sent);
        assert_eq!(sent.sent_at, Some(now));
        assert_eq!(sent.cancelled_at, None);

        let stored = store.find(alert.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Sent);
        assert!(stored.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stamps_cancelled_at() {
        let store = MemoryAlerts::new();
        let alert = sample_alert();
        store.insert(&alert).await.unwrap();

        let now = Utc::now();
        let cancelled = store
            .transition_if_pending(alert.id, AlertStatus::Cancelled, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, AlertStatus::Cancelled);
        assert_eq!(cancelled.cancelled_at, Some(now));
        assert!(cancelled.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_transition_missing_alert_is_noop() {
        let store = MemoryAlerts::new();
        let outcome = store
            .transition_if_pending(Uuid::new_v4(), AlertStatus::Sent, Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_phone_number_uniqueness() {
        let store = MemoryAccounts::new();
        let first = Account::new("+14155550101", "Asha");
        let second = Account::new("+14155550101", "Dev");
        store.insert(&first).await.unwrap();
        assert!(store.insert(&second).await.is_err());

        let found = store.find_by_phone("+14155550101").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }
}
