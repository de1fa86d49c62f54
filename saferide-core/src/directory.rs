use anyhow::Result;
use std::sync::Arc;

use crate::store::AccountStore;
use crate::types::Account;

/// Resolves a contact phone number to a registered account and, through it,
/// the channels that can reach them (push token, live presence handle).
/// Contacts without a registered account are still reachable by SMS.
#[derive(Clone)]
pub struct ContactDirectory {
    accounts: Arc<dyn AccountStore>,
}

impl ContactDirectory {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn resolve(&self, phone_number: &str) -> Result<Option<Account>> {
        self.accounts.find_by_phone(phone_number).await
    }
}
