use std::sync::Arc;

use crate::config::Config;
use crate::directory::ContactDirectory;
use crate::presence::PresenceRegistry;
use crate::store::{AccountStore, AlertStore, MemoryAccounts, MemoryAlerts};
use crate::transport::{PushTransport, SmsTransport};

/// Shared application state handed to the engine and the API layer. All
/// collaborators are injected so tests can swap in mocks.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub accounts: Arc<dyn AccountStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub directory: ContactDirectory,
    pub presence: Arc<PresenceRegistry>,
    pub push: Arc<dyn PushTransport>,
    pub sms: Arc<dyn SmsTransport>,
}

impl AppContext {
    pub fn new(
        config: Config,
        push: Arc<dyn PushTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccounts::new());
        let alerts: Arc<dyn AlertStore> = Arc::new(MemoryAlerts::new());
        Self::with_stores(config, accounts, alerts, push, sms)
    }

    pub fn with_stores(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        alerts: Arc<dyn AlertStore>,
        push: Arc<dyn PushTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        let directory = ContactDirectory::new(accounts.clone());
        let presence = Arc::new(PresenceRegistry::new(accounts.clone()));
        AppContext {
            config: Arc::new(config),
            accounts,
            alerts,
            directory,
            presence,
            push,
            sms,
        }
    }
}
